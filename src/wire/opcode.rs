//! The closed opcode enum and its static size table (§4.1), in the style of
//! `NFSProgram`/`nfsstat3`'s `#[repr(u32)] #[derive(FromPrimitive,
//! ToPrimitive)]` enums, narrowed to a single wire byte.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::WireEnumU8;

/// How an opcode's argument size is carried on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SizeClass {
    /// Size is implied by the opcode and never carried on the wire.
    Fixed,
    /// Next byte is an unsigned 8-bit length (opcode inventory's "≤255B").
    VarU8,
    /// Next 4 bytes are a signed 32-bit length.
    VarU32,
}

/// Closed, wire-stable opcode set. Legacy names are kept verbatim for wire
/// compatibility, per §4.1.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Opcode {
    SubscribeLegacy = 0,
    UnsubscribeLegacy = 1,
    PullCall = 2,
    PullCallReturn = 3,
    RpcCall = 4,
    TypeUpdate = 5,
    StructureCreated = 6,
    StructureChanged = 7,
    StructureDeleted = 8,
    PeerInfo = 9,
    PortValueChange = 10,
    SmallPortValueChange = 11,
    SmallPortValueChangeWithoutTimestamp = 12,
    ConnectPorts = 13,
    ConnectPortsError = 14,
    UpdateConnection = 15,
    DisconnectPorts = 16,
    ConnectorCreated = 17,
    ConnectorDeleted = 18,
    UriConnectorCreated = 19,
    UriConnectorUpdated = 20,
    UriConnectorDeleted = 21,
    /// Sentinel: any opcode byte ≥ this value terminates the batch as corrupt.
    Other = 22,
}
WireEnumU8!(Opcode);

impl Opcode {
    /// `(size_class, fixed_argument_bytes)` — `fixed_argument_bytes` is only
    /// meaningful for `SizeClass::Fixed` and is the sum of natural field
    /// sizes (enums count as 1 byte) excluding the opcode byte itself and
    /// any debug terminator.
    pub fn size_class(self) -> (SizeClass, usize) {
        use SizeClass::*;
        match self {
            // handle(4) + strategy(2) + reverse(1) + min_ms(4) + client_handle(4) + encoding(1)
            Opcode::SubscribeLegacy => (Fixed, 16),
            // handle(4)
            Opcode::UnsubscribeLegacy => (Fixed, 4),
            // handle(4) + call_id(8) + flags(1)
            Opcode::PullCall => (Fixed, 13),
            // call_id(8) + failed(1) -- trailing type/timestamp/value is VarU32
            Opcode::PullCallReturn => (VarU32, 0),
            Opcode::RpcCall => (VarU32, 0),
            // discards a 16-bit legacy update-time after the type register read
            Opcode::TypeUpdate => (VarU32, 0),
            Opcode::StructureCreated => (VarU32, 0),
            Opcode::StructureChanged => (VarU32, 0),
            // handle(4)
            Opcode::StructureDeleted => (Fixed, 4),
            Opcode::PeerInfo => (VarU32, 0),
            Opcode::PortValueChange => (VarU32, 0),
            Opcode::SmallPortValueChange => (VarU8, 0),
            Opcode::SmallPortValueChangeWithoutTimestamp => (VarU8, 0),
            Opcode::ConnectPorts => (VarU32, 0),
            Opcode::ConnectPortsError => (VarU32, 0),
            // handle(4) + min_ms(4) + high_priority(1) + strategy(2)
            Opcode::UpdateConnection => (Fixed, 11),
            // handle(4)
            Opcode::DisconnectPorts => (Fixed, 4),
            // handle(4)
            Opcode::ConnectorCreated => (Fixed, 4),
            // handle(4)
            Opcode::ConnectorDeleted => (Fixed, 4),
            Opcode::UriConnectorCreated => (VarU32, 0),
            Opcode::UriConnectorUpdated => (VarU32, 0),
            // handle(4)
            Opcode::UriConnectorDeleted => (Fixed, 4),
            Opcode::Other => (Fixed, 0),
        }
    }
}

/// Data-encoding flag carried in a message's flags byte (§4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum DataEncoding {
    Binary = 0,
    String = 1,
    Xml = 2,
    BinaryCompressed = 3,
}

/// Unpacked message flags byte: lower 2 bits encoding, bit 2 `TO_SERVER`, bit
/// 3 `HIGH_PRIORITY`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MessageFlags {
    pub encoding: DataEncoding,
    pub to_server: bool,
    pub high_priority: bool,
}

impl MessageFlags {
    pub const TO_SERVER_BIT: u8 = 1 << 2;
    pub const HIGH_PRIORITY_BIT: u8 = 1 << 3;

    pub fn from_byte(byte: u8) -> std::io::Result<Self> {
        use num_traits::FromPrimitive;
        let encoding = DataEncoding::from_u8(byte & 0b11)
            .ok_or_else(|| crate::wire::codec::invalid_data("invalid data encoding"))?;
        Ok(Self {
            encoding,
            to_server: byte & Self::TO_SERVER_BIT != 0,
            high_priority: byte & Self::HIGH_PRIORITY_BIT != 0,
        })
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.encoding as u8;
        if self.to_server {
            byte |= Self::TO_SERVER_BIT;
        }
        if self.high_priority {
            byte |= Self::HIGH_PRIORITY_BIT;
        }
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::{deserialize, Serialize};
    use std::io::Cursor;

    #[test]
    fn opcode_round_trips() {
        let mut buf = Vec::new();
        Opcode::RpcCall.serialize(&mut buf).unwrap();
        let back: Opcode = deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, Opcode::RpcCall);
    }

    #[test]
    fn opcode_byte_at_or_above_other_is_rejected() {
        let buf = vec![Opcode::Other as u8 + 5];
        let err = deserialize::<Opcode>(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn message_flags_round_trip_through_byte() {
        let flags = MessageFlags {
            encoding: DataEncoding::BinaryCompressed,
            to_server: true,
            high_priority: false,
        };
        let byte = flags.to_byte();
        let back = MessageFlags::from_byte(byte).unwrap();
        assert_eq!(flags, back);
    }
}
