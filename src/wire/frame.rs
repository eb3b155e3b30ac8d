//! Packet framing shell and batch-level size discipline (§4.1, §4.2),
//! grounded in `protocol::rpc::wire::{read_fragment, write_fragment}`'s
//! record-marking pattern, generalized from RFC 5531's single length prefix
//! to this protocol's `size | ack_request | ack_response` shell.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::wire::codec::{deserialize, Deserialize};
use crate::wire::opcode::{Opcode, SizeClass};

/// Bytes occupied by the shell before any messages: 4-byte size + 2-byte
/// ack_request + 2-byte ack_response.
pub const SHELL_LEN: usize = 8;

/// `-1` on the wire means "no ack request/response pending".
pub const NO_ACK: i16 = -1;

/// Parsed packet shell header, read from the front of a received batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BatchHeader {
    pub ack_request: i16,
    pub ack_response: i16,
}

impl BatchHeader {
    pub fn read(src: &mut impl Read) -> std::io::Result<Self> {
        Ok(Self {
            ack_request: src.read_i16::<BigEndian>()?,
            ack_response: src.read_i16::<BigEndian>()?,
        })
    }
}

/// A fresh front buffer: 4 zero size bytes + 2-byte ack_request placeholder
/// (`NO_ACK`) + 2-byte ack_response placeholder (`NO_ACK`), per §4.2 step 6.
pub fn fresh_buffer() -> Vec<u8> {
    let mut buf = Vec::with_capacity(SHELL_LEN);
    buf.write_i32::<BigEndian>(0).unwrap();
    buf.write_i16::<BigEndian>(NO_ACK).unwrap();
    buf.write_i16::<BigEndian>(NO_ACK).unwrap();
    buf
}

/// Patches the shell of a front buffer in place before handoff to the
/// transport: size at offset 0 (bytes after the size field itself),
/// ack_request at offset 4, ack_response at offset 6.
pub fn patch_shell(buf: &mut [u8], ack_request: i16, ack_response: i16) {
    debug_assert!(buf.len() >= SHELL_LEN);
    let size = (buf.len() - 4) as i32;
    buf[0..4].copy_from_slice(&size.to_be_bytes());
    buf[4..6].copy_from_slice(&ack_request.to_be_bytes());
    buf[6..8].copy_from_slice(&ack_response.to_be_bytes());
}

/// `ReadMessageSize` (§4.1): the number of argument bytes following the
/// opcode byte (and flags byte, if the caller already consumed it), given
/// the opcode's size class and whether the debug-protocol terminator is in
/// effect.
///
/// Returns `Ok(None)` when the declared size is the corrupt sentinel (0, or
/// larger than `remaining`) — the caller must then drop the rest of the
/// batch per §4.1/§4.2.
pub fn read_message_size(
    src: &mut impl Read,
    opcode: Opcode,
    debug_protocol: bool,
    remaining: usize,
) -> std::io::Result<Option<usize>> {
    let declared = match opcode.size_class() {
        (SizeClass::Fixed, fixed) => fixed + if debug_protocol { 1 } else { 0 },
        (SizeClass::VarU8, _) => src.read_u8()? as usize,
        (SizeClass::VarU32, _) => {
            let v = src.read_i32::<BigEndian>()?;
            if v <= 0 {
                return Ok(None);
            }
            v as usize
        }
    };
    if declared == 0 || declared > remaining {
        return Ok(None);
    }
    Ok(Some(declared))
}

/// One opcode + its raw argument bytes, carved out of a decoded batch.
pub struct RawMessage {
    pub opcode: Opcode,
    pub flags_byte: Option<u8>,
    pub body: Vec<u8>,
}

impl RawMessage {
    pub fn body_cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.body)
    }

    pub fn read_body<T: Deserialize + Default>(&self) -> std::io::Result<T> {
        deserialize(&mut self.body_cursor())
    }
}

/// Encodes one complete outbound message: opcode byte, size prefix per the
/// opcode's `size_class`, the optional flags byte, the argument bytes, and
/// the debug terminator (`0xCD`) when `debug_protocol` is set (§4.1, §6
/// "Packet frame").
pub fn encode_message(opcode: Opcode, flags_byte: Option<u8>, args: &[u8], debug_protocol: bool) -> std::io::Result<Vec<u8>> {
    use crate::wire::codec::Serialize;
    let mut out = Vec::with_capacity(args.len() + 8);
    opcode.serialize(&mut out)?;
    let payload_len = args.len() + flags_byte.map_or(0, |_| 1) + if debug_protocol { 1 } else { 0 };
    match opcode.size_class().0 {
        SizeClass::Fixed => {}
        SizeClass::VarU8 => out.push(payload_len as u8),
        SizeClass::VarU32 => out.write_i32::<BigEndian>(payload_len as i32)?,
    }
    if let Some(f) = flags_byte {
        out.push(f);
    }
    out.extend_from_slice(args);
    if debug_protocol {
        out.push(0xCD);
    }
    Ok(out)
}

/// Whether an opcode carries a flags byte immediately after its size (§4.1:
/// "each message carries, immediately after its size, a flags byte when
/// applicable"). `PullCall` is deliberately absent: its `flags` is a struct
/// field already counted in its fixed 13-byte body (see
/// `wire::opcode::Opcode::size_class`), not the generic flags byte other
/// opcodes carry.
pub fn carries_flags_byte(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::PortValueChange
            | Opcode::SmallPortValueChange
            | Opcode::SmallPortValueChangeWithoutTimestamp
            | Opcode::RpcCall
            | Opcode::PullCallReturn
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_has_shell_len_and_no_ack_placeholders() {
        let buf = fresh_buffer();
        assert_eq!(buf.len(), SHELL_LEN);
        assert_eq!(&buf[0..4], &0i32.to_be_bytes());
        assert_eq!(&buf[4..6], &NO_ACK.to_be_bytes());
        assert_eq!(&buf[6..8], &NO_ACK.to_be_bytes());
    }

    #[test]
    fn patch_shell_writes_size_minus_length_prefix() {
        let mut buf = fresh_buffer();
        buf.extend_from_slice(&[1, 2, 3, 4]);
        patch_shell(&mut buf, 7, -1);
        assert_eq!(i32::from_be_bytes(buf[0..4].try_into().unwrap()), 8);
        assert_eq!(i16::from_be_bytes(buf[4..6].try_into().unwrap()), 7);
        assert_eq!(i16::from_be_bytes(buf[6..8].try_into().unwrap()), -1);
    }

    #[test]
    fn fixed_size_opcode_ignores_remaining_bytes_stream() {
        let mut src = Cursor::new(Vec::<u8>::new());
        let size = read_message_size(&mut src, Opcode::DisconnectPorts, false, 100)
            .unwrap()
            .unwrap();
        assert_eq!(size, 4);
    }

    #[test]
    fn fixed_size_opcode_adds_debug_terminator_byte() {
        let mut src = Cursor::new(Vec::<u8>::new());
        let size = read_message_size(&mut src, Opcode::DisconnectPorts, true, 100)
            .unwrap()
            .unwrap();
        assert_eq!(size, 5);
    }

    #[test]
    fn var_u32_size_exceeding_remaining_is_corrupt() {
        let mut src = Cursor::new(1_000_000_000i32.to_be_bytes().to_vec());
        let result = read_message_size(&mut src, Opcode::PortValueChange, false, 10).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn var_u32_zero_size_is_corrupt() {
        let mut src = Cursor::new(0i32.to_be_bytes().to_vec());
        let result = read_message_size(&mut src, Opcode::PortValueChange, false, 1000).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn encode_message_writes_fixed_size_opcode_without_length_prefix() {
        let bytes = encode_message(Opcode::DisconnectPorts, None, &[1, 2, 3, 4], false).unwrap();
        assert_eq!(bytes, vec![Opcode::DisconnectPorts as u8, 1, 2, 3, 4]);
    }

    #[test]
    fn encode_message_writes_var_u32_length_prefix_including_flags_byte() {
        let bytes = encode_message(Opcode::PortValueChange, Some(0b0000), &[9, 9], false).unwrap();
        assert_eq!(bytes[0], Opcode::PortValueChange as u8);
        let len = i32::from_be_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(len, 3); // 1 flags byte + 2 arg bytes
        assert_eq!(&bytes[5..], &[0b0000, 9, 9]);
    }

    #[test]
    fn var_u8_size_reads_next_byte() {
        let mut src = Cursor::new(vec![42u8]);
        let size = read_message_size(&mut src, Opcode::SmallPortValueChange, false, 100)
            .unwrap()
            .unwrap();
        assert_eq!(size, 42);
    }
}
