//! Per-opcode message payloads (§4.3), one struct or enum per wire message
//! in the style of per-procedure argument/result structs like
//! `nfs3::dir::READDIR3args`, codec'd with the `*Struct!`/`*Enum!` macros
//! from [`crate::wire::codec`].

use num_derive::{FromPrimitive, ToPrimitive};

use crate::types::{DynamicConnectorParameters, Handle, PortFlags, PortPath, Strategy, StaticConnectorParameters, WireTimestamp};
use crate::wire::codec::{Deserialize, Serialize};
use crate::{DeserializeStruct, SerializeStruct, WireEnumU32, WireEnumU8};

/// How a published value changed, carried alongside each value in a
/// PORT_VALUE_CHANGE-family message (§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ChangeType {
    Initial = 0,
    Change = 1,
    FinalPush = 2,
}
WireEnumU8!(ChangeType);

/// One value carried by a PORT_VALUE_CHANGE batch entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortValue {
    pub change_type: ChangeType,
    pub timestamp: Option<WireTimestamp>,
    /// Raw (possibly compressed, per the encoding flag) bytes; decoding into
    /// the port's concrete type is a [`crate::host::PortGraph`] concern.
    pub raw_value: Vec<u8>,
}

impl Default for ChangeType {
    fn default() -> Self {
        ChangeType::Change
    }
}

impl Serialize for PortValue {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.change_type.serialize(dest)?;
        if let Some(ts) = &self.timestamp {
            ts.serialize(dest)?;
        }
        self.raw_value.serialize(dest)
    }
}

/// PORT_VALUE_CHANGE and its SMALL_* variants all carry a handle, a flags
/// byte (handled by the caller, see [`crate::wire::frame::carries_flags_byte`]),
/// and a trailing `another_value`-terminated list of values. The three wire
/// opcodes differ only in size class and whether timestamps are present;
/// this single struct models all of them, with `has_timestamp` selecting
/// which opcode to emit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortValueChange {
    pub handle: Handle,
    pub values: Vec<PortValue>,
}

impl Serialize for PortValueChange {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.handle.serialize(dest)?;
        for (i, value) in self.values.iter().enumerate() {
            value.serialize(dest)?;
            let another_value = i + 1 < self.values.len();
            another_value.serialize(dest)?;
        }
        Ok(())
    }
}

impl PortValueChange {
    /// Reads the handle plus an `another_value`-terminated value list. The
    /// caller supplies `has_timestamp` (opcode-dependent) since it isn't
    /// self-describing on the wire.
    pub fn read(
        src: &mut impl std::io::Read,
        has_timestamp: bool,
    ) -> std::io::Result<Self> {
        let mut handle = Handle::default();
        handle.deserialize(src)?;
        let mut values = Vec::new();
        loop {
            let mut change_type = ChangeType::default();
            change_type.deserialize(src)?;
            let timestamp = if has_timestamp {
                let mut ts = WireTimestamp::default();
                ts.deserialize(src)?;
                Some(ts)
            } else {
                None
            };
            let mut raw_value = Vec::new();
            raw_value.deserialize(src)?;
            values.push(PortValue { change_type, timestamp, raw_value });
            let mut another_value = false;
            another_value.deserialize(src)?;
            if !another_value {
                break;
            }
        }
        Ok(Self { handle, values })
    }
}

/// `RPC_CALL`'s `call_type` discriminant (§4.3).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum CallType {
    #[default]
    Message = 0,
    Request = 1,
    Response = 2,
}
WireEnumU8!(CallType);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RpcCall {
    pub sender_handle: Handle,
    pub call_type: CallType,
    pub interface_type_index: u32,
    pub function_index: u32,
    /// Present only when `call_type == Response`.
    pub call_id: Option<u64>,
    pub raw_args: Vec<u8>,
}

impl Serialize for RpcCall {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.sender_handle.serialize(dest)?;
        self.call_type.serialize(dest)?;
        self.interface_type_index.serialize(dest)?;
        self.function_index.serialize(dest)?;
        if self.call_type == CallType::Response {
            self.call_id.unwrap_or_default().serialize(dest)?;
        }
        self.raw_args.serialize(dest)
    }
}
impl Deserialize for RpcCall {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.sender_handle.deserialize(src)?;
        self.call_type.deserialize(src)?;
        self.interface_type_index.deserialize(src)?;
        self.function_index.deserialize(src)?;
        self.call_id = if self.call_type == CallType::Response {
            let mut id = 0u64;
            id.deserialize(src)?;
            Some(id)
        } else {
            None
        };
        self.raw_args.deserialize(src)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullCall {
    pub handle: Handle,
    pub call_id: u64,
    pub flags: u8,
}
DeserializeStruct!(PullCall, handle, call_id, flags);
SerializeStruct!(PullCall, handle, call_id, flags);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullCallReturn {
    pub call_id: u64,
    pub failed: bool,
    /// Present only when `!failed`.
    pub value: Option<PullCallValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullCallValue {
    pub type_index: u32,
    pub timestamp: WireTimestamp,
    pub raw_value: Vec<u8>,
}
DeserializeStruct!(PullCallValue, type_index, timestamp, raw_value);
SerializeStruct!(PullCallValue, type_index, timestamp, raw_value);

impl Serialize for PullCallReturn {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.call_id.serialize(dest)?;
        self.failed.serialize(dest)?;
        if let Some(v) = &self.value {
            v.serialize(dest)?;
        }
        Ok(())
    }
}
impl Deserialize for PullCallReturn {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.call_id.deserialize(src)?;
        self.failed.deserialize(src)?;
        self.value = if self.failed {
            None
        } else {
            let mut v = PullCallValue::default();
            v.deserialize(src)?;
            Some(v)
        };
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeLegacy {
    pub handle: Handle,
    pub strategy: Strategy,
    pub reverse: bool,
    pub minimal_update_interval_ms: i32,
    pub client_handle: Handle,
    pub encoding: u8,
}
DeserializeStruct!(
    SubscribeLegacy,
    handle,
    strategy,
    reverse,
    minimal_update_interval_ms,
    client_handle,
    encoding
);
SerializeStruct!(
    SubscribeLegacy,
    handle,
    strategy,
    reverse,
    minimal_update_interval_ms,
    client_handle,
    encoding
);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribeLegacy {
    pub handle: Handle,
}
DeserializeStruct!(UnsubscribeLegacy, handle);
SerializeStruct!(UnsubscribeLegacy, handle);

/// CONNECT_PORTS request (§4.3, §8 scenario 3). `publish_connection`
/// selects input vs output direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPorts {
    pub handle: Handle,
    pub client_port_path: PortPath,
    pub static_parameters: StaticConnectorParameters,
    pub dynamic_parameters: DynamicConnectorParameters,
    pub publish_connection: bool,
    pub is_tool_connection: bool,
}
DeserializeStruct!(
    ConnectPorts,
    handle,
    client_port_path,
    static_parameters,
    dynamic_parameters,
    publish_connection,
    is_tool_connection
);
SerializeStruct!(
    ConnectPorts,
    handle,
    client_port_path,
    static_parameters,
    dynamic_parameters,
    publish_connection,
    is_tool_connection
);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPortsError {
    pub handle: Handle,
    pub message: String,
}
DeserializeStruct!(ConnectPortsError, handle, message);
SerializeStruct!(ConnectPortsError, handle, message);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateConnection {
    pub handle: Handle,
    pub dynamic_parameters: DynamicConnectorParameters,
}

impl Serialize for UpdateConnection {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.handle.serialize(dest)?;
        self.dynamic_parameters.minimal_update_interval_ms.serialize(dest)?;
        self.dynamic_parameters.high_priority.serialize(dest)?;
        self.dynamic_parameters.strategy.serialize(dest)
    }
}
impl Deserialize for UpdateConnection {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.handle.deserialize(src)?;
        self.dynamic_parameters.minimal_update_interval_ms.deserialize(src)?;
        self.dynamic_parameters.high_priority.deserialize(src)?;
        self.dynamic_parameters.strategy.deserialize(src)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectPorts {
    pub handle: Handle,
}
DeserializeStruct!(DisconnectPorts, handle);
SerializeStruct!(DisconnectPorts, handle);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectorLifecycle {
    pub handle: Handle,
}
DeserializeStruct!(ConnectorLifecycle, handle);
SerializeStruct!(ConnectorLifecycle, handle);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriConnectorCreated {
    pub handle: Handle,
    pub uri: String,
}
DeserializeStruct!(UriConnectorCreated, handle, uri);
SerializeStruct!(UriConnectorCreated, handle, uri);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriConnectorUpdated {
    pub handle: Handle,
    pub status: String,
}
DeserializeStruct!(UriConnectorUpdated, handle, status);
SerializeStruct!(UriConnectorUpdated, handle, status);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriConnectorDeleted {
    pub handle: Handle,
}
DeserializeStruct!(UriConnectorDeleted, handle);
SerializeStruct!(UriConnectorDeleted, handle);

/// Full per-peer port description carried by STRUCTURE_CREATED (§3 "Remote
/// port record").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemotePortInfo {
    pub handle: Handle,
    pub path: PortPath,
    pub flags: PortFlags,
    pub type_index: u32,
    pub strategy: Strategy,
}
DeserializeStruct!(RemotePortInfo, handle, path, flags, type_index, strategy);
SerializeStruct!(RemotePortInfo, handle, path, flags, type_index, strategy);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureCreated {
    pub info: RemotePortInfo,
}
DeserializeStruct!(StructureCreated, info);
SerializeStruct!(StructureCreated, info);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureChanged {
    pub handle: Handle,
    pub strategy: Strategy,
}
DeserializeStruct!(StructureChanged, handle, strategy);
SerializeStruct!(StructureChanged, handle, strategy);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructureDeleted {
    pub handle: Handle,
}
DeserializeStruct!(StructureDeleted, handle);
SerializeStruct!(StructureDeleted, handle);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeUpdate {
    pub type_index: u32,
    pub legacy_update_time: u16,
}
DeserializeStruct!(TypeUpdate, type_index, legacy_update_time);
SerializeStruct!(TypeUpdate, type_index, legacy_update_time);

/// Remote register kind discriminant (§4.8), reused by [`crate::registers`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum RegisterKind {
    #[default]
    Type = 0,
    StaticCast = 1,
    ConversionOperation = 2,
    UriScheme = 3,
    CreateAction = 4,
}
WireEnumU32!(RegisterKind);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::deserialize;
    use std::io::Cursor;

    #[test]
    fn port_value_change_round_trips_multiple_values() {
        let msg = PortValueChange {
            handle: Handle(7),
            values: vec![
                PortValue { change_type: ChangeType::Initial, timestamp: Some(WireTimestamp { seconds: 1, nanos: 2 }), raw_value: vec![1, 2, 3] },
                PortValue { change_type: ChangeType::Change, timestamp: Some(WireTimestamp { seconds: 3, nanos: 4 }), raw_value: vec![9] },
            ],
        };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        let back = PortValueChange::read(&mut Cursor::new(buf), true).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn port_value_change_without_timestamp_round_trips() {
        let msg = PortValueChange {
            handle: Handle(1),
            values: vec![PortValue { change_type: ChangeType::FinalPush, timestamp: None, raw_value: vec![] }],
        };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        let back = PortValueChange::read(&mut Cursor::new(buf), false).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn rpc_call_response_carries_call_id() {
        let msg = RpcCall {
            sender_handle: Handle(1),
            call_type: CallType::Response,
            interface_type_index: 2,
            function_index: 3,
            call_id: Some(99),
            raw_args: vec![5, 6],
        };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        let back: RpcCall = deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn rpc_call_message_omits_call_id() {
        let msg = RpcCall {
            sender_handle: Handle(1),
            call_type: CallType::Message,
            interface_type_index: 2,
            function_index: 3,
            call_id: None,
            raw_args: vec![],
        };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        let back: RpcCall = deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.call_id, None);
    }

    #[test]
    fn pull_call_return_failed_has_no_value() {
        let msg = PullCallReturn { call_id: 1, failed: true, value: None };
        let mut buf = Vec::new();
        msg.serialize(&mut buf).unwrap();
        let back: PullCallReturn = deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(msg, back);
    }
}
