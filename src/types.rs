//! Core data types shared across the wire protocol, connection engine, and
//! remote runtime: handles, paths, port descriptors, and the small
//! byte-for-byte wire value types (§3 DATA MODEL).

use std::fmt;

use crate::wire::codec::{Deserialize, Serialize};
use crate::{DeserializeStruct, SerializeStruct};

/// Opaque 32-bit identifier issued by the local runtime for a framework
/// element (port, connector, …). Wire messages carry handles; translation
/// to the local object is a pure lookup through [`crate::host::PortGraph`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

impl Handle {
    pub const INVALID: Handle = Handle(u32::MAX);
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serialize for Handle {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}
impl Deserialize for Handle {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

/// An ordered sequence of name segments identifying a port in a runtime's
/// tree, optionally authority-qualified with the owning peer's name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PortPath {
    pub authority: Option<String>,
    pub segments: Vec<String>,
}

impl PortPath {
    pub fn local(segments: Vec<String>) -> Self {
        Self { authority: None, segments }
    }

    pub fn with_authority(authority: impl Into<String>, segments: Vec<String>) -> Self {
        Self { authority: Some(authority.into()), segments }
    }
}

impl fmt::Display for PortPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(a) = &self.authority {
            write!(f, "{a}:")?;
        }
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl Serialize for PortPath {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.authority.clone().unwrap_or_default().serialize(dest)?;
        (self.segments.len() as u32).serialize(dest)?;
        for s in &self.segments {
            s.clone().serialize(dest)?;
        }
        Ok(())
    }
}
impl Deserialize for PortPath {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let mut authority = String::new();
        authority.deserialize(src)?;
        self.authority = if authority.is_empty() { None } else { Some(authority) };
        let mut count = 0u32;
        count.deserialize(src)?;
        self.segments.clear();
        for _ in 0..count {
            let mut s = String::new();
            s.deserialize(src)?;
            self.segments.push(s);
        }
        Ok(())
    }
}

/// A wire timestamp: seconds and nanoseconds since an epoch chosen by the
/// embedder (the core never interprets it, only carries it).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WireTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}
DeserializeStruct!(WireTimestamp, seconds, nanos);
SerializeStruct!(WireTimestamp, seconds, nanos);

impl WireTimestamp {
    /// Stamps outbound port-value traffic with the wall-clock time at the
    /// moment of encoding (§4.3 PORT_VALUE_CHANGE).
    pub fn now() -> Self {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self { seconds: since_epoch.as_secs() as i64, nanos: since_epoch.subsec_nanos() }
    }
}

/// Port direction/behavior flags (§3 Port). Modeled as a bitset the way
/// `nfs3::fs::fsinfo3::properties` models file system capability bits,
/// generalized to the richer flag set this protocol needs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortFlags(pub u32);

impl PortFlags {
    pub const OUTPUT_PORT: u32 = 1 << 0;
    pub const INPUT_PORT: u32 = 1 << 1;
    pub const SHARED: u32 = 1 << 2;
    pub const NETWORK_ELEMENT: u32 = 1 << 3;
    pub const PUSH_STRATEGY: u32 = 1 << 4;
    pub const VOLATILE: u32 = 1 << 5;
    pub const TOOL_PORT: u32 = 1 << 6;
    pub const ACCEPTS_DATA: u32 = 1 << 7;
    pub const EMITS_DATA: u32 = 1 << 8;
    pub const NO_INITIAL_PUSHING: u32 = 1 << 9;

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u32) -> Self {
        Self(self.0 | bit)
    }
}

impl std::ops::BitOr for PortFlags {
    type Output = PortFlags;
    fn bitor(self, rhs: Self) -> Self {
        PortFlags(self.0 | rhs.0)
    }
}

impl Serialize for PortFlags {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}
impl Deserialize for PortFlags {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

/// Data-port push/pull strategy. -1 means "no strategy" (not a data port or
/// not yet subscribed), 0 is pull-only, n>=1 is push with a queue of length
/// n. Kept signed end to end (see DESIGN.md): the wire and in-memory
/// representations are both `i16`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Strategy(pub i16);

impl Strategy {
    pub const NONE: Strategy = Strategy(-1);
    pub const PULL_ONLY: Strategy = Strategy(0);

    pub fn is_push(self) -> bool {
        self.0 >= 1
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::NONE
    }
}

impl Serialize for Strategy {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        use byteorder::WriteBytesExt;
        dest.write_i16::<byteorder::BigEndian>(self.0)
    }
}
impl Deserialize for Strategy {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        use byteorder::ReadBytesExt;
        self.0 = src.read_i16::<byteorder::BigEndian>()?;
        Ok(())
    }
}

/// Static parameters of a connector (§3 Connector): identify the server
/// port by path plus an optional server-side conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticConnectorParameters {
    pub server_port_path: PortPath,
    pub server_side_conversion: Option<ServerSideConversion>,
    pub reverse_push: bool,
}

/// A server-side type conversion requested by a connector: up to two named
/// operations with parameters, plus the intermediate and destination types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerSideConversion {
    pub operation_1: String,
    pub operation_1_parameter: String,
    pub operation_2: String,
    pub operation_2_parameter: String,
    pub intermediate_type: String,
    pub destination_type: String,
}
DeserializeStruct!(
    ServerSideConversion,
    operation_1,
    operation_1_parameter,
    operation_2,
    operation_2_parameter,
    intermediate_type,
    destination_type
);
SerializeStruct!(
    ServerSideConversion,
    operation_1,
    operation_1_parameter,
    operation_2,
    operation_2_parameter,
    intermediate_type,
    destination_type
);

impl Serialize for StaticConnectorParameters {
    fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.server_port_path.serialize(dest)?;
        self.server_side_conversion.is_some().serialize(dest)?;
        if let Some(c) = &self.server_side_conversion {
            c.serialize(dest)?;
        }
        self.reverse_push.serialize(dest)
    }
}
impl Deserialize for StaticConnectorParameters {
    fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.server_port_path.deserialize(src)?;
        let mut has_conversion = false;
        has_conversion.deserialize(src)?;
        self.server_side_conversion = if has_conversion {
            let mut c = ServerSideConversion::default();
            c.deserialize(src)?;
            Some(c)
        } else {
            None
        };
        self.reverse_push.deserialize(src)
    }
}

/// Dynamic parameters of a connector (§3 Connector / §4.4): may change over
/// the connector's lifetime without tearing it down.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicConnectorParameters {
    pub minimal_update_interval_ms: i32,
    pub high_priority: bool,
    pub strategy: Strategy,
}
DeserializeStruct!(DynamicConnectorParameters, minimal_update_interval_ms, high_priority, strategy);
SerializeStruct!(DynamicConnectorParameters, minimal_update_interval_ms, high_priority, strategy);

impl DynamicConnectorParameters {
    /// OR-reduces `high_priority` and takes the element-wise minimum of
    /// `minimal_update_interval` across a set of connectors sharing a
    /// client port binding (§4.4 step 2).
    pub fn combine(values: impl IntoIterator<Item = DynamicConnectorParameters>) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let mut combined = first;
        for v in iter {
            combined.high_priority |= v.high_priority;
            combined.minimal_update_interval_ms =
                combined.minimal_update_interval_ms.min(v.minimal_update_interval_ms);
            // Strategy is not combined here; callers decide strategy precedence
            // (the representative connector's strategy wins, per §4.4 step 2).
        }
        Some(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn port_path_round_trips() {
        let p = PortPath::with_authority("peer1", vec!["a".into(), "b".into()]);
        let mut buf = Vec::new();
        p.serialize(&mut buf).unwrap();
        let mut out = PortPath::default();
        out.deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(p, out);
    }

    #[test]
    fn port_path_without_authority_round_trips() {
        let p = PortPath::local(vec!["x".into()]);
        let mut buf = Vec::new();
        p.serialize(&mut buf).unwrap();
        let mut out = PortPath::default();
        out.deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(out.authority, None);
        assert_eq!(out.segments, vec!["x".to_string()]);
    }

    #[test]
    fn strategy_none_round_trips_negative_one() {
        let mut buf = Vec::new();
        Strategy::NONE.serialize(&mut buf).unwrap();
        let mut out = Strategy::default();
        out.deserialize(&mut Cursor::new(buf)).unwrap();
        assert_eq!(out, Strategy::NONE);
        assert!(!out.is_push());
    }

    #[test]
    fn dynamic_params_combine_or_reduces_priority_and_mins_interval() {
        let a = DynamicConnectorParameters {
            minimal_update_interval_ms: 100,
            high_priority: false,
            strategy: Strategy(4),
        };
        let b = DynamicConnectorParameters {
            minimal_update_interval_ms: 20,
            high_priority: true,
            strategy: Strategy(2),
        };
        let combined = DynamicConnectorParameters::combine([a, b]).unwrap();
        assert_eq!(combined.minimal_update_interval_ms, 20);
        assert!(combined.high_priority);
    }
}
