//! Per-peer remote port records (§3 "Remote port record").

use crate::types::{Handle, PortFlags, PortPath, Strategy};

/// Static info about a remote port, as published by STRUCTURE_CREATED.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemotePortRecord {
    pub handle: Handle,
    pub path: PortPath,
    pub flags: PortFlags,
    pub type_index: u32,
    pub strategy: Strategy,
    /// Local client ports currently bound to this remote port (§3 "Remote
    /// port record": "a list of client port bindings").
    pub client_port_bindings: Vec<Handle>,
}

impl RemotePortRecord {
    pub fn new(handle: Handle, path: PortPath, flags: PortFlags, type_index: u32, strategy: Strategy) -> Self {
        Self { handle, path, flags, type_index, strategy, client_port_bindings: Vec::new() }
    }
}
