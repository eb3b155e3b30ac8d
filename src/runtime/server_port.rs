//! Server-side port records (§3 "Server port"): the hidden local port
//! mirroring an incoming subscription, keyed by the client-supplied
//! connection handle in `server_port_map`.

use crate::types::{DynamicConnectorParameters, Handle};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerPort {
    /// The connection handle this server port was registered under (equal
    /// to the remote client-side local port's handle, per §3 "Connector").
    pub connection_handle: Handle,
    /// The locally-created port mirroring the subscription; may be a
    /// conversion port rather than the served port directly.
    pub local_port: Handle,
    /// Set when a hidden conversion port was created for this subscription;
    /// deleted when this server port is torn down if no other server port
    /// still references it (§4.3 DISCONNECT_PORTS).
    pub conversion_port: Option<Handle>,
    pub dynamic: DynamicConnectorParameters,
}
