//! The client-side subscription controller (§4.4): coalesces connectors
//! bound to the same remote port onto a single client port binding, and
//! issues CONNECT_PORTS/UPDATE_CONNECTION/DISCONNECT_PORTS (or their legacy
//! equivalents) as effective dynamic parameters change.
//!
//! Grounded in the `vfs::NFSFileSystem` trait-boundary pattern: the
//! controller never touches the host port graph directly, only through
//! [`crate::host::PortGraph`].

use std::collections::HashMap;

use crate::types::{DynamicConnectorParameters, Handle, PortPath, StaticConnectorParameters};

/// A logical subscription request from a local connector to a remote port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connector {
    pub handle: Handle,
    pub remote_port: Handle,
    pub static_parameters: StaticConnectorParameters,
    pub dynamic_parameters: DynamicConnectorParameters,
    pub legacy: bool,
}

/// A hidden local port bridging a remote port to one or more connectors
/// sharing identical static parameters (§3 "Client port binding").
pub struct ClientPortBinding {
    pub client_port: Handle,
    pub remote_port: Handle,
    pub static_parameters: StaticConnectorParameters,
    pub used_by: Vec<Handle>,
    pub current_dynamic: Option<DynamicConnectorParameters>,
    pub connected: bool,
    /// Whether this binding was established via `SubscribeLegacy` rather
    /// than `ConnectPorts`; decides whether teardown emits
    /// `UnsubscribeLegacy` or `DisconnectPorts` (§4.4 step 6).
    pub legacy: bool,
}

/// Action the caller must perform on the wire as a result of reconciliation
/// (§4.4 step 5-6). The controller only decides which action is needed; the
/// caller (runtime/worker layer) serializes and sends it.
#[derive(Debug, PartialEq, Eq)]
pub enum SubscriptionAction {
    None,
    ConnectPorts { client_port: Handle, remote_port: Handle, dynamic: DynamicConnectorParameters },
    SubscribeLegacy { client_port: Handle, remote_port: Handle, dynamic: DynamicConnectorParameters },
    UpdateConnection { client_port: Handle, dynamic: DynamicConnectorParameters },
    DisconnectPorts { client_port: Handle },
    UnsubscribeLegacy { client_port: Handle },
}

#[derive(Default)]
pub struct SubscriptionController {
    bindings: HashMap<Handle, ClientPortBinding>,
    next_client_port: u32,
}

impl SubscriptionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// `CheckSubscription` (§4.4 steps 1-5) for one remote port, given every
    /// connector currently bound to it.
    ///
    /// `allocate_client_port` is called only when no existing binding
    /// matches `static_parameters`; it is the caller's hook into
    /// [`crate::host::PortGraph::create_server_port`]-equivalent client-side
    /// port creation (step 3).
    pub fn check_subscription(
        &mut self,
        remote_port: Handle,
        connectors: &[Connector],
        mut allocate_client_port: impl FnMut() -> Handle,
    ) -> SubscriptionAction {
        if connectors.is_empty() {
            return self.remove_binding(remote_port);
        }

        // Step 2: representative connector + OR-reduced/min-reduced dynamic
        // parameters.
        let representative = &connectors[0];
        let effective = DynamicConnectorParameters::combine(connectors.iter().map(|c| c.dynamic_parameters))
            .unwrap_or(representative.dynamic_parameters);

        let existing = self
            .bindings
            .values()
            .find(|b| b.remote_port == remote_port && b.static_parameters == representative.static_parameters)
            .map(|b| b.client_port);

        let client_port = match existing {
            Some(port) => port,
            None => {
                let port = allocate_client_port();
                self.bindings.insert(
                    port,
                    ClientPortBinding {
                        client_port: port,
                        remote_port,
                        static_parameters: representative.static_parameters.clone(),
                        used_by: Vec::new(),
                        current_dynamic: None,
                        connected: false,
                        legacy: representative.legacy,
                    },
                );
                port
            }
        };

        let binding = self.bindings.get_mut(&client_port).expect("just inserted or found");
        binding.used_by = connectors.iter().map(|c| c.handle).collect();

        // Step 5: idempotence law — unchanged effective parameters emit
        // nothing.
        if binding.current_dynamic == Some(effective) {
            return SubscriptionAction::None;
        }

        let first_time = binding.current_dynamic.is_none();
        binding.current_dynamic = Some(effective);
        binding.connected = true;

        if first_time {
            if representative.legacy {
                SubscriptionAction::SubscribeLegacy { client_port, remote_port, dynamic: effective }
            } else {
                SubscriptionAction::ConnectPorts { client_port, remote_port, dynamic: effective }
            }
        } else if representative.legacy {
            // §4.4 step 5: "no UPDATE_CONNECTION opcode exists in legacy" ->
            // re-emit SUBSCRIBE_LEGACY.
            SubscriptionAction::SubscribeLegacy { client_port, remote_port, dynamic: effective }
        } else {
            SubscriptionAction::UpdateConnection { client_port, dynamic: effective }
        }
    }

    /// Managed deletion of a client port (§4.4 step 6).
    pub fn remove_binding(&mut self, remote_port: Handle) -> SubscriptionAction {
        let client_port = match self.bindings.values().find(|b| b.remote_port == remote_port) {
            Some(b) => b.client_port,
            None => return SubscriptionAction::None,
        };
        let binding = self.bindings.remove(&client_port).expect("looked up above");
        if !binding.connected {
            return SubscriptionAction::None;
        }
        if binding.legacy {
            SubscriptionAction::UnsubscribeLegacy { client_port }
        } else {
            SubscriptionAction::DisconnectPorts { client_port }
        }
    }

    pub fn binding(&self, client_port: Handle) -> Option<&ClientPortBinding> {
        self.bindings.get(&client_port)
    }
}
