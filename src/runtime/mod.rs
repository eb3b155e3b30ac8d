//! The remote runtime (§3, §4.3): per-peer state tying together the
//! connection pair, the server/remote port maps, the RPC/pull registries,
//! and opcode dispatch. Grounded in `protocol::rpc::wire::handle_rpc` +
//! `tcp::process_socket` for the "one struct per peer, owns maps and
//! registries, dispatches by message kind" shape.

pub mod dispatch;
pub mod remote_port;
pub mod server_port;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::calls::{PullRegistry, RpcRegistry};
use crate::connection::ConnectionKind;
use crate::error::{ConnectError, PullFailure};
use crate::host::{PortGraph, StructureLock};
use crate::registers::RegisterTables;
use crate::runtime::remote_port::RemotePortRecord;
use crate::runtime::server_port::ServerPort;
use crate::types::Handle;
use crate::wire::codec::Serialize;
use crate::wire::messages::ConnectPortsError;
use crate::wire::opcode::Opcode;

pub use dispatch::{dispatch, DispatchOutcome};

/// One queued outbound message, opaque to the connection engine until the
/// worker serializes it into the target connection's front buffer.
pub struct OutboundMessage {
    pub connection: ConnectionKind,
    pub opcode: Opcode,
    pub flags_byte: Option<u8>,
    pub body: Vec<u8>,
}

/// Per-peer state created on first primary-connection bind and torn down
/// when the primary connection closes (§3 "Lifecycle").
pub struct RemoteRuntime {
    pub host: Arc<dyn PortGraph>,
    pub structure_lock: Arc<dyn StructureLock>,
    pub registers: RegisterTables,
    pub server_port_map: HashMap<Handle, ServerPort>,
    pub remote_port_map: HashMap<Handle, RemotePortRecord>,
    pub rpc_registry: RpcRegistry,
    pub pull_registry: PullRegistry,
    pub received_data_after_last_connect: bool,
    pub outbound: Vec<OutboundMessage>,
    /// Client ports needing `CheckSubscription` re-run, collected per-tick
    /// per §4.6's "deferred and deduplicated" requirement; the worker drains
    /// and clears this after every tick.
    pub dirty_client_ports: HashSet<Handle>,
    pending_pulls: HashMap<Handle, Vec<tokio::sync::oneshot::Sender<Result<Vec<u8>, PullFailure>>>>,
}

impl RemoteRuntime {
    pub fn new(host: Arc<dyn PortGraph>, structure_lock: Arc<dyn StructureLock>) -> Self {
        Self {
            host,
            structure_lock,
            registers: RegisterTables::new(),
            server_port_map: HashMap::new(),
            remote_port_map: HashMap::new(),
            rpc_registry: RpcRegistry::new(),
            pull_registry: PullRegistry::new(),
            received_data_after_last_connect: false,
            outbound: Vec::new(),
            dirty_client_ports: HashSet::new(),
            pending_pulls: HashMap::new(),
        }
    }

    pub fn enqueue_outbound<T: Serialize>(
        &mut self,
        opcode: Opcode,
        connection: ConnectionKind,
        flags_byte: Option<u8>,
        payload: &T,
    ) -> anyhow::Result<()> {
        let mut body = Vec::new();
        payload.serialize(&mut body)?;
        self.outbound.push(OutboundMessage { connection, opcode, flags_byte, body });
        Ok(())
    }

    pub fn send_connect_error(&mut self, handle: Handle, error: ConnectError) -> anyhow::Result<()> {
        self.enqueue_outbound(
            Opcode::ConnectPortsError,
            ConnectionKind::Primary,
            None,
            &ConnectPortsError { handle, message: error.to_string() },
        )
    }

    /// Registers a waiter for a pull call's resolution; `resolve_pull`
    /// fulfills it once a PULLCALL_RETURN or timeout arrives.
    pub fn register_pull_waiter(&mut self, local_port: Handle, sender: tokio::sync::oneshot::Sender<Result<Vec<u8>, PullFailure>>) {
        self.pending_pulls.entry(local_port).or_default().push(sender);
    }

    pub fn resolve_pull(&mut self, local_port: Handle, result: Result<Vec<u8>, PullFailure>) {
        if let Some(waiters) = self.pending_pulls.remove(&local_port) {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }

    pub fn on_new_remote_port(&mut self, handle: Handle) {
        self.dirty_client_ports.insert(handle);
    }

    pub fn mark_client_port_strategy_changed(&mut self, client_port: Handle) {
        self.dirty_client_ports.insert(client_port);
    }

    pub fn mark_client_port_disconnected(&mut self, client_port: Handle) {
        self.dirty_client_ports.insert(client_port);
    }

    pub fn mark_client_port_errored(&mut self, client_port: Handle) {
        self.dirty_client_ports.insert(client_port);
    }

    /// Evicts timed-out RPC calls and pull requests, resolving the latter's
    /// waiters with [`PullFailure::NoConnection`] (§4.5, §8 scenario 6).
    pub fn evict_timeouts(&mut self, time_now: std::time::Duration) {
        self.rpc_registry.evict_timed_out(time_now);
        for (local_port, failure) in self.pull_registry.evict_expired(time_now) {
            self.resolve_pull(local_port, Err(failure));
        }
    }
}
