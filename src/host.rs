//! Host collaborator traits: the seams this crate calls through but never
//! implements. Grounded in `vfs::NFSFileSystem` — a mostly-abstract
//! `#[async_trait]` trait with a handful of concrete default methods,
//! handed to the protocol layer as `Arc<dyn Trait + Send + Sync>`.

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::types::{Handle, PortFlags, PortPath, Strategy};

/// A snapshot of one port as the host's port graph currently knows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub handle: Handle,
    pub path: PortPath,
    pub flags: PortFlags,
    pub type_index: u32,
    pub strategy: Strategy,
}

/// Held while the worker mutates the host's port graph (CONNECT_PORTS,
/// DISCONNECT_PORTS, UPDATE_CONNECTION with a strategy flip,
/// STRUCTURE_CREATED/CHANGED/DELETED). Dropping it releases the lock.
pub trait StructureGuard {}

/// Best-effort mutual exclusion over the host's port graph (§5 "Suspension
/// and blocking"). The worker never blocks on this lock: if `try_lock`
/// fails the calling opcode handler defers instead.
pub trait StructureLock: Send + Sync {
    fn try_lock(&self) -> Option<Box<dyn StructureGuard + '_>>;
}

/// The host's port graph: enumeration, path resolution, value I/O, and pull
/// handler installation. The trait boundary `vfs::NFSFileSystem` models for
/// a file system, generalized to a port graph.
#[async_trait]
pub trait PortGraph: Send + Sync {
    /// Resolves a path to a local handle, or `None` if no such port exists.
    async fn resolve(&self, path: &PortPath) -> Option<Handle>;

    /// Current host-side snapshot of a port, or `None` if the handle is
    /// stale.
    async fn port_info(&self, handle: Handle) -> Option<PortInfo>;

    /// All ports currently flagged shared, for the initial structure-exchange
    /// catch-up scan (§4.7). Must be called with the structure lock held.
    async fn shared_ports(&self) -> Vec<PortInfo>;

    /// Publishes a raw, already-decoded value onto a ready data port.
    /// Returns an error if the port is not a ready data port or the type
    /// does not match.
    async fn write_value(&self, handle: Handle, raw_value: &[u8]) -> Result<(), ConnectError>;

    /// Pulls the current value of a ready data port, bypassing any locally
    /// installed pull handler (§4.3 PULLCALL: "ignoring local pull
    /// handlers").
    async fn pull_value(&self, handle: Handle) -> Option<Vec<u8>>;

    /// Creates the hidden server port that mirrors an incoming subscription
    /// (§4.3 CONNECT_PORTS), wired to `served_port` directly or through a
    /// conversion port resolved by the caller. Returns the new port's
    /// handle.
    async fn create_server_port(
        &self,
        served_port: Handle,
        flags: PortFlags,
        type_index: u32,
    ) -> Result<Handle, ConnectError>;

    /// Creates a hidden conversion port of `destination_type_index`,
    /// connected to `source_port` via a non-primary connector (§4.3 CONNECT_PORTS
    /// server-side conversion branch).
    async fn create_conversion_port(
        &self,
        source_port: Handle,
        destination_type_index: u32,
        operations: &[(String, String)],
    ) -> Result<Handle, ConnectError>;

    /// Removes a port previously created by this trait (server or conversion
    /// port). Orphaned conversion ports are deleted by the caller first.
    async fn remove_port(&self, handle: Handle);

    /// Updates a server or client port's dynamic connection data
    /// (UPDATE_CONNECTION / subscription reconciliation).
    async fn update_dynamic_parameters(&self, handle: Handle, strategy: Strategy, min_interval_ms: i32, high_priority: bool);

    /// Local connectors currently bound to `remote_port`, supplied fresh on
    /// every reconciliation pass so
    /// [`crate::subscription::SubscriptionController::check_subscription`]
    /// can recompute the coalesced binding state (§4.4 "CheckSubscription").
    /// Empty once the last connector has been removed.
    async fn connectors_for_remote_port(&self, remote_port: Handle) -> Vec<crate::subscription::Connector>;
}

/// Per-local-port RPC-call argument buffer pool (§3 Invariants, §5 "Shared
/// resources": "kept per-local-port to keep type homogeneity per pool").
pub trait BufferPool: Send + Sync {
    /// Borrows a zeroed buffer of at least `len` bytes for one call's
    /// deserialized arguments.
    fn acquire(&self, len: usize) -> Vec<u8>;

    /// Returns a buffer for reuse once the call has been dispatched.
    fn release(&self, buf: Vec<u8>);
}

/// The byte-level transport this crate hands outgoing batches to and
/// receives incoming batches from. Discovery, handshake, and the read loop
/// itself stay outside the core (§1 OUT OF SCOPE); this trait is only the
/// send half plus a marker for which connection (primary/express) owns it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one complete, shell-patched batch. The back-buffer loan (§9
    /// DESIGN NOTES) is the caller's concern: this call is given exclusive
    /// ownership of `batch` for its duration.
    async fn send(&self, batch: Vec<u8>) -> std::io::Result<()>;
}
