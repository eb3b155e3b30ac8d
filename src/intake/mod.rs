//! Cross-thread event intake (§4.6), grounded in
//! `protocol::rpc::command_queue::CommandQueue`'s channel-fed ordered-worker
//! pattern — generalized from one queue to three, and from a spawned worker
//! task to entries drained by an externally-driven `tick()` (see
//! [`crate::worker`]).

use std::collections::BTreeSet;

use tokio::sync::mpsc;

use crate::types::{Handle, PortPath, Strategy};

/// Minimum structure-exchange relevance level a peer must have requested to
/// receive a given structure event (§4.6, §4.7).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelevanceLevel {
    SharedPorts,
    CompleteStructure,
    Finstruct,
}

#[derive(Clone, Debug)]
pub enum StructureEvent {
    ElementCreated { handle: Handle, path: PortPath, level: RelevanceLevel },
    ElementChanged { handle: Handle, strategy: Strategy, level: RelevanceLevel },
    ElementRemoved { handle: Handle, level: RelevanceLevel },
    ConnectorCreated { handle: Handle },
    ConnectorDeleted { handle: Handle },
    UriConnectorAdded { handle: Handle, uri: String },
    UriConnectorUpdated { handle: Handle, status: String },
    UriConnectorDeleted { handle: Handle },
    /// The client port bound to `handle` needs `CheckSubscription` re-run
    /// (strategy change propagated from a remote STRUCTURE_CHANGED, or a
    /// local connector's dynamic parameters changed).
    ClientPortStrategyChanged { handle: Handle },
    RpcPortDeleted { handle: Handle },
}

/// What changed about a published port value, mirroring
/// [`crate::wire::messages::ChangeType`] but at the host-event level (before
/// it is serialized onto the wire).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueChangeKind {
    Initial,
    Change,
    FinalPush,
}

pub struct PortValueEvent {
    pub port: Handle,
    pub kind: ValueChangeKind,
    pub raw_value: Vec<u8>,
}

pub enum CallIntakeEvent {
    /// A server port has RPC calls queued to send to its remote peer.
    PendingRpcCalls { port: Handle },
    /// A self-initiated pull request.
    PullRequest { remote_port: Handle, local_port: Handle },
}

/// The three producer-thread-fed queues. Each is an unbounded `mpsc`
/// channel, matching `CommandQueue`'s channel-fed single-worker shape; the
/// "lock-free, borrowed from per-queue buffer pools" language in §4.6/§5 is
/// satisfied by `mpsc`'s own internal queue plus the host's
/// [`crate::host::BufferPool`] for the values actually carried.
pub struct IntakeQueues {
    pub structure_tx: mpsc::UnboundedSender<StructureEvent>,
    structure_rx: mpsc::UnboundedReceiver<StructureEvent>,
    pub value_tx: mpsc::UnboundedSender<PortValueEvent>,
    value_rx: mpsc::UnboundedReceiver<PortValueEvent>,
    pub call_tx: mpsc::UnboundedSender<CallIntakeEvent>,
    call_rx: mpsc::UnboundedReceiver<CallIntakeEvent>,
}

impl IntakeQueues {
    pub fn new() -> Self {
        let (structure_tx, structure_rx) = mpsc::unbounded_channel();
        let (value_tx, value_rx) = mpsc::unbounded_channel();
        let (call_tx, call_rx) = mpsc::unbounded_channel();
        Self { structure_tx, structure_rx, value_tx, value_rx, call_tx, call_rx }
    }

    /// Drains all three queues in the fixed per-tick order (structure ->
    /// values -> calls) required by §4.6, so a value arriving after its
    /// port's creation event sees a fully installed mapping.
    ///
    /// Structure events are collected first and handed to `on_structure` as
    /// a batch so the caller can dedupe/sort the affected client ports and
    /// run `CheckSubscription` once per unique port, per §4.6's explicit
    /// "deferred and deduplicated" requirement.
    pub fn drain_tick(
        &mut self,
        mut on_structure: impl FnMut(Vec<StructureEvent>),
        mut on_value: impl FnMut(PortValueEvent),
        mut on_call: impl FnMut(CallIntakeEvent),
    ) {
        let mut structure_events = Vec::new();
        while let Ok(event) = self.structure_rx.try_recv() {
            structure_events.push(event);
        }
        if !structure_events.is_empty() {
            on_structure(structure_events);
        }

        while let Ok(event) = self.value_rx.try_recv() {
            on_value(event);
        }

        while let Ok(event) = self.call_rx.try_recv() {
            on_call(event);
        }
    }
}

impl Default for IntakeQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the client ports a batch of structure events affects, sorted and
/// deduplicated, per §4.6.
pub fn affected_client_ports(events: &[StructureEvent]) -> BTreeSet<Handle> {
    let mut ports = BTreeSet::new();
    for event in events {
        let handle = match event {
            StructureEvent::ElementCreated { handle, .. }
            | StructureEvent::ElementChanged { handle, .. }
            | StructureEvent::ElementRemoved { handle, .. }
            | StructureEvent::ConnectorCreated { handle }
            | StructureEvent::ConnectorDeleted { handle }
            | StructureEvent::UriConnectorAdded { handle, .. }
            | StructureEvent::UriConnectorUpdated { handle, .. }
            | StructureEvent::UriConnectorDeleted { handle }
            | StructureEvent::ClientPortStrategyChanged { handle }
            | StructureEvent::RpcPortDeleted { handle } => *handle,
        };
        ports.insert(handle);
    }
    ports
}
