//! The protocol worker (§2 control flow, §5 concurrency model): drains
//! intake queues, paces sends, hands batches to the transport, and decodes
//! and dispatches inbound batches. Grounded in `tcp::process_socket`'s
//! `tokio::select!` read/write loop, adapted into a polled `tick()` since
//! this crate owns no transport of its own (the embedder's event loop drives
//! `tick()` instead of this crate spawning a task against a socket).
//!
//! One [`ProtocolWorker`] corresponds to one peer session: a
//! [`crate::runtime::RemoteRuntime`], its primary/optional-express
//! [`crate::connection::Connection`] pair, and the subscription controller
//! reconciling connectors bound to that peer's remote ports. An embedder
//! wiring up several peers runs several workers, matching §5's "All
//! connection state ... is owned by that worker" down to one worker per
//! connection pair rather than literally one per plugin instance — a
//! simplification recorded in DESIGN.md.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};
use tracing_attributes::instrument;

use crate::calls::pull::PullInfo;
use crate::config::Config;
use crate::connection::{Connection, ConnectionKind, DispatchResult, PendingPortSend};
use crate::host::{PortGraph, StructureLock, Transport};
use crate::intake::{affected_client_ports, CallIntakeEvent, IntakeQueues, PortValueEvent, ValueChangeKind};
use crate::runtime::{dispatch, DispatchOutcome, RemoteRuntime};
use crate::subscription::{SubscriptionAction, SubscriptionController};
use crate::types::{DynamicConnectorParameters, Handle, WireTimestamp};
use crate::wire::codec::Serialize;
use crate::wire::messages::{
    ChangeType, ConnectPorts, DisconnectPorts, PortValue, PortValueChange, PullCall, SubscribeLegacy,
    UnsubscribeLegacy, UpdateConnection,
};
use crate::wire::opcode::{DataEncoding, MessageFlags, Opcode};

/// Response timeout for self-initiated pull requests (§4.5); there is no
/// per-request override yet, so every `PullRequest` intake event uses this.
const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProtocolWorker {
    pub runtime: RemoteRuntime,
    pub subscription: SubscriptionController,
    pub primary: Connection,
    pub express: Option<Connection>,
    pub intake: IntakeQueues,
    config: Config,
    transport: Arc<dyn Transport>,
    express_transport: Option<Arc<dyn Transport>>,
    /// Batches that deferred mid-processing; retried at the start of the
    /// next tick before new bytes are considered (§4.2 receive path, §9
    /// DESIGN NOTES "Structure-lock defer").
    deferred_batches: VecDeque<(ConnectionKind, Vec<u8>, usize)>,
    /// Port-value sends waiting on pacing or a full ack window, carried
    /// across ticks (§4.2 step 4).
    pending_primary: VecDeque<PendingPortSend>,
    pending_express: VecDeque<PendingPortSend>,
    /// Per-port last-send time, for `PendingPortSend::min_interval` pacing.
    last_port_update: HashMap<Handle, Duration>,
    /// Synthesizes client-port handles for newly-created subscription
    /// bindings (§4.4 step 3); this crate owns the namespace since no host
    /// call creates a port for the *initiating* side of CONNECT_PORTS.
    next_client_port: u32,
    debug_protocol: bool,
}

impl ProtocolWorker {
    pub fn new(
        host: Arc<dyn PortGraph>,
        structure_lock: Arc<dyn StructureLock>,
        transport: Arc<dyn Transport>,
        express_transport: Option<Arc<dyn Transport>>,
        config: Config,
        debug_protocol: bool,
    ) -> Self {
        let has_express = express_transport.is_some();
        Self {
            runtime: RemoteRuntime::new(host, structure_lock),
            subscription: SubscriptionController::new(),
            primary: Connection::new(ConnectionKind::Primary, true),
            express: has_express.then(|| Connection::new(ConnectionKind::Express, true)),
            intake: IntakeQueues::new(),
            config,
            transport,
            express_transport,
            deferred_batches: VecDeque::new(),
            pending_primary: VecDeque::new(),
            pending_express: VecDeque::new(),
            last_port_update: HashMap::new(),
            next_client_port: 0,
            debug_protocol,
        }
    }

    /// One full worker cycle (§2 step (i)-(v)).
    #[instrument(skip(self))]
    pub async fn tick(&mut self, time_now: Duration) -> anyhow::Result<()> {
        self.drain_intake(time_now).await?;
        self.send_pending(time_now).await?;
        self.check_critical_ping(time_now);
        self.runtime.evict_timeouts(time_now);
        Ok(())
    }

    /// Feeds one received byte batch from the transport into the
    /// appropriate connection (§2 step (iv)-(v)).
    pub async fn feed(&mut self, connection: ConnectionKind, batch: Vec<u8>) -> anyhow::Result<()> {
        self.process_batch(connection, batch, 0).await
    }

    /// Drains the three intake queues in order and turns each event kind
    /// into outbound wire traffic: structure events mark remote ports dirty
    /// for subscription reconciliation, value events become paced
    /// `PendingPortSend`s, and call events drive the pull registry (§4.6).
    async fn drain_intake(&mut self, time_now: Duration) -> anyhow::Result<()> {
        let mut value_events = Vec::new();
        let mut call_events = Vec::new();
        {
            let dirty = &mut self.runtime.dirty_client_ports;
            self.intake.drain_tick(
                |events| {
                    for port in affected_client_ports(&events) {
                        dirty.insert(port);
                    }
                },
                |value| value_events.push(value),
                |call| call_events.push(call),
            );
        }
        self.reconcile_subscriptions().await?;
        self.encode_value_sends(value_events)?;
        self.handle_call_events(call_events, time_now)?;
        Ok(())
    }

    /// Re-runs `CheckSubscription` (§4.4) for every remote port marked dirty
    /// this tick, translating the resulting `SubscriptionAction` into an
    /// enqueued outbound message.
    async fn reconcile_subscriptions(&mut self) -> anyhow::Result<()> {
        let dirty: Vec<Handle> = self.runtime.dirty_client_ports.drain().collect();
        let host = self.runtime.host.clone();
        for remote_port in dirty {
            let connectors = host.connectors_for_remote_port(remote_port).await;
            let next_client_port = &mut self.next_client_port;
            let action = self.subscription.check_subscription(remote_port, &connectors, || {
                *next_client_port += 1;
                Handle(*next_client_port)
            });
            self.apply_subscription_action(remote_port, action)?;
        }
        Ok(())
    }

    fn apply_subscription_action(&mut self, remote_port: Handle, action: SubscriptionAction) -> anyhow::Result<()> {
        match action {
            SubscriptionAction::None => Ok(()),
            SubscriptionAction::ConnectPorts { client_port, dynamic, .. } => {
                let static_parameters =
                    self.subscription.binding(client_port).map(|b| b.static_parameters.clone()).unwrap_or_default();
                let client_port_path =
                    self.runtime.remote_port_map.get(&remote_port).map(|r| r.path.clone()).unwrap_or_default();
                let msg = ConnectPorts {
                    handle: client_port,
                    client_port_path,
                    static_parameters,
                    dynamic_parameters: dynamic,
                    publish_connection: false,
                    is_tool_connection: false,
                };
                self.runtime.enqueue_outbound(Opcode::ConnectPorts, ConnectionKind::Primary, None, &msg)
            }
            SubscriptionAction::SubscribeLegacy { client_port, dynamic, .. } => {
                let msg = SubscribeLegacy {
                    handle: remote_port,
                    strategy: dynamic.strategy,
                    reverse: false,
                    minimal_update_interval_ms: dynamic.minimal_update_interval_ms,
                    client_handle: client_port,
                    encoding: 0,
                };
                self.runtime.enqueue_outbound(Opcode::SubscribeLegacy, ConnectionKind::Primary, None, &msg)
            }
            SubscriptionAction::UpdateConnection { client_port, dynamic } => {
                let msg = UpdateConnection { handle: client_port, dynamic_parameters: dynamic };
                self.runtime.enqueue_outbound(Opcode::UpdateConnection, ConnectionKind::Primary, None, &msg)
            }
            SubscriptionAction::DisconnectPorts { client_port } => {
                let msg = DisconnectPorts { handle: client_port };
                self.runtime.enqueue_outbound(Opcode::DisconnectPorts, ConnectionKind::Primary, None, &msg)
            }
            SubscriptionAction::UnsubscribeLegacy { client_port } => {
                let msg = UnsubscribeLegacy { handle: client_port };
                self.runtime.enqueue_outbound(Opcode::UnsubscribeLegacy, ConnectionKind::Primary, None, &msg)
            }
        }
    }

    /// Turns each `PortValueEvent` into one `PendingPortSend` per server
    /// port mirroring that local port, queued onto the connection its
    /// current dynamic parameters route to (§4.2 step 4, §4.3
    /// PORT_VALUE_CHANGE).
    fn encode_value_sends(&mut self, events: Vec<PortValueEvent>) -> anyhow::Result<()> {
        for event in events {
            let targets: Vec<(Handle, DynamicConnectorParameters)> = self
                .runtime
                .server_port_map
                .values()
                .filter(|sp| sp.local_port == event.port)
                .map(|sp| (sp.connection_handle, sp.dynamic))
                .collect();
            if targets.is_empty() {
                continue;
            }
            let change_type = match event.kind {
                ValueChangeKind::Initial => ChangeType::Initial,
                ValueChangeKind::Change => ChangeType::Change,
                ValueChangeKind::FinalPush => ChangeType::FinalPush,
            };
            for (connection_handle, dynamic) in targets {
                let msg = PortValueChange {
                    handle: connection_handle,
                    values: vec![PortValue {
                        change_type,
                        timestamp: Some(WireTimestamp::now()),
                        raw_value: event.raw_value.clone(),
                    }],
                };
                let mut body = Vec::new();
                msg.serialize(&mut body)?;
                let flags = MessageFlags { encoding: DataEncoding::Binary, to_server: false, high_priority: dynamic.high_priority };
                let encoded =
                    crate::wire::frame::encode_message(Opcode::PortValueChange, Some(flags.to_byte()), &body, self.debug_protocol)?;
                let send = PendingPortSend {
                    port: event.port,
                    high_priority: dynamic.high_priority,
                    min_interval: Duration::from_millis(dynamic.minimal_update_interval_ms.max(0) as u64),
                    last_update: self.last_port_update.get(&event.port).copied(),
                    encoded,
                };
                self.queue_for(dynamic.high_priority).push_back(send);
            }
        }
        Ok(())
    }

    fn queue_for(&mut self, high_priority: bool) -> &mut VecDeque<PendingPortSend> {
        if high_priority && self.express.is_some() {
            &mut self.pending_express
        } else {
            &mut self.pending_primary
        }
    }

    fn handle_call_events(&mut self, events: Vec<CallIntakeEvent>, time_now: Duration) -> anyhow::Result<()> {
        for event in events {
            match event {
                CallIntakeEvent::PullRequest { remote_port, local_port } => {
                    let call_id = self
                        .runtime
                        .pull_registry
                        .send_pull_request(PullInfo { remote_port, local_port, timeout: DEFAULT_PULL_TIMEOUT }, time_now);
                    let msg = PullCall { handle: remote_port, call_id, flags: 0 };
                    self.runtime.enqueue_outbound(Opcode::PullCall, ConnectionKind::Express, None, &msg)?;
                }
                CallIntakeEvent::PendingRpcCalls { port } => {
                    // TODO: PortGraph has no accessor yet to drain a port's
                    // queued RPC call payloads; wiring this needs a method
                    // alongside `connectors_for_remote_port`.
                    trace!(?port, "RPC call intake event has no host accessor to drain call payloads yet");
                }
            }
        }
        Ok(())
    }

    /// Marks every port in `original_ports` not present in `retained` as
    /// sent at `time_now`, for the next pacing check's `min_interval` test.
    fn note_sent_ports(&mut self, original_ports: &[Handle], retained: &[PendingPortSend], time_now: Duration) {
        for port in original_ports {
            if !retained.iter().any(|p| p.port == *port) {
                self.last_port_update.insert(*port, time_now);
            }
        }
    }

    async fn send_pending(&mut self, time_now: Duration) -> anyhow::Result<()> {
        let outbound = std::mem::take(&mut self.runtime.outbound);
        for message in outbound {
            let encoded =
                crate::wire::frame::encode_message(message.opcode, message.flags_byte, &message.body, self.debug_protocol)?;
            match message.connection {
                ConnectionKind::Primary => self.primary.queue_raw(encoded),
                ConnectionKind::Express => {
                    if let Some(express) = &mut self.express {
                        express.queue_raw(encoded);
                    } else {
                        self.primary.queue_raw(encoded);
                    }
                }
            }
        }

        let bulk_window_size = self.config.bulk_window_size();

        let primary_pending = std::mem::take(&mut self.pending_primary);
        let primary_ports: Vec<Handle> = primary_pending.iter().map(|p| p.port).collect();
        let outcome = self.primary.send_pending_messages(time_now, bulk_window_size, primary_pending);
        self.note_sent_ports(&primary_ports, &outcome.retained, time_now);
        self.pending_primary = outcome.retained.into_iter().collect();
        if let Some(batch) = outcome.batch {
            self.transport.send(batch).await?;
            self.primary.release_back_buffer();
        }

        if let Some(express) = &mut self.express {
            let express_pending = std::mem::take(&mut self.pending_express);
            let express_ports: Vec<Handle> = express_pending.iter().map(|p| p.port).collect();
            let outcome = express.send_pending_messages(time_now, bulk_window_size, express_pending);
            for port in &express_ports {
                if !outcome.retained.iter().any(|p| p.port == *port) {
                    self.last_port_update.insert(*port, time_now);
                }
            }
            self.pending_express = outcome.retained.into_iter().collect();
            if let Some(batch) = outcome.batch {
                if let Some(t) = &self.express_transport {
                    t.send(batch).await?;
                }
                express.release_back_buffer();
            }
        }
        Ok(())
    }

    fn check_critical_ping(&mut self, time_now: Duration) {
        let threshold = self.config.critical_ping_threshold();
        self.primary.check_critical_ping(time_now, threshold, || {
            warn!("critical ping exceeded on primary connection; notifying bound ports of connection loss");
        });
        if let Some(express) = &mut self.express {
            express.check_critical_ping(time_now, threshold, || {
                warn!("critical ping exceeded on express connection; notifying bound ports of connection loss");
            });
        }
    }

    #[instrument(skip(self, batch))]
    async fn process_batch(&mut self, kind: ConnectionKind, batch: Vec<u8>, start_at: usize) -> anyhow::Result<()> {
        let mut offset = start_at;
        loop {
            let runtime = &mut self.runtime;
            let debug_protocol = self.debug_protocol;
            let connection = match kind {
                ConnectionKind::Primary => &mut self.primary,
                ConnectionKind::Express => self.express.as_mut().unwrap_or(&mut self.primary),
            };

            // Dispatch is async but `process_incoming_batch`'s callback is
            // sync; run it to collect messages needing dispatch, then
            // dispatch them in order, stopping at the first deferral. This
            // mirrors the batch loop of §4.2 without requiring an async
            // closure (not expressible with the borrow shape here).
            let mut to_dispatch = Vec::new();
            let retry_offset = connection.process_incoming_batch(&batch, offset, debug_protocol, |message, flags| {
                to_dispatch.push((message, flags));
                DispatchResult::Continue
            });

            for (message, flags) in to_dispatch {
                match dispatch(runtime, message, flags).await {
                    Ok(DispatchOutcome::Applied) | Ok(DispatchOutcome::Rejected(_)) => {}
                    Ok(DispatchOutcome::Deferred) => {
                        self.deferred_batches.push_back((kind, batch, offset));
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(error = %e, "fatal error processing message; dropping remainder of batch");
                        return Ok(());
                    }
                }
            }

            match retry_offset {
                Some(next) => offset = next,
                None => return Ok(()),
            }
        }
    }

    /// Retries any batches that deferred on a prior tick, oldest first
    /// (§9 DESIGN NOTES "Structure-lock defer": "the caller stashes the
    /// batch and retries at the next worker tick").
    pub async fn retry_deferred(&mut self) -> anyhow::Result<()> {
        let deferred = std::mem::take(&mut self.deferred_batches);
        for (kind, batch, offset) in deferred {
            self.process_batch(kind, batch, offset).await?;
        }
        Ok(())
    }
}
