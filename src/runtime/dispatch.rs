//! Per-opcode semantics (§4.3), dispatched by [`crate::runtime::RemoteRuntime`].
//! Grounded in `protocol::nfs::portmap::handle_portmap`'s
//! `match call.proc { ... }` dispatch shape and `protocol::rpc::wire::handle_rpc`'s
//! `Result<bool, anyhow::Error>` outer return, widened to the three-way
//! `DispatchOutcome` the structure-lock defer mechanism needs (§9 DESIGN NOTES).

use tracing::{trace, warn};

use crate::connection::ConnectionKind;
use crate::error::ConnectError;
use crate::runtime::remote_port::RemotePortRecord;
use crate::runtime::server_port::ServerPort;
use crate::runtime::RemoteRuntime;
use crate::types::{Handle, PortFlags};
use crate::wire::frame::RawMessage;
use crate::wire::messages::{
    ConnectPorts, ConnectPortsError, DisconnectPorts, PullCall, PullCallReturn, PullCallValue, RpcCall,
    StructureChanged, StructureCreated, StructureDeleted, TypeUpdate, UpdateConnection,
};
use crate::wire::opcode::{MessageFlags, Opcode};

/// Outcome of handling one decoded message (§9 DESIGN NOTES: "Structure-lock
/// defer").
pub enum DispatchOutcome {
    Applied,
    /// The structure mutex's `try_lock` failed; retry this batch from the
    /// given absolute offset on the next tick.
    Deferred,
    Rejected(ConnectError),
}

/// Dispatches one decoded message to the remote runtime. `offset` is only
/// used for logging; the caller ([`crate::connection::Connection::process_incoming_batch`])
/// already knows it and turns `Deferred` into the retry offset.
pub async fn dispatch(
    runtime: &mut RemoteRuntime,
    message: RawMessage,
    flags: Option<MessageFlags>,
) -> anyhow::Result<DispatchOutcome> {
    match message.opcode {
        Opcode::PortValueChange | Opcode::SmallPortValueChange | Opcode::SmallPortValueChangeWithoutTimestamp => {
            handle_port_value_change(runtime, &message, flags).await
        }
        Opcode::RpcCall => handle_rpc_call(runtime, &message).await,
        Opcode::PullCall => handle_pull_call(runtime, &message).await,
        Opcode::PullCallReturn => handle_pull_call_return(runtime, &message).await,
        Opcode::UpdateConnection => handle_update_connection(runtime, &message).await,
        Opcode::ConnectPorts => handle_connect_ports(runtime, &message, flags).await,
        Opcode::ConnectPortsError => handle_connect_ports_error(runtime, &message).await,
        Opcode::DisconnectPorts => handle_disconnect_ports(runtime, &message).await,
        Opcode::StructureCreated => handle_structure_created(runtime, &message).await,
        Opcode::StructureChanged => handle_structure_changed(runtime, &message).await,
        Opcode::StructureDeleted => handle_structure_deleted(runtime, &message).await,
        Opcode::TypeUpdate => handle_type_update(runtime, &message),
        Opcode::PeerInfo => {
            trace!("PEER_INFO is a subclass hook; core ignores it");
            Ok(DispatchOutcome::Applied)
        }
        Opcode::SubscribeLegacy | Opcode::UnsubscribeLegacy => {
            warn!(?message.opcode, "superseded opcode received; failing batch");
            anyhow::bail!("superseded opcode {:?} is not accepted by the current protocol", message.opcode)
        }
        Opcode::ConnectorCreated | Opcode::ConnectorDeleted | Opcode::UriConnectorCreated
        | Opcode::UriConnectorUpdated | Opcode::UriConnectorDeleted => {
            // These are emitted by this side's subscription controller, not
            // accepted inbound; treat as per "unknown opcode within range".
            warn!(?message.opcode, "unexpected inbound opcode; failing batch");
            anyhow::bail!("opcode {:?} is not a valid inbound message", message.opcode)
        }
        Opcode::Other => unreachable!("batch loop never dispatches the OTHER sentinel"),
    }
}

async fn handle_port_value_change(
    runtime: &mut RemoteRuntime,
    message: &RawMessage,
    flags: Option<MessageFlags>,
) -> anyhow::Result<DispatchOutcome> {
    let to_server = flags.map(|f| f.to_server).unwrap_or(false);
    let has_timestamp = message.opcode != Opcode::SmallPortValueChangeWithoutTimestamp;
    let decoded = crate::wire::messages::PortValueChange::read(&mut message.body_cursor(), has_timestamp)?;

    let target = if to_server {
        runtime.server_port_map.get(&decoded.handle).map(|sp| sp.local_port)
    } else {
        Some(decoded.handle)
    };
    let Some(target) = target else {
        warn!(handle = ?decoded.handle, "PORT_VALUE_CHANGE for unknown connection handle");
        return Ok(DispatchOutcome::Applied);
    };

    for value in &decoded.values {
        if let Err(e) = runtime.host.write_value(target, &value.raw_value).await {
            warn!(port = ?target, error = %e, "failed to publish port value");
        }
    }
    runtime.received_data_after_last_connect = true;
    Ok(DispatchOutcome::Applied)
}

async fn handle_rpc_call(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    use crate::wire::messages::CallType;
    let call: RpcCall = message.read_body()?;
    match call.call_type {
        CallType::Message | CallType::Request => {
            let Some(info) = runtime.host.port_info(call.sender_handle).await else {
                warn!(handle = ?call.sender_handle, "RPC_CALL for unknown local port");
                return Ok(DispatchOutcome::Applied);
            };
            if info.type_index != call.interface_type_index {
                warn!(handle = ?call.sender_handle, "RPC_CALL interface type mismatch; discarding");
                return Ok(DispatchOutcome::Applied);
            }
            // Delivery into the host's call queue is a PortGraph-level
            // concern; the core's job ends at validating and handing off
            // the already-deserialized argument bytes.
            if let Err(e) = runtime.host.write_value(call.sender_handle, &call.raw_args).await {
                warn!(error = %e, "failed to deliver RPC call arguments");
            }
        }
        CallType::Response => {
            let call_id = call.call_id.unwrap_or_default();
            match runtime.rpc_registry.take_awaiting(call_id) {
                Some(local_port) => {
                    if let Err(e) = runtime.host.write_value(local_port, &call.raw_args).await {
                        warn!(error = %e, "failed to deliver RPC response");
                    }
                }
                None => {
                    trace!(call_id, "RPC response for unmatched or already-evicted call; discarding");
                }
            }
        }
    }
    Ok(DispatchOutcome::Applied)
}

async fn handle_pull_call(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let request: PullCall = message.read_body()?;
    let value = runtime.host.pull_value(request.handle).await;
    let response = match value {
        Some(raw_value) => PullCallReturn {
            call_id: request.call_id,
            failed: false,
            value: Some(PullCallValue {
                type_index: runtime.host.port_info(request.handle).await.map(|i| i.type_index).unwrap_or(0),
                timestamp: Default::default(),
                raw_value,
            }),
        },
        None => PullCallReturn { call_id: request.call_id, failed: true, value: None },
    };
    // `PullCall::flags` is the struct's own field (§4.3), not the generic
    // flags byte `dispatch` decodes for other opcodes.
    let high_priority = MessageFlags::from_byte(request.flags).map(|f| f.high_priority).unwrap_or(false);
    let connection = if high_priority { ConnectionKind::Express } else { ConnectionKind::Primary };
    let response_flags = MessageFlags { encoding: crate::wire::opcode::DataEncoding::Binary, to_server: false, high_priority };
    runtime.enqueue_outbound(Opcode::PullCallReturn, connection, Some(response_flags.to_byte()), &response)?;
    Ok(DispatchOutcome::Applied)
}

async fn handle_pull_call_return(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    use crate::error::PullFailure;
    let ret: PullCallReturn = message.read_body()?;
    let Some(local_port) = runtime.pull_registry.take(ret.call_id) else {
        trace!(call_id = ret.call_id, "PULLCALL_RETURN for unmatched or already-evicted pull; discarding");
        return Ok(DispatchOutcome::Applied);
    };
    let Some(info) = runtime.host.port_info(local_port).await else {
        runtime.resolve_pull(local_port, Err(PullFailure::NoConnection));
        return Ok(DispatchOutcome::Applied);
    };
    match ret.value {
        Some(v) if v.type_index == info.type_index => {
            runtime.resolve_pull(local_port, Ok(v.raw_value));
        }
        Some(_) => runtime.resolve_pull(local_port, Err(PullFailure::InvalidDataReceived)),
        None => runtime.resolve_pull(local_port, Err(PullFailure::NoConnection)),
    }
    Ok(DispatchOutcome::Applied)
}

async fn handle_update_connection(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let update: UpdateConnection = message.read_body()?;
    let Some(server_port) = runtime.server_port_map.get(&update.handle) else {
        warn!(handle = ?update.handle, "UPDATE_CONNECTION for unknown server port");
        return Ok(DispatchOutcome::Applied);
    };
    let push_flipped = server_port.dynamic.strategy.is_push() != update.dynamic_parameters.strategy.is_push();
    if push_flipped {
        let Some(_guard) = runtime.structure_lock.try_lock() else {
            return Ok(DispatchOutcome::Deferred);
        };
    }
    runtime
        .host
        .update_dynamic_parameters(
            server_port.local_port,
            update.dynamic_parameters.strategy,
            update.dynamic_parameters.minimal_update_interval_ms,
            update.dynamic_parameters.high_priority,
        )
        .await;
    if let Some(server_port) = runtime.server_port_map.get_mut(&update.handle) {
        server_port.dynamic = update.dynamic_parameters;
    }
    Ok(DispatchOutcome::Applied)
}

async fn handle_connect_ports(
    runtime: &mut RemoteRuntime,
    message: &RawMessage,
    flags: Option<MessageFlags>,
) -> anyhow::Result<DispatchOutcome> {
    let Some(_guard) = runtime.structure_lock.try_lock() else {
        return Ok(DispatchOutcome::Deferred);
    };
    let request: ConnectPorts = message.read_body()?;

    if runtime.server_port_map.contains_key(&request.handle) {
        runtime.send_connect_error(request.handle, ConnectError::OccupiedHandle)?;
        return Ok(DispatchOutcome::Rejected(ConnectError::OccupiedHandle));
    }

    let Some(served_port) = runtime.host.resolve(&request.client_port_path).await else {
        runtime.send_connect_error(request.handle, ConnectError::PortNotFound)?;
        return Ok(DispatchOutcome::Rejected(ConnectError::PortNotFound));
    };

    let mut port_flags = PortFlags::default().with(PortFlags::NETWORK_ELEMENT).with(PortFlags::VOLATILE);
    if request.publish_connection {
        port_flags = port_flags.with(PortFlags::INPUT_PORT);
    } else {
        port_flags = port_flags.with(PortFlags::OUTPUT_PORT).with(PortFlags::NO_INITIAL_PUSHING);
    }
    if request.is_tool_connection {
        port_flags = port_flags.with(PortFlags::TOOL_PORT);
    }
    if request.dynamic_parameters.strategy.is_push() {
        port_flags = port_flags.with(PortFlags::PUSH_STRATEGY);
    }

    let type_index = match runtime.host.port_info(served_port).await {
        Some(info) => info.type_index,
        None => {
            runtime.send_connect_error(request.handle, ConnectError::PortNotFound)?;
            return Ok(DispatchOutcome::Rejected(ConnectError::PortNotFound));
        }
    };

    let (target_port, conversion_port) = if let Some(conversion) = &request.static_parameters.server_side_conversion {
        let operations = [
            (conversion.operation_1.clone(), conversion.operation_1_parameter.clone()),
            (conversion.operation_2.clone(), conversion.operation_2_parameter.clone()),
        ];
        let destination_type = resolve_type_index(runtime, &conversion.destination_type);
        let Some(destination_type) = destination_type else {
            runtime.send_connect_error(request.handle, ConnectError::ConversionUnresolved)?;
            return Ok(DispatchOutcome::Rejected(ConnectError::ConversionUnresolved));
        };
        match runtime.host.create_conversion_port(served_port, destination_type, &operations).await {
            Ok(port) => (port, Some(port)),
            Err(e) => {
                runtime.send_connect_error(request.handle, e)?;
                return Ok(DispatchOutcome::Rejected(e));
            }
        }
    } else {
        (served_port, None)
    };

    let local_port = match runtime.host.create_server_port(target_port, port_flags, type_index).await {
        Ok(port) => port,
        Err(e) => {
            runtime.send_connect_error(request.handle, e)?;
            return Ok(DispatchOutcome::Rejected(e));
        }
    };

    runtime.server_port_map.insert(
        request.handle,
        ServerPort { connection_handle: request.handle, local_port, conversion_port, dynamic: request.dynamic_parameters },
    );
    let _ = flags;
    Ok(DispatchOutcome::Applied)
}

fn resolve_type_index(runtime: &RemoteRuntime, type_name: &str) -> Option<u32> {
    runtime.registers.types.iter().find(|(_, entry)| entry.name == type_name).map(|(idx, _)| *idx)
}

async fn handle_connect_ports_error(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let error: ConnectPortsError = message.read_body()?;
    warn!(handle = ?error.handle, message = %error.message, "peer reported CONNECT_PORTS_ERROR");
    runtime.mark_client_port_errored(error.handle);
    Ok(DispatchOutcome::Applied)
}

async fn handle_disconnect_ports(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let Some(_guard) = runtime.structure_lock.try_lock() else {
        return Ok(DispatchOutcome::Deferred);
    };
    let request: DisconnectPorts = message.read_body()?;
    let Some(server_port) = runtime.server_port_map.remove(&request.handle) else {
        return Ok(DispatchOutcome::Applied);
    };
    if let Some(conversion_port) = server_port.conversion_port {
        let still_used = runtime.server_port_map.values().any(|sp| sp.conversion_port == Some(conversion_port));
        if !still_used {
            runtime.host.remove_port(conversion_port).await;
        }
    }
    runtime.host.remove_port(server_port.local_port).await;
    Ok(DispatchOutcome::Applied)
}

async fn handle_structure_created(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let Some(_guard) = runtime.structure_lock.try_lock() else {
        return Ok(DispatchOutcome::Deferred);
    };
    let created: StructureCreated = message.read_body()?;
    let record = RemotePortRecord::new(
        created.info.handle,
        created.info.path,
        created.info.flags,
        created.info.type_index,
        created.info.strategy,
    );
    runtime.remote_port_map.insert(created.info.handle, record);
    runtime.on_new_remote_port(created.info.handle);
    Ok(DispatchOutcome::Applied)
}

async fn handle_structure_changed(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let Some(_guard) = runtime.structure_lock.try_lock() else {
        return Ok(DispatchOutcome::Deferred);
    };
    let changed: StructureChanged = message.read_body()?;
    if let Some(record) = runtime.remote_port_map.get_mut(&changed.handle) {
        record.strategy = changed.strategy;
        let bindings = record.client_port_bindings.clone();
        for client_port in bindings {
            runtime.mark_client_port_strategy_changed(client_port);
        }
    }
    Ok(DispatchOutcome::Applied)
}

async fn handle_structure_deleted(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let Some(_guard) = runtime.structure_lock.try_lock() else {
        return Ok(DispatchOutcome::Deferred);
    };
    let deleted: StructureDeleted = message.read_body()?;
    if let Some(record) = runtime.remote_port_map.remove(&deleted.handle) {
        for client_port in record.client_port_bindings {
            runtime.mark_client_port_disconnected(client_port);
        }
    }
    Ok(DispatchOutcome::Applied)
}

fn handle_type_update(runtime: &mut RemoteRuntime, message: &RawMessage) -> anyhow::Result<DispatchOutcome> {
    let update: TypeUpdate = message.read_body()?;
    trace!(type_index = update.type_index, "TYPE_UPDATE refreshes type register mirror");
    let _ = runtime;
    Ok(DispatchOutcome::Applied)
}
