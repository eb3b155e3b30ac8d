//! The per-connection send/ack engine (§4.2). Grounded in
//! `protocol::rpc::wire::{read_fragment, write_fragment}` and
//! `SocketMessageHandler` for the buffer-ownership and framing shape, with
//! the ack-window/critical-ping bookkeeping built fresh (§9 Open Questions 1
//! and 3 forbid filling those in by analogy).

pub mod ack_window;

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{trace, warn};

use crate::connection::ack_window::AckWindow;
use crate::types::Handle;
use crate::wire::frame::{self, BatchHeader, RawMessage};
use crate::wire::opcode::{MessageFlags, Opcode, SizeClass};

/// One port with data queued to send, as drained by `SendPendingMessages`
/// step 4.
pub struct PendingPortSend {
    pub port: Handle,
    pub high_priority: bool,
    pub min_interval: Duration,
    pub last_update: Option<Duration>,
    /// Pre-serialized message bytes (opcode + flags + args), built by the
    /// subscription/runtime layer; the connection only knows how to batch
    /// and pace it.
    pub encoded: Vec<u8>,
}

/// Which of a peer's two coordinated byte streams a connection is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    Primary,
    Express,
}

/// Outcome of one `SendPendingMessages` call.
pub struct SendOutcome {
    /// The batch ready to hand to the transport, if the front buffer held
    /// more than the bare shell or an ack was due.
    pub batch: Option<Vec<u8>>,
    /// Ports that could not be drained this cycle (window full, or pacing
    /// interval not yet elapsed) and remain queued.
    pub retained: Vec<PendingPortSend>,
}

/// A connection's bookkeeping and write buffers (§4.2). Double-buffering
/// (front/back) is modeled with two `Vec<u8>`s and a lock flag rather than a
/// generic type parameter, matching `ResponseBuffer`'s concrete
/// `Vec<u8>`-based shape.
pub struct Connection {
    pub kind: ConnectionKind,
    front: Vec<u8>,
    back: Vec<u8>,
    double_buffered: bool,
    back_buffer_locked: bool,
    pub ack_window: AckWindow,
    pub received_data_after_last_connect: bool,
    pub closed: bool,
    notified_loss_this_window: bool,
}

impl Connection {
    pub fn new(kind: ConnectionKind, double_buffered: bool) -> Self {
        Self {
            kind,
            front: frame::fresh_buffer(),
            back: Vec::new(),
            double_buffered,
            back_buffer_locked: false,
            ack_window: AckWindow::new(),
            received_data_after_last_connect: false,
            closed: false,
            notified_loss_this_window: false,
        }
    }

    /// Appends an already-encoded message directly to the front buffer,
    /// bypassing port pacing. Used for messages that are not port-value
    /// traffic (RPC calls, pull calls, subscription control messages) and so
    /// are not subject to `SendPendingMessages`'s bulk-window throttling.
    pub fn queue_raw(&mut self, encoded: Vec<u8>) {
        self.front.extend_from_slice(&encoded);
    }

    /// `SendPendingMessages(time_now)` (§4.2 steps 1-6), minus the
    /// critical-ping check (split out as [`Connection::check_critical_ping`]
    /// since it needs data this struct alone doesn't own — the remote
    /// runtime's shared-port list).
    pub fn send_pending_messages(
        &mut self,
        time_now: Duration,
        bulk_window_size: u16,
        mut pending: VecDeque<PendingPortSend>,
    ) -> SendOutcome {
        if self.double_buffered && self.back_buffer_locked {
            return SendOutcome { batch: None, retained: pending.into_iter().collect() };
        }

        if self.ack_window.window_full() {
            return SendOutcome { batch: None, retained: pending.into_iter().collect() };
        }

        let low_priority_allowed = self.ack_window.non_acked_bulk() < bulk_window_size as i32;

        let mut retained = Vec::new();
        let mut wrote_low_priority = false;
        while let Some(send) = pending.pop_front() {
            let due = send.last_update.map_or(true, |last| time_now >= last + send.min_interval);
            if (send.high_priority || low_priority_allowed) && due {
                self.front.extend_from_slice(&send.encoded);
                if !send.high_priority {
                    wrote_low_priority = true;
                }
            } else {
                retained.push(send);
            }
        }
        if wrote_low_priority {
            self.ack_window.sent_bulk_packets.next();
        }

        let ack_request = self.ack_window.last_ack_request_index;
        let has_content = self.front.len() > frame::SHELL_LEN || ack_request >= 0;
        let batch = if has_content {
            frame::patch_shell(&mut self.front, ack_request, self.ack_window.last_acknowledged_packet);
            self.ack_window.last_ack_request_index = -1;
            let has_messages = self.front.len() > frame::SHELL_LEN;
            if has_messages && !self.ack_window.window_full() {
                self.ack_window.assign_sequence(time_now.as_millis() as u64);
            }
            let outgoing = if self.double_buffered {
                std::mem::swap(&mut self.front, &mut self.back);
                self.back_buffer_locked = true;
                self.back.clone()
            } else {
                std::mem::take(&mut self.front)
            };
            self.front = frame::fresh_buffer();
            Some(outgoing)
        } else {
            None
        };

        SendOutcome { batch, retained }
    }

    /// Releases the back-buffer loan once the transport confirms the write
    /// completed (§9 DESIGN NOTES "Back-buffer loan").
    pub fn release_back_buffer(&mut self) {
        self.back_buffer_locked = false;
    }

    /// `ProcessIncomingMessageBatch(buffer, start_at)` (§4.2). Returns
    /// `Some(offset)` when a handler deferred and the caller should retry
    /// from `offset` on the next tick, or `None` when the batch is fully
    /// consumed (or was dropped as corrupt).
    pub fn process_incoming_batch<F>(
        &mut self,
        buffer: &[u8],
        start_at: usize,
        debug_protocol: bool,
        mut dispatch: F,
    ) -> Option<usize>
    where
        F: FnMut(RawMessage, Option<MessageFlags>) -> DispatchResult,
    {
        let mut cursor = std::io::Cursor::new(buffer);
        if start_at == 0 {
            match BatchHeader::read(&mut cursor) {
                Ok(header) => {
                    self.ack_window.note_ack_request(header.ack_request);
                    self.ack_window.apply_ack(header.ack_response);
                }
                Err(_) => {
                    warn!("incoming batch shorter than the ack header; dropping");
                    return None;
                }
            }
        } else {
            cursor.set_position(start_at as u64);
        }

        loop {
            let absolute_offset = cursor.position() as usize;
            if absolute_offset >= buffer.len() {
                return None;
            }
            let opcode_byte = buffer[absolute_offset];
            use num_traits::FromPrimitive;
            let opcode = match Opcode::from_u8(opcode_byte) {
                Some(op) if (op as u8) < Opcode::Other as u8 => op,
                _ => {
                    warn!(opcode_byte, "opcode at or above OTHER sentinel; dropping remainder of batch");
                    return None;
                }
            };
            cursor.set_position(absolute_offset as u64 + 1);

            let remaining = buffer.len() - cursor.position() as usize;
            let size = match frame::read_message_size(&mut cursor, opcode, debug_protocol, remaining) {
                Ok(Some(size)) => size,
                Ok(None) => {
                    warn!(?opcode, "corrupt message size; dropping remainder of batch");
                    return None;
                }
                Err(e) => {
                    warn!(?opcode, error = %e, "failed to read message size; dropping remainder of batch");
                    return None;
                }
            };

            let flags_byte_present = crate::wire::frame::carries_flags_byte(opcode);
            let body_start = cursor.position() as usize;
            let (flags, body_start, body_len) = if flags_byte_present {
                if body_start >= buffer.len() {
                    warn!(?opcode, "missing flags byte; dropping remainder of batch");
                    return None;
                }
                let flags = match MessageFlags::from_byte(buffer[body_start]) {
                    Ok(f) => f,
                    Err(_) => {
                        warn!(?opcode, "invalid message flags byte; dropping remainder of batch");
                        return None;
                    }
                };
                (Some(flags), body_start + 1, size.saturating_sub(1))
            } else {
                (None, body_start, size)
            };

            if body_start + body_len > buffer.len() {
                warn!(?opcode, "message body exceeds batch bounds; dropping remainder of batch");
                return None;
            }

            let body = buffer[body_start..body_start + body_len].to_vec();
            let next_offset = body_start + body_len;
            cursor.set_position(next_offset as u64);

            trace!(?opcode, len = body_len, "dispatching message");
            let message = RawMessage { opcode, flags_byte: flags.map(MessageFlags::to_byte), body };
            match dispatch(message, flags) {
                DispatchResult::Continue => {}
                DispatchResult::Defer => return Some(absolute_offset),
            }
        }
    }

    /// §4.2 step 7. `shared_port_notifier` is called at most once, with the
    /// set of ports whose priority routes them over this connection; the
    /// runtime layer resolves "priority matches this connection" per the
    /// decision recorded in DESIGN.md for Open Question 1.
    pub fn check_critical_ping(
        &mut self,
        time_now: Duration,
        critical_ping_threshold: Duration,
        mut notify_loss: impl FnMut(),
    ) {
        if !self.received_data_after_last_connect {
            self.notified_loss_this_window = false;
            return;
        }
        if self.ack_window.non_acked_express() <= 0 {
            self.notified_loss_this_window = false;
            return;
        }
        let oldest_unacked = self.ack_window.slot(self.ack_window.last_acknowledged_packet.wrapping_add(1));
        let elapsed = time_now.saturating_sub(Duration::from_millis(oldest_unacked.send_time_millis));
        if elapsed > critical_ping_threshold && !self.notified_loss_this_window {
            notify_loss();
            self.received_data_after_last_connect = false;
            self.notified_loss_this_window = true;
        }
    }

    pub fn on_reconnect(&mut self) {
        self.received_data_after_last_connect = false;
        self.notified_loss_this_window = false;
    }
}

/// Result of dispatching one decoded message to the remote runtime: either
/// processing should continue with the next message, or the batch must be
/// retried later (§5 "Suspension and blocking": the structure `TryLock`
/// failed).
pub enum DispatchResult {
    Continue,
    Defer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_pending_messages_returns_none_when_back_buffer_locked() {
        let mut conn = Connection::new(ConnectionKind::Primary, true);
        conn.back_buffer_locked = true;
        let outcome = conn.send_pending_messages(Duration::from_millis(0), 3, VecDeque::new());
        assert!(outcome.batch.is_none());
    }

    #[test]
    fn send_pending_messages_batches_ready_low_priority_ports() {
        let mut conn = Connection::new(ConnectionKind::Primary, false);
        let mut pending = VecDeque::new();
        pending.push_back(PendingPortSend {
            port: Handle(1),
            high_priority: false,
            min_interval: Duration::from_millis(0),
            last_update: None,
            encoded: vec![9, 9, 9],
        });
        let outcome = conn.send_pending_messages(Duration::from_millis(0), 3, pending);
        assert!(outcome.batch.is_some());
        assert!(outcome.retained.is_empty());
    }

    #[test]
    fn send_pending_messages_retains_ports_throttled_by_bulk_window() {
        let mut conn = Connection::new(ConnectionKind::Primary, false);
        // Saturate the bulk window first.
        for _ in 0..3 {
            conn.ack_window.sent_bulk_packets.next();
        }
        let mut pending = VecDeque::new();
        pending.push_back(PendingPortSend {
            port: Handle(1),
            high_priority: false,
            min_interval: Duration::from_millis(0),
            last_update: None,
            encoded: vec![9],
        });
        let outcome = conn.send_pending_messages(Duration::from_millis(0), 3, pending);
        assert_eq!(outcome.retained.len(), 1);
    }

    #[test]
    fn ack_window_blocks_sending_once_full() {
        let mut conn = Connection::new(ConnectionKind::Primary, false);
        for i in 0..63 {
            conn.ack_window.assign_sequence(i);
        }
        let mut pending = VecDeque::new();
        pending.push_back(PendingPortSend {
            port: Handle(1),
            high_priority: true,
            min_interval: Duration::from_millis(0),
            last_update: None,
            encoded: vec![9],
        });
        let outcome = conn.send_pending_messages(Duration::from_millis(100), 3, pending);
        assert!(outcome.batch.is_none());
        assert_eq!(outcome.retained.len(), 1);
    }

    #[test]
    fn critical_ping_notifies_once_per_loss_window() {
        let mut conn = Connection::new(ConnectionKind::Primary, false);
        conn.received_data_after_last_connect = true;
        conn.ack_window.assign_sequence(0);
        let mut notifications = 0;
        conn.check_critical_ping(Duration::from_millis(200), Duration::from_millis(100), || notifications += 1);
        assert_eq!(notifications, 1);
        conn.received_data_after_last_connect = true;
        conn.check_critical_ping(Duration::from_millis(250), Duration::from_millis(100), || notifications += 1);
        assert_eq!(notifications, 1);
    }
}
