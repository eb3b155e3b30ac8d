//! `SendCall`/`SendResponse` and the awaiting-response registry (§4.5),
//! grounded in `TransactionTracker`'s `HashMap`-plus-lazy-sweep shape.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::types::Handle;
use crate::wire::messages::RpcCall;

/// A call not yet ready to send (its arguments are still being serialized
/// asynchronously by the host) or, once ready, awaiting a response.
pub struct PendingCall {
    pub remote_port: Handle,
    pub local_port: Handle,
    pub message: RpcCall,
    pub response_timeout: Duration,
}

/// Entry in `calls_awaiting_response`: a deadline plus the call it belongs
/// to, keyed externally by `call_id`.
struct AwaitingEntry {
    deadline: Duration,
    local_port: Handle,
}

#[derive(Default)]
pub struct RpcRegistry {
    next_call_id: u64,
    not_ready: Vec<PendingCall>,
    awaiting_response: HashMap<u64, AwaitingEntry>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SendCall` (§4.5): parks a call whose arguments are not yet ready, or
    /// assigns it a `call_id` and hands it back ready to serialize onto the
    /// wire. The caller is responsible for actually writing the message.
    pub fn send_call(&mut self, call: PendingCall, ready: bool, time_now: Duration) -> Option<(u64, PendingCall)> {
        if !ready {
            self.not_ready.push(call);
            return None;
        }
        let expects_response = true;
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        if expects_response {
            self.awaiting_response.insert(
                call_id,
                AwaitingEntry { deadline: time_now + call.response_timeout, local_port: call.local_port },
            );
        }
        Some((call_id, call))
    }

    /// Moves now-ready parked calls to the send path, per the "on each
    /// `SendPendingMessages`" housekeeping in §4.5. `is_ready` is supplied by
    /// the caller since readiness is a host-side fact this registry doesn't
    /// observe directly.
    pub fn drain_ready(&mut self, mut is_ready: impl FnMut(&PendingCall) -> bool) -> Vec<PendingCall> {
        let (ready, not_ready): (Vec<_>, Vec<_>) = self.not_ready.drain(..).partition(|c| is_ready(c));
        self.not_ready = not_ready;
        ready
    }

    /// Evicts awaiting-response entries whose deadline has passed, logging
    /// each eviction at `debug` (§7 item 5: "dropping them silently; the
    /// client side surfaces a timeout").
    pub fn evict_timed_out(&mut self, time_now: Duration) {
        let expired: Vec<u64> = self
            .awaiting_response
            .iter()
            .filter(|(_, e)| e.deadline <= time_now)
            .map(|(id, _)| *id)
            .collect();
        for call_id in expired {
            if let Some(entry) = self.awaiting_response.remove(&call_id) {
                debug!(call_id, local_port = ?entry.local_port, "rpc call timed out awaiting response");
            }
        }
    }

    /// Finds and removes the matching awaiting entry for an inbound
    /// RESPONSE (§4.3 RPC_CALL). Returns `None` if no match remains (the
    /// caller must still deserialize into a throwaway buffer).
    pub fn take_awaiting(&mut self, call_id: u64) -> Option<Handle> {
        self.awaiting_response.remove(&call_id).map(|e| e.local_port)
    }

    pub fn awaiting_count(&self) -> usize {
        self.awaiting_response.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::messages::CallType;

    fn call() -> PendingCall {
        PendingCall {
            remote_port: Handle(1),
            local_port: Handle(2),
            message: RpcCall {
                sender_handle: Handle(2),
                call_type: CallType::Request,
                interface_type_index: 0,
                function_index: 0,
                call_id: None,
                raw_args: vec![],
            },
            response_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn not_ready_call_is_parked() {
        let mut reg = RpcRegistry::new();
        let result = reg.send_call(call(), false, Duration::ZERO);
        assert!(result.is_none());
        assert_eq!(reg.not_ready.len(), 1);
    }

    #[test]
    fn ready_call_gets_sequential_call_ids_and_is_tracked() {
        let mut reg = RpcRegistry::new();
        let (id1, _) = reg.send_call(call(), true, Duration::ZERO).unwrap();
        let (id2, _) = reg.send_call(call(), true, Duration::ZERO).unwrap();
        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
        assert_eq!(reg.awaiting_count(), 2);
    }

    #[test]
    fn eviction_removes_only_expired_entries() {
        let mut reg = RpcRegistry::new();
        reg.send_call(call(), true, Duration::from_secs(0)).unwrap();
        reg.evict_timed_out(Duration::from_millis(500));
        assert_eq!(reg.awaiting_count(), 1);
        reg.evict_timed_out(Duration::from_secs(2));
        assert_eq!(reg.awaiting_count(), 0);
    }

    #[test]
    fn take_awaiting_removes_matched_entry() {
        let mut reg = RpcRegistry::new();
        let (id, _) = reg.send_call(call(), true, Duration::ZERO).unwrap();
        assert!(reg.take_awaiting(id).is_some());
        assert!(reg.take_awaiting(id).is_none());
    }
}
