//! Pull-call request/response matcher (§4.5, §8 scenario 6), same shape as
//! [`crate::calls::rpc::RpcRegistry`] but keyed purely by deadline since
//! pull calls have no "not ready" parking state.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::error::PullFailure;
use crate::types::Handle;

pub struct PullInfo {
    pub remote_port: Handle,
    pub local_port: Handle,
    pub timeout: Duration,
}

struct PendingPull {
    local_port: Handle,
    deadline: Duration,
}

#[derive(Default)]
pub struct PullRegistry {
    next_call_id: u64,
    pending: HashMap<u64, PendingPull>,
}

impl PullRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SendPullRequest` (§4.5): assigns a call id and records the deadline.
    /// The caller emits the PULLCALL message on the express connection.
    pub fn send_pull_request(&mut self, info: PullInfo, time_now: Duration) -> u64 {
        let call_id = self.next_call_id;
        self.next_call_id += 1;
        self.pending.insert(call_id, PendingPull { local_port: info.local_port, deadline: time_now + info.timeout });
        call_id
    }

    /// Matches an inbound PULLCALL_RETURN to its pending entry, removing it
    /// (§4.3 PULLCALL_RETURN).
    pub fn take(&mut self, call_id: u64) -> Option<Handle> {
        self.pending.remove(&call_id).map(|p| p.local_port)
    }

    /// Evicts expired pending pulls, returning `(local_port, PullFailure::NoConnection)`
    /// for each so the caller can resolve the waiting promise (§8 scenario
    /// 6: "the pending entry disappears ... the future observes failure").
    pub fn evict_expired(&mut self, time_now: Duration) -> Vec<(Handle, PullFailure)> {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= time_now)
            .map(|(id, _)| *id)
            .collect();
        let mut results = Vec::with_capacity(expired.len());
        for call_id in expired {
            if let Some(entry) = self.pending.remove(&call_id) {
                debug!(call_id, local_port = ?entry.local_port, "pull call timed out");
                results.push((entry.local_port, PullFailure::NoConnection));
            }
        }
        results
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_is_tracked_until_response_or_timeout() {
        let mut reg = PullRegistry::new();
        let id = reg.send_pull_request(
            PullInfo { remote_port: Handle(1), local_port: Handle(2), timeout: Duration::from_secs(1) },
            Duration::ZERO,
        );
        assert_eq!(reg.pending_count(), 1);
        assert_eq!(reg.take(id), Some(Handle(2)));
        assert_eq!(reg.pending_count(), 0);
    }

    #[test]
    fn expired_pull_is_evicted_with_no_connection_failure() {
        let mut reg = PullRegistry::new();
        let id = reg.send_pull_request(
            PullInfo { remote_port: Handle(1), local_port: Handle(9), timeout: Duration::from_secs(1) },
            Duration::ZERO,
        );
        let evicted = reg.evict_expired(Duration::from_secs(1));
        assert_eq!(evicted, vec![(Handle(9), PullFailure::NoConnection)]);
        assert!(reg.take(id).is_none());
    }

    #[test]
    fn evicted_entry_cannot_later_be_resolved_by_a_late_return() {
        let mut reg = PullRegistry::new();
        let id = reg.send_pull_request(
            PullInfo { remote_port: Handle(1), local_port: Handle(9), timeout: Duration::from_millis(10) },
            Duration::ZERO,
        );
        reg.evict_expired(Duration::from_millis(10));
        assert!(reg.take(id).is_none());
    }
}
