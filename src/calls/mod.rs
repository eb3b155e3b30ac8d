//! RPC-call and pull-call registries (§4.5), grounded in
//! `protocol::rpc::transaction_tracker::TransactionTracker`'s id/deadline
//! bookkeeping with lazy, on-access eviction — no background timer task.

pub mod pull;
pub mod rpc;

pub use pull::PullRegistry;
pub use rpc::RpcRegistry;
