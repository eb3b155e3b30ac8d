//! §8 scenario 6: a pull call that times out before a PULLCALL_RETURN
//! arrives resolves its waiter with `PullFailure::NoConnection`, and the
//! registry forgets the call so a late return cannot resolve it twice.

mod support;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use remote_port_protocol::calls::pull::PullInfo;
use remote_port_protocol::error::PullFailure;
use remote_port_protocol::runtime::RemoteRuntime;
use remote_port_protocol::types::Handle;

use support::{FakeGraph, FakeStructureLock};

#[tokio::test]
async fn timed_out_pull_resolves_waiter_and_forgets_the_call() {
    let host = Arc::new(FakeGraph::new());
    let lock = Arc::new(FakeStructureLock::default());
    let mut runtime = RemoteRuntime::new(host, lock);

    let local_port = Handle(42);
    let call_id = runtime.pull_registry.send_pull_request(
        PullInfo { remote_port: Handle(1), local_port, timeout: Duration::from_millis(10) },
        Duration::ZERO,
    );
    let (tx, rx) = oneshot::channel();
    runtime.register_pull_waiter(local_port, tx);

    runtime.evict_timeouts(Duration::from_millis(10));

    assert_eq!(rx.await.unwrap(), Err(PullFailure::NoConnection));
    assert!(runtime.pull_registry.take(call_id).is_none(), "a late PULLCALL_RETURN must find nothing to resolve");
}
