//! §8 scenario 1: with a bulk window of 3, ten successive low-priority
//! values produce exactly three outbound batches before the fourth is held
//! back awaiting an ack, and acking frees the window again.

mod support;

use std::collections::VecDeque;
use std::time::Duration;

use remote_port_protocol::connection::{Connection, ConnectionKind, PendingPortSend};
use remote_port_protocol::types::Handle;

fn one_value(byte: u8) -> VecDeque<PendingPortSend> {
    let mut q = VecDeque::new();
    q.push_back(PendingPortSend {
        port: Handle(1),
        high_priority: false,
        min_interval: Duration::from_millis(0),
        last_update: None,
        encoded: vec![byte],
    });
    q
}

#[test]
fn only_three_batches_go_out_before_the_window_needs_an_ack() {
    let mut conn = Connection::new(ConnectionKind::Primary, false);
    let mut batches_sent = 0;
    for i in 0..10u8 {
        let outcome = conn.send_pending_messages(Duration::from_millis(i as u64), 3, one_value(i));
        if outcome.batch.is_some() {
            batches_sent += 1;
            assert!(outcome.retained.is_empty(), "a value that fit should not be retained");
        } else {
            assert_eq!(outcome.retained.len(), 1, "a blocked value must stay queued, not be dropped");
        }
    }
    assert_eq!(batches_sent, 3);

    // Acking the oldest in-flight packet (sequence 2, the third batch) resets
    // the bulk baseline the window measures against, freeing capacity again.
    conn.ack_window.apply_ack(2);
    let outcome = conn.send_pending_messages(Duration::from_millis(20), 3, one_value(99));
    assert!(outcome.batch.is_some());
    assert!(outcome.retained.is_empty());
}
