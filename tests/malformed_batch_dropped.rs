//! §8 scenario 4: a PORT_VALUE_CHANGE declaring a size far larger than the
//! bytes actually remaining in the batch is dropped wholesale — no messages
//! after it are dispatched, and no port is mutated.

mod support;

use byteorder::{BigEndian, WriteBytesExt};

use remote_port_protocol::connection::{Connection, ConnectionKind, DispatchResult};
use remote_port_protocol::wire::frame::SHELL_LEN;
use remote_port_protocol::wire::opcode::Opcode;

fn batch_with_oversized_port_value_change() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_i32::<BigEndian>(0).unwrap(); // size, unused by process_incoming_batch
    buf.write_i16::<BigEndian>(-1).unwrap(); // ack_request
    buf.write_i16::<BigEndian>(-1).unwrap(); // ack_response
    buf.push(Opcode::PortValueChange as u8);
    // Declares 4 GiB of payload though only a few bytes actually follow.
    buf.write_i32::<BigEndian>(i32::MAX).unwrap();
    buf.extend_from_slice(&[0u8, 0, 0, 0]);
    buf
}

#[test]
fn oversized_declared_length_drops_the_rest_of_the_batch() {
    let mut conn = Connection::new(ConnectionKind::Primary, false);
    let batch = batch_with_oversized_port_value_change();
    assert!(batch.len() > SHELL_LEN);

    let mut dispatched = Vec::new();
    let retry_offset = conn.process_incoming_batch(&batch, 0, false, |message, _flags| {
        dispatched.push(message.opcode);
        DispatchResult::Continue
    });

    assert!(retry_offset.is_none(), "a corrupt size must end batch processing, not request a retry");
    assert!(dispatched.is_empty(), "no message should have been handed to the dispatcher");
}
