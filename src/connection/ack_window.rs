//! The 64-slot ack ring and the wrap-to-zero sequence counter (§3 "Ack
//! window", see DESIGN.md for the wrap-semantics decision), built from the
//! protocol's explicit bit-width and wrap semantics rather than by analogy
//! to anything NFS-shaped, since NFS has no windowed ack protocol.

use crate::config::{ACK_RING_LEN, ACK_WINDOW_SIZE, SEQUENCE_MODULUS};

/// A signed 16-bit counter, modulo 2^15, that "wraps to 0 instead of
/// negative" — i.e. it treats its own type's sign bit as always clear and
/// wraps one step early, not at `i16::MAX`. This is deliberately not
/// `i16`'s native wrapping_add: that wraps at -32768/32767, this wraps at
/// 32767 -> 0.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SeqCounter(pub i16);

impl SeqCounter {
    pub fn get(self) -> i16 {
        self.0
    }

    /// Post-increments, wrapping to 0 once the value would reach
    /// `SEQUENCE_MODULUS` (2^15).
    pub fn next(&mut self) -> i16 {
        let current = self.0;
        let incremented = current as i32 + 1;
        self.0 = if incremented >= SEQUENCE_MODULUS { 0 } else { incremented as i16 };
        current
    }
}

/// Distance from `from` to `to` going forward, modulo 2^15. Used for every
/// "mod 2^15" comparison in §3/§4.2 (`next_packet_index - last_acknowledged_packet`,
/// etc).
pub fn seq_distance(to: i16, from: i16) -> i32 {
    (to as i32 - from as i32).rem_euclid(SEQUENCE_MODULUS)
}

/// One ack-window ring slot: when a data packet was assigned its sequence
/// number, and the cumulative low-priority-packet count at that moment
/// (used to compute `non_acked_bulk` in `SendPendingMessages` step 3).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RingSlot {
    pub send_time_millis: u64,
    pub bulk_baseline: i16,
}

/// Per-connection ring of at most [`ACK_WINDOW_SIZE`] in-flight packets (§3).
#[derive(Debug, Clone)]
pub struct AckWindow {
    ring: [RingSlot; ACK_RING_LEN],
    pub next_packet_index: SeqCounter,
    pub sent_bulk_packets: SeqCounter,
    pub last_acknowledged_packet: i16,
    pub last_ack_request_index: i16,
}

impl Default for AckWindow {
    fn default() -> Self {
        Self {
            ring: [RingSlot::default(); ACK_RING_LEN],
            next_packet_index: SeqCounter::default(),
            sent_bulk_packets: SeqCounter::default(),
            last_acknowledged_packet: -1,
            last_ack_request_index: -1,
        }
    }
}

impl AckWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, seq: i16) -> RingSlot {
        self.ring[(seq.rem_euclid(ACK_RING_LEN as i16)) as usize]
    }

    fn slot_mut(&mut self, seq: i16) -> &mut RingSlot {
        &mut self.ring[(seq.rem_euclid(ACK_RING_LEN as i16)) as usize]
    }

    /// `non_acked_express` (§4.2 step 2): how many packets are in flight
    /// ahead of the last acknowledgment. Callers should stop assigning new
    /// sequence numbers once this reaches [`ACK_WINDOW_SIZE`].
    pub fn non_acked_express(&self) -> i32 {
        seq_distance(self.next_packet_index.get().wrapping_sub(1), self.last_acknowledged_packet)
    }

    pub fn window_full(&self) -> bool {
        self.non_acked_express() >= ACK_WINDOW_SIZE as i32
    }

    /// `non_acked_bulk` (§4.2 step 3).
    pub fn non_acked_bulk(&self) -> i32 {
        let baseline = self.slot(self.last_acknowledged_packet).bulk_baseline;
        seq_distance(self.sent_bulk_packets.get(), baseline)
    }

    /// Assigns the next sequence number to a packet that actually carries
    /// messages, recording `(send_time, sent_bulk_packets)` in the ring (§4.2
    /// step 5). Returns the assigned sequence number.
    pub fn assign_sequence(&mut self, send_time_millis: u64) -> i16 {
        let seq = self.next_packet_index.next();
        let bulk_baseline = self.sent_bulk_packets.get();
        *self.slot_mut(seq) = RingSlot { send_time_millis, bulk_baseline };
        seq
    }

    /// Applies an inbound ack. `ack_response` of `-1` means "no ack in this
    /// batch" and is a no-op.
    pub fn apply_ack(&mut self, ack_response: i16) {
        if ack_response >= 0 {
            self.last_acknowledged_packet = ack_response;
        }
    }

    pub fn note_ack_request(&mut self, ack_request: i16) {
        if ack_request >= 0 {
            self.last_ack_request_index = ack_request;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_counter_wraps_to_zero_not_type_boundary() {
        let mut c = SeqCounter(SEQUENCE_MODULUS as i16 - 1);
        let before = c.next();
        assert_eq!(before, SEQUENCE_MODULUS as i16 - 1);
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn seq_distance_handles_wraparound() {
        assert_eq!(seq_distance(0, SEQUENCE_MODULUS as i16 - 1), 1);
        assert_eq!(seq_distance(5, 3), 2);
        assert_eq!(seq_distance(3, 5), SEQUENCE_MODULUS - 2);
    }

    #[test]
    fn window_full_after_63_in_flight_packets() {
        let mut window = AckWindow::new();
        for i in 0..63 {
            window.assign_sequence(i);
        }
        assert!(window.window_full());
    }

    #[test]
    fn ack_frees_window_capacity() {
        let mut window = AckWindow::new();
        for i in 0..63 {
            window.assign_sequence(i);
        }
        assert!(window.window_full());
        window.apply_ack(1);
        assert!(!window.window_full());
    }

    #[test]
    fn ack_response_of_negative_one_is_noop() {
        let mut window = AckWindow::new();
        window.apply_ack(5);
        window.apply_ack(-1);
        assert_eq!(window.last_acknowledged_packet, 5);
    }
}
