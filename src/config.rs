//! Runtime tunables (§6), exposed as a plain builder struct the embedder
//! constructs once, matching `NFSTcpListener::with_export_name`'s builder
//! style rather than a config-file/CLI layer this library has no use for.

use std::time::Duration;

pub const PROTOCOL_VERSION_MAJOR: u16 = 1;
/// YYMM, per §6.
pub const PROTOCOL_VERSION_MINOR: u16 = 1703;

/// Maximum number of in-flight (unacknowledged) data packets per connection
/// (§3 "Ack window").
pub const ACK_WINDOW_SIZE: usize = 63;

/// The ring buffer backing the ack window has one slot more than the window
/// itself holds, so `send_seq` and `last_acknowledged_packet` never alias
/// within one window (§3 "Ack window": "ring of at most 63 entries; index
/// `i mod 64`").
pub const ACK_RING_LEN: usize = 64;

/// Sequence numbers wrap modulo 2^15 (§6, §9 Open Question 3).
pub const SEQUENCE_MODULUS: i32 = 1 << 15;

#[derive(Clone, Debug)]
pub struct Config {
    critical_ping_threshold: Duration,
    bulk_window_size: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            critical_ping_threshold: Duration::from_millis(1500),
            bulk_window_size: 3,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded [50ms, 20s] per §6.
    pub fn with_critical_ping_threshold(mut self, threshold: Duration) -> Self {
        assert!(
            threshold >= Duration::from_millis(50) && threshold <= Duration::from_secs(20),
            "critical ping threshold must be within [50ms, 20s]"
        );
        self.critical_ping_threshold = threshold;
        self
    }

    /// Bounded [1, 40] per §6.
    pub fn with_bulk_window_size(mut self, size: u16) -> Self {
        assert!((1..=40).contains(&size), "bulk window size must be within [1, 40]");
        self.bulk_window_size = size;
        self
    }

    pub fn critical_ping_threshold(&self) -> Duration {
        self.critical_ping_threshold
    }

    pub fn bulk_window_size(&self) -> u16 {
        self.bulk_window_size
    }
}
