//! Session configuration.

use std::time::Duration;

use wirebus_protocol::MAX_BUFFER;

/// Timing and limit knobs for one session.
///
/// The defaults are the protocol's standard values; tests shrink them to
/// keep time-dependent behavior fast and deterministic instead of sleeping
/// against real heartbeat periods.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often an `HB` frame is sent, unconditionally. Keeping the
    /// peer's activity clock fed lets it detect a half-open connection
    /// from its side too.
    pub heartbeat_interval: Duration,

    /// How often the liveness check runs. Independent of, and not
    /// synchronized with, the heartbeat timer.
    pub timeout_check_interval: Duration,

    /// The silence threshold: if no inbound bytes have arrived for longer
    /// than this when the check fires, the peer is considered dead.
    pub timeout: Duration,

    /// Bound on the accumulation buffer; exceeding it is a protocol
    /// violation.
    pub max_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(2000),
            timeout_check_interval: Duration::from_millis(5000),
            timeout: Duration::from_millis(5000),
            max_buffer: MAX_BUFFER,
        }
    }
}
