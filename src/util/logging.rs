//! # Logging Utilities
//!
//! Rate-limited logging for recurring protocol inconsistencies, hex dumps of
//! frames and optional tracing spans around event dispatch.
//!
//! The network server runs on a simulated clock, so throttle windows are measured
//! against the simulation time passed in by the caller rather than the wall clock.
//! A burst of thousands of simulated seconds can otherwise be processed in a few
//! real milliseconds and a wall-clock throttle would silence almost everything.
//!
//! ## Usage
//!
//! ```rust
//! use lorawan_ns::util::logging::{log_frame_hex, LogThrottle};
//! use std::time::Duration;
//!
//! // At most 5 messages per 60 simulated seconds
//! let mut throttle = LogThrottle::new(Duration::from_secs(60), 5);
//! if throttle.allow(Duration::from_secs(3)) {
//!     log::warn!("ACK received with an empty downstream queue");
//! }
//!
//! log_frame_hex("Uplink", &[0x04, 0x03, 0x02, 0x01, 0x20, 0x05, 0x00]);
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Throttling structure for rate-limiting log messages
#[derive(Debug, Clone)]
pub struct LogThrottle {
    /// Length of one throttle window in simulated time
    window: Duration,
    /// Maximum messages allowed per window
    cap: u32,
    /// Messages seen in the current window
    count: u32,
    /// Messages suppressed since the throttle was created
    suppressed: u64,
    /// Start of the current window
    t0: Duration,
}

impl LogThrottle {
    /// Create a new throttle with a window length and message cap
    pub fn new(window: Duration, cap: u32) -> Self {
        Self {
            window,
            cap,
            count: 0,
            suppressed: 0,
            t0: Duration::ZERO,
        }
    }

    /// Returns `true` if a message logged at simulated time `now` should be emitted.
    pub fn allow(&mut self, now: Duration) -> bool {
        if now.saturating_sub(self.t0) > self.window {
            self.t0 = now;
            self.count = 0;
        }

        self.count += 1;
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    pub fn stats(&self, now: Duration) -> ThrottleStats {
        ThrottleStats {
            window: self.window,
            cap: self.cap,
            count: self.count,
            suppressed: self.suppressed,
            window_remaining: self.window.saturating_sub(now.saturating_sub(self.t0)),
        }
    }

    /// Start a new window at `now`.
    pub fn reset(&mut self, now: Duration) {
        self.t0 = now;
        self.count = 0;
    }
}

/// Statistics about a log throttle instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    pub window: Duration,
    pub cap: u32,
    pub count: u32,
    pub suppressed: u64,
    pub window_remaining: Duration,
}

/// Throttles keyed by message category, so that one noisy category does not
/// starve another.
#[derive(Debug, Default)]
pub struct ThrottleManager {
    throttles: HashMap<&'static str, LogThrottle>,
    window: Duration,
    cap: u32,
}

impl ThrottleManager {
    /// Every category gets its own throttle with the same window and cap.
    pub fn new(window: Duration, cap: u32) -> Self {
        Self {
            throttles: HashMap::new(),
            window,
            cap,
        }
    }

    /// The throttle of one category, created on first use.
    pub fn category(&mut self, category: &'static str) -> &mut LogThrottle {
        let (window, cap) = (self.window, self.cap);
        self.throttles
            .entry(category)
            .or_insert_with(|| LogThrottle::new(window, cap))
    }

    pub fn allow(&mut self, category: &'static str, now: Duration) -> bool {
        self.category(category).allow(now)
    }

    /// Total messages suppressed for a category.
    pub fn suppressed(&self, category: &str) -> u64 {
        self.throttles
            .get(category)
            .map_or(0, |throttle| throttle.suppressed)
    }
}

/// Log frame data in hex format at debug level, truncated to 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    let display_data = &data[..data.len().min(MAX_LOG_BYTES)];
    let hex_str = crate::util::hex::format_hex_compact(display_data);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!(target: "lorawan_ns::frame", "{prefix}: {hex_str}{suffix}");
}

/// Enter a tracing span covering the dispatch of one scheduled event
#[cfg(feature = "tracing")]
pub fn span_event_dispatch(kind: &str, dev_addr: u32, at: Duration) -> tracing::span::EnteredSpan {
    tracing::debug_span!(
        "event_dispatch",
        kind = kind,
        dev_addr = dev_addr,
        at_ms = at.as_millis() as u64
    )
    .entered()
}

/// No-op when tracing is disabled
#[cfg(not(feature = "tracing"))]
pub fn span_event_dispatch(_kind: &str, _dev_addr: u32, _at: Duration) {}

/// Log an error when the throttle allows it at the given simulated time
#[macro_export]
macro_rules! log_error_throttled {
    ($throttle:expr, $now:expr, $($arg:tt)*) => {
        if $throttle.allow($now) {
            log::error!($($arg)*);
        }
    };
}

/// Log a warning when the throttle allows it at the given simulated time
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $now:expr, $($arg:tt)*) => {
        if $throttle.allow($now) {
            log::warn!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_throttle_basic() {
        let mut throttle = LogThrottle::new(Duration::from_secs(10), 3);
        let now = Duration::from_secs(1);

        assert!(throttle.allow(now));
        assert!(throttle.allow(now));
        assert!(throttle.allow(now));
        assert!(!throttle.allow(now));
        assert_eq!(throttle.stats(now).suppressed, 1);
    }

    #[test]
    fn test_log_throttle_window_follows_simulated_time() {
        let mut throttle = LogThrottle::new(Duration::from_secs(10), 1);

        assert!(throttle.allow(Duration::from_secs(0)));
        assert!(!throttle.allow(Duration::from_secs(10)));
        assert!(throttle.allow(Duration::from_millis(10_001)));
        assert!(!throttle.allow(Duration::from_secs(12)));
    }

    #[test]
    fn test_log_throttle_reset() {
        let mut throttle = LogThrottle::new(Duration::from_secs(60), 1);
        assert!(throttle.allow(Duration::ZERO));
        assert!(!throttle.allow(Duration::from_secs(1)));

        throttle.reset(Duration::from_secs(2));
        assert!(throttle.allow(Duration::from_secs(2)));
        assert_eq!(
            throttle.stats(Duration::from_secs(12)).window_remaining,
            Duration::from_secs(50)
        );
    }

    #[test]
    fn test_throttle_manager_categories_are_independent() {
        let mut manager = ThrottleManager::new(Duration::from_secs(60), 1);
        let now = Duration::from_secs(5);

        assert!(manager.allow("ack", now));
        assert!(!manager.allow("ack", now));
        assert!(manager.allow("rearm", now));
        assert_eq!(manager.suppressed("ack"), 1);
        assert_eq!(manager.suppressed("rearm"), 0);
        assert_eq!(manager.suppressed("unknown"), 0);
    }

    #[test]
    fn test_throttled_warn_macro_uses_category() {
        let mut manager = ThrottleManager::new(Duration::from_secs(60), 2);
        for second in 0..4u64 {
            log_warn_throttled!(
                manager.category("decode"),
                Duration::from_secs(second),
                "undecodable frame {second}"
            );
        }
        assert_eq!(manager.suppressed("decode"), 2);
    }

    #[test]
    fn test_log_frame_hex_handles_long_frames() {
        let data = vec![0xAB; 200];
        log_frame_hex("Downlink", &data);
        log_frame_hex("Empty", &[]);
    }
}
