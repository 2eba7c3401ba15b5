//! Tests for the logging helpers of the `lorawan-ns` crate.

use lorawan_ns::logging::{init_logger, init_test_logger, log_debug, log_error, log_info, log_warn};
use lorawan_ns::util::logging::{log_frame_hex, LogThrottle, ThrottleManager};
use std::time::Duration;

/// The logging functions must not panic, with or without a logger installed.
#[test]
fn test_logging() {
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
}

#[test]
fn test_init_logger() {
    init_test_logger();
    // A second initialization is ignored rather than panicking.
    init_logger();
    log_frame_hex("Uplink", &[0xDA, 0x1B, 0x01, 0x26, 0x80, 0x01, 0x00]);
}

#[test]
fn test_throttled_macros() {
    let mut throttle = LogThrottle::new(Duration::from_secs(60), 2);
    for second in 0..5u64 {
        lorawan_ns::log_error_throttled!(
            throttle,
            Duration::from_secs(second),
            "spurious ACK {second}"
        );
    }
    assert_eq!(throttle.stats(Duration::from_secs(5)).suppressed, 3);

    let mut throttles = ThrottleManager::new(Duration::from_secs(60), 1);
    assert!(throttles.allow("window_rearm", Duration::ZERO));
    assert!(!throttles.allow("window_rearm", Duration::from_secs(59)));
    assert!(throttles.allow("window_rearm", Duration::from_secs(61)));
    assert_eq!(throttles.suppressed("window_rearm"), 1);
}
