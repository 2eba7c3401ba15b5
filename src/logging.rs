//! # Logging setup
//!
//! The crate logs through the `log` facade. Binaries and test harnesses call
//! [`init_logger`] once; the level is taken from `RUST_LOG`.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// Safe to call more than once: later calls are ignored.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Initializes a logger that writes through the test harness capture.
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
