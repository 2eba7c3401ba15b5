//! # Utility Modules
//!
//! Common helpers used throughout the lorawan-ns crate: hex encoding for frame
//! dumps and rate-limited logging keyed on simulated time.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact};
pub use logging::{log_frame_hex, LogThrottle, ThrottleManager};
