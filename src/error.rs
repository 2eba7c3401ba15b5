//! # Network Server Error Handling
//!
//! This module defines the NetworkServerError enum, which represents the different error
//! types that can occur in the lorawan-ns crate. None of them is fatal to the event loop:
//! callers log them and keep processing.

use crate::frame::DevAddr;
use thiserror::Error;

/// Represents the different error types that can occur in the network server.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkServerError {
    /// Fewer bytes than the mandatory frame header.
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    /// A recognized MAC command is cut off by the end of the frame options.
    #[error("Truncated MAC command 0x{cid:02X}: needs {needed} bytes, {available} available")]
    TruncatedMacCommand {
        cid: u8,
        needed: usize,
        available: usize,
    },

    /// Indicates a nom parsing error.
    #[error("Error parsing LoRaWAN frame: {0}")]
    FrameParse(String),

    /// Adding a MAC command would exceed the 15-byte FOpts field.
    #[error("FOpts overflow: {current} bytes in use, {requested} more requested")]
    FOptsOverflow { current: u8, requested: u8 },

    /// A MAC command field is out of its encodable range.
    #[error("Invalid MAC command field {field}: {value} (max {max})")]
    InvalidMacField {
        field: &'static str,
        value: u8,
        max: u8,
    },

    /// The frame references a device without a session.
    #[error("Unknown device {0}")]
    UnknownDevice(DevAddr),

    /// The configured downstream packet cannot hold the mandatory header.
    #[error("Downstream packet size {size} is below the minimum of {minimum} bytes")]
    PacketSizeTooSmall { size: usize, minimum: usize },

    /// Indicates an inconsistent configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl<E: std::fmt::Debug> From<nom::Err<E>> for NetworkServerError {
    fn from(err: nom::Err<E>) -> Self {
        NetworkServerError::FrameParse(format!("{err:?}"))
    }
}
