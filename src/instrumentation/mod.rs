//! Instrumentation for the network server.
//!
//! Two views are offered: a stream of [`ServerNotification`]s the harness drains
//! after each call (the equivalent of trace sources), and cumulative counters
//! rendered as a [`stats::ServerReport`].

pub mod stats;

pub use stats::{DeviceReport, NetworkCounters, ServerReport, SessionCounters};

use crate::frame::DevAddr;
use crate::gateway::GatewayId;
use crate::queue::MessageKind;
use crate::scheduler::ReceiveWindow;
use serde::Serialize;
use std::time::Duration;

/// Something observable happened inside the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ServerNotification {
    /// A non-duplicate uplink was accepted.
    UplinkReceived {
        at: Duration,
        dev_addr: DevAddr,
        frame_counter: u16,
        gateway: GatewayId,
        retransmission: bool,
    },
    /// Downlink traffic was generated and queued.
    DownlinkGenerated {
        at: Duration,
        dev_addr: DevAddr,
        kind: MessageKind,
        payload_len: usize,
    },
    /// A downlink was handed to a gateway.
    DownlinkTransmitted {
        at: Duration,
        dev_addr: DevAddr,
        gateway: GatewayId,
        window: ReceiveWindow,
        frame_counter: u16,
        frame_len: usize,
    },
    /// The device acknowledged a confirmed downlink.
    DownlinkAcked { at: Duration, dev_addr: DevAddr },
    /// A confirmed downlink exhausted its transmissions without an ACK.
    DownlinkDropped {
        at: Duration,
        dev_addr: DevAddr,
        frame_port: Option<u8>,
    },
}

impl ServerNotification {
    pub fn dev_addr(&self) -> DevAddr {
        match *self {
            ServerNotification::UplinkReceived { dev_addr, .. }
            | ServerNotification::DownlinkGenerated { dev_addr, .. }
            | ServerNotification::DownlinkTransmitted { dev_addr, .. }
            | ServerNotification::DownlinkAcked { dev_addr, .. }
            | ServerNotification::DownlinkDropped { dev_addr, .. } => dev_addr,
        }
    }

    pub fn at(&self) -> Duration {
        match *self {
            ServerNotification::UplinkReceived { at, .. }
            | ServerNotification::DownlinkGenerated { at, .. }
            | ServerNotification::DownlinkTransmitted { at, .. }
            | ServerNotification::DownlinkAcked { at, .. }
            | ServerNotification::DownlinkDropped { at, .. } => at,
        }
    }
}
