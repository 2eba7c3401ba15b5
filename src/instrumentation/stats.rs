//! # Per-Device and Network Statistics
//!
//! Counters are updated in place by the server as frames flow through it and
//! exported as a serializable [`ServerReport`].
//!
//! ## Usage
//!
//! ```rust
//! use lorawan_ns::{NetworkServer, ServerConfig};
//!
//! let server = NetworkServer::new(ServerConfig::default());
//! let report = server.report();
//! assert_eq!(report.network.rw1_sent, 0);
//! let json = report.to_json().unwrap();
//! assert!(json.contains("rw2_missed"));
//! ```

use crate::frame::DevAddr;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Counters kept for every device session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Every copy of every uplink, duplicates included
    pub uplink_received: u64,
    pub uplink_unique: u64,
    pub uplink_duplicate: u64,
    pub uplink_retransmitted: u64,
    /// Uplinks carrying the ACK bit
    pub uplink_acks_received: u64,
    pub downlink_generated: u64,
    pub downlink_sent: u64,
    pub downlink_sent_rw1: u64,
    pub downlink_sent_rw2: u64,
    pub downlink_retransmitted: u64,
    /// Downlinks sent with the ACK bit set
    pub downlink_acks_sent: u64,
    pub downlink_acked: u64,
    pub downlink_dropped: u64,
    /// Uplinks that forced a reply (confirmed uplink or ADRACKReq)
    pub forced_downlinks: u64,
    pub link_adr_rejections: u64,
    pub adr_commands_sent: u64,
    pub adr_commands_dropped: u64,
}

impl AddAssign<&SessionCounters> for SessionCounters {
    fn add_assign(&mut self, other: &SessionCounters) {
        self.uplink_received += other.uplink_received;
        self.uplink_unique += other.uplink_unique;
        self.uplink_duplicate += other.uplink_duplicate;
        self.uplink_retransmitted += other.uplink_retransmitted;
        self.uplink_acks_received += other.uplink_acks_received;
        self.downlink_generated += other.downlink_generated;
        self.downlink_sent += other.downlink_sent;
        self.downlink_sent_rw1 += other.downlink_sent_rw1;
        self.downlink_sent_rw2 += other.downlink_sent_rw2;
        self.downlink_retransmitted += other.downlink_retransmitted;
        self.downlink_acks_sent += other.downlink_acks_sent;
        self.downlink_acked += other.downlink_acked;
        self.downlink_dropped += other.downlink_dropped;
        self.forced_downlinks += other.forced_downlinks;
        self.link_adr_rejections += other.link_adr_rejections;
        self.adr_commands_sent += other.adr_commands_sent;
        self.adr_commands_dropped += other.adr_commands_dropped;
    }
}

impl SessionCounters {
    /// Share of generated confirmed traffic that was acknowledged, in percent.
    pub fn delivery_rate(&self) -> f64 {
        if self.downlink_generated == 0 {
            return 100.0;
        }
        (self.downlink_acked as f64 / self.downlink_generated as f64) * 100.0
    }
}

/// Receive-window outcomes across all devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub rw1_sent: u64,
    pub rw2_sent: u64,
    /// RW1 opened with something to send but no gateway available
    pub rw1_missed: u64,
    pub rw2_missed: u64,
    /// Uplinks that could not be decoded
    pub decode_errors: u64,
}

/// Exported state of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub dev_addr: DevAddr,
    pub data_rate_index: u8,
    pub tx_power_index: u8,
    pub queued_downlinks: usize,
    pub snr_max_db: f64,
    pub counters: SessionCounters,
}

/// Snapshot of the server statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerReport {
    /// Simulated time of the snapshot, in seconds
    pub at_seconds: f64,
    pub network: NetworkCounters,
    /// Sorted by device address
    pub devices: Vec<DeviceReport>,
}

impl ServerReport {
    /// Sum of the per-device counters.
    pub fn totals(&self) -> SessionCounters {
        let mut totals = SessionCounters::default();
        for device in &self.devices {
            totals += &device.counters;
        }
        totals
    }

    pub fn device(&self, dev_addr: DevAddr) -> Option<&DeviceReport> {
        self.devices
            .binary_search_by_key(&dev_addr, |device| device.dev_addr)
            .ok()
            .map(|index| &self.devices[index])
    }

    /// Export the report as pretty-printed JSON
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize network server report")
    }
}
