//! Per-device protocol state kept by the network server.

pub mod snr_history;
pub mod store;

pub use snr_history::{SnrHistory, SnrHistoryRow};
pub use store::{Classification, SessionStore};

use crate::frame::DevAddr;
use crate::gateway::GatewayId;
use crate::instrumentation::SessionCounters;
use crate::queue::DownstreamQueue;
use crate::scheduler::WindowTimer;
use std::time::Duration;

/// State of one end device, keyed by its [`DevAddr`].
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub dev_addr: DevAddr,
    /// Last accepted uplink FCnt, `None` until the first frame
    pub last_frame_counter: Option<u16>,
    /// FCnt of the next downlink
    pub downlink_frame_counter: u16,
    /// The next downlink must carry the ACK bit
    pub pending_ack: bool,
    pub frame_pending: bool,
    pub last_seen: Option<Duration>,
    /// Gateways that heard the current transmission, in arrival order
    pub reception_set: Vec<GatewayId>,
    pub last_channel_index: u8,
    /// Data rate of the last uplink, also the device's current data rate
    pub data_rate_index: u8,
    pub last_code_rate: u8,
    pub snr_history: SnrHistory,
    /// Network-maintained, 0 is maximum power
    pub tx_power_index: u8,
    pub rx1_dr_offset: u8,
    pub queue: DownstreamQueue,
    pub adr_requested: bool,
    pub installation_margin_db: f64,
    pub window_timer: Option<WindowTimer>,
    pub counters: SessionCounters,
}

impl DeviceSession {
    pub fn new(
        dev_addr: DevAddr,
        snr_history_depth: usize,
        installation_margin_db: f64,
        rx1_dr_offset: u8,
    ) -> Self {
        Self {
            dev_addr,
            last_frame_counter: None,
            downlink_frame_counter: 0,
            pending_ack: false,
            frame_pending: false,
            last_seen: None,
            reception_set: Vec::new(),
            last_channel_index: 0,
            data_rate_index: 0,
            last_code_rate: 1,
            snr_history: SnrHistory::new(snr_history_depth),
            tx_power_index: 0,
            rx1_dr_offset,
            queue: DownstreamQueue::default(),
            adr_requested: false,
            installation_margin_db,
            window_timer: None,
            counters: SessionCounters::default(),
        }
    }

    /// Anything to send in the next receive window?
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty() || self.pending_ack
    }

    /// Records the radio parameters of an accepted uplink.
    pub fn update_radio(&mut self, channel_index: u8, data_rate_index: u8, code_rate: u8) {
        self.last_channel_index = channel_index;
        self.data_rate_index = data_rate_index;
        self.last_code_rate = code_rate;
    }

    /// RX1 data rate: the uplink data rate lowered by the RX1 offset.
    pub fn rx1_data_rate_index(&self) -> u8 {
        self.data_rate_index.saturating_sub(self.rx1_dr_offset)
    }

    fn start_transmission(&mut self, gateway: GatewayId) {
        self.reception_set.clear();
        self.reception_set.push(gateway);
    }

    /// Adds `gateway` unless it already heard this transmission.
    fn add_receiver(&mut self, gateway: GatewayId) -> bool {
        if self.reception_set.contains(&gateway) {
            return false;
        }
        self.reception_set.push(gateway);
        true
    }
}
