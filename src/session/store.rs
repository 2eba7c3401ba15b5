//! Session map and uplink classification.

use super::DeviceSession;
use crate::config::ServerConfig;
use crate::frame::DevAddr;
use crate::gateway::GatewayId;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How an incoming uplink copy relates to what the device sent before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// A frame counter never seen before
    New,
    /// Another gateway's copy of the current transmission
    Duplicate,
    /// The device sent an already accepted frame counter again
    Retransmission,
}

/// Settings every new session is created with.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SessionDefaults {
    snr_history_depth: usize,
    installation_margin_db: f64,
    rx1_dr_offset: u8,
    dedup_window: Duration,
    adr_frequency: u32,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: HashMap<DevAddr, DeviceSession>,
    defaults: SessionDefaults,
}

impl SessionStore {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            defaults: SessionDefaults {
                snr_history_depth: config.snr_history_depth,
                installation_margin_db: config.adr.installation_margin_db,
                rx1_dr_offset: config.rx1_data_rate_offset,
                dedup_window: config.dedup_window,
                adr_frequency: config.adr.frequency,
            },
        }
    }

    fn new_session(&self, dev_addr: DevAddr) -> DeviceSession {
        DeviceSession::new(
            dev_addr,
            self.defaults.snr_history_depth,
            self.defaults.installation_margin_db,
            self.defaults.rx1_dr_offset,
        )
    }

    /// Creates a session ahead of its first uplink. Returns `false` if one exists.
    pub fn register(&mut self, dev_addr: DevAddr) -> bool {
        if self.sessions.contains_key(&dev_addr) {
            return false;
        }
        let session = self.new_session(dev_addr);
        self.sessions.insert(dev_addr, session);
        true
    }

    /// Returns the session, creating it if the device was never registered.
    pub fn get_or_create(&mut self, dev_addr: DevAddr) -> &mut DeviceSession {
        let defaults = self.defaults;
        self.sessions.entry(dev_addr).or_insert_with(|| {
            warn!("Uplink from unregistered device {dev_addr}, creating session");
            DeviceSession::new(
                dev_addr,
                defaults.snr_history_depth,
                defaults.installation_margin_db,
                defaults.rx1_dr_offset,
            )
        })
    }

    pub fn get(&self, dev_addr: DevAddr) -> Option<&DeviceSession> {
        self.sessions.get(&dev_addr)
    }

    pub fn get_mut(&mut self, dev_addr: DevAddr) -> Option<&mut DeviceSession> {
        self.sessions.get_mut(&dev_addr)
    }

    pub fn contains(&self, dev_addr: DevAddr) -> bool {
        self.sessions.contains_key(&dev_addr)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Device addresses in ascending order.
    pub fn addresses(&self) -> Vec<DevAddr> {
        let mut addresses: Vec<DevAddr> = self.sessions.keys().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceSession> {
        self.sessions.values()
    }

    /// Classifies one uplink copy and updates the session accordingly.
    ///
    /// Duplicates only touch the reception set, the SNR history and the counters.
    /// New frames and retransmissions start a new transmission attempt.
    pub fn classify(
        &mut self,
        dev_addr: DevAddr,
        frame_counter: u16,
        gateway: GatewayId,
        snr: f64,
        now: Duration,
    ) -> Classification {
        let dedup_window = self.defaults.dedup_window;
        let adr_frequency = self.defaults.adr_frequency;
        let session = self.get_or_create(dev_addr);
        session.counters.uplink_received += 1;

        let already_accepted = session
            .last_frame_counter
            .map_or(false, |last| frame_counter <= last);

        if !already_accepted {
            session.last_frame_counter = Some(frame_counter);
            session.last_seen = Some(now);
            session.start_transmission(gateway);
            session.snr_history.push(frame_counter, snr);
            session.counters.uplink_unique += 1;
            if adr_frequency > 0 && session.counters.uplink_unique % u64::from(adr_frequency) == 0 {
                debug!("Device {dev_addr}: ADR evaluation due");
                session.adr_requested = true;
            }
            return Classification::New;
        }

        let within_window = session
            .last_seen
            .map_or(false, |seen| now.saturating_sub(seen) <= dedup_window);

        if within_window {
            if session.add_receiver(gateway) {
                session.snr_history.merge(frame_counter, snr);
            }
            session.counters.uplink_duplicate += 1;
            return Classification::Duplicate;
        }

        session.last_seen = Some(now);
        session.start_transmission(gateway);
        session.counters.uplink_retransmitted += 1;
        Classification::Retransmission
    }
}
