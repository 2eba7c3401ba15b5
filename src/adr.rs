//! Adaptive Data Rate (ADR) for LoRaWAN end devices
//!
//! Network-side ADR in the style of the Semtech / TTN recommendation: the best SNR
//! observed over the recent uplinks is compared with the demodulation floor of the
//! device's current data rate. Each 3 dB of margin left after the installation
//! margin buys one step, spent first on a faster data rate and then on lower
//! transmit power. A negative margin only raises the transmit power again; the
//! data rate is never lowered by the network.
//!
//! Data-rate indices follow EU868 (DR0 = SF12 … DR5 = SF7). Tx-power indices count
//! down from the maximum EIRP in 2 dB steps, so a higher index is a lower power.

use crate::constants::{ADR_FREQUENCY, MAX_DATA_RATE_INDEX, MAX_TX_POWER_INDEX};
use crate::error::NetworkServerError;
use crate::frame::DevAddr;
use crate::session::{DeviceSession, SessionStore};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// dB of SNR margin per ADR step
const ADR_STEP_DB: f64 = 3.0;

/// Demodulation floor per data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnrTable {
    /// Datasheet values of the Semtech SX1272
    Semtech,
    /// Thresholds measured on the simulated channel
    Calibrated,
}

impl SnrTable {
    const SEMTECH: [f64; 6] = [-20.0, -17.5, -15.0, -12.5, -10.0, -7.5];
    const CALIBRATED: [f64; 6] = [-25.6243, -22.7568, -20.0254, -17.3749, -14.8485, -12.2833];

    /// Required SNR in dB to demodulate at `data_rate_index` (clamped to DR5).
    pub fn required_snr(&self, data_rate_index: u8) -> f64 {
        let index = usize::from(data_rate_index.min(MAX_DATA_RATE_INDEX));
        match self {
            SnrTable::Semtech => Self::SEMTECH[index],
            SnrTable::Calibrated => Self::CALIBRATED[index],
        }
    }
}

/// ADR configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdrConfig {
    pub snr_table: SnrTable,

    /// Safety margin subtracted from the measured SNR (dB)
    pub installation_margin_db: f64,

    /// Run ADR every this many unique uplinks, 0 disables it
    pub frequency: u32,

    /// Channel mask placed in every LinkADRReq
    pub channel_mask: u16,

    pub ch_mask_ctrl: u8,

    /// NbTrans placed in every LinkADRReq
    pub nb_trans: u8,
}

impl Default for AdrConfig {
    fn default() -> Self {
        Self {
            snr_table: SnrTable::Calibrated,
            installation_margin_db: 10.0,
            frequency: ADR_FREQUENCY,
            channel_mask: 0x00FF,
            ch_mask_ctrl: 0,
            nb_trans: 1,
        }
    }
}

impl AdrConfig {
    pub fn validate(&self) -> Vec<NetworkServerError> {
        let mut errors = Vec::new();
        if !self.installation_margin_db.is_finite() {
            errors.push(NetworkServerError::InvalidConfig(format!(
                "ADR installation margin {} dB is not finite",
                self.installation_margin_db
            )));
        }
        if self.ch_mask_ctrl > 7 {
            errors.push(NetworkServerError::InvalidMacField {
                field: "ch_mask_ctrl",
                value: self.ch_mask_ctrl,
                max: 7,
            });
        }
        if self.nb_trans > 7 {
            errors.push(NetworkServerError::InvalidMacField {
                field: "nb_trans",
                value: self.nb_trans,
                max: 7,
            });
        }
        errors
    }
}

/// Outcome of one ADR evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AdrResult {
    /// `false` only when the device is unknown
    pub success: bool,
    pub data_rate_index: u8,
    pub tx_power_index: u8,
    pub channel_mask: u16,
    pub ch_mask_ctrl: u8,
    pub nb_trans: u8,
    /// The recommendation differs from the device's current settings
    pub changed: bool,
}

/// Network-side ADR engine
#[derive(Debug, Clone, Default)]
pub struct AdrEngine {
    config: AdrConfig,
}

impl AdrEngine {
    pub fn new(config: AdrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdrConfig {
        &self.config
    }

    /// Runs ADR for a device in the store.
    pub fn run(&self, store: &mut SessionStore, dev_addr: DevAddr) -> AdrResult {
        match store.get_mut(dev_addr) {
            Some(session) => self.run_for_session(session),
            None => {
                warn!("ADR: no session for device {dev_addr}");
                AdrResult {
                    success: false,
                    data_rate_index: 0,
                    tx_power_index: 0,
                    channel_mask: self.config.channel_mask,
                    ch_mask_ctrl: self.config.ch_mask_ctrl,
                    nb_trans: self.config.nb_trans,
                    changed: false,
                }
            }
        }
    }

    /// Runs ADR on one session and stores the new tx-power index.
    ///
    /// The data rate is not stored: the session picks it up from the device's next
    /// uplink once the device applied the command.
    pub fn run_for_session(&self, session: &mut DeviceSession) -> AdrResult {
        let current_dr = session.data_rate_index;
        let current_tx = session.tx_power_index;

        let mut result = AdrResult {
            success: true,
            data_rate_index: current_dr,
            tx_power_index: current_tx,
            channel_mask: self.config.channel_mask,
            ch_mask_ctrl: self.config.ch_mask_ctrl,
            nb_trans: self.config.nb_trans,
            changed: false,
        };

        if current_dr >= MAX_DATA_RATE_INDEX && current_tx >= MAX_TX_POWER_INDEX {
            debug!(
                "ADR: device {} already at DR{} / tx index {}",
                session.dev_addr, current_dr, current_tx
            );
            return result;
        }

        let snr_max = session.snr_history.max_snr();
        let required = self.config.snr_table.required_snr(current_dr);
        let margin = snr_max - required - session.installation_margin_db;
        let mut steps = (margin / ADR_STEP_DB).floor() as i32;

        let mut dr = current_dr;
        let mut tx = current_tx;
        while steps > 0 && dr < MAX_DATA_RATE_INDEX {
            dr += 1;
            steps -= 1;
        }
        while steps > 0 && tx < MAX_TX_POWER_INDEX {
            tx += 1;
            steps -= 1;
        }
        while steps < 0 && tx > 0 {
            tx -= 1;
            steps += 1;
        }

        result.data_rate_index = dr;
        result.tx_power_index = tx;
        result.changed = dr != current_dr || tx != current_tx;
        session.tx_power_index = tx;

        if result.changed {
            info!(
                "ADR: device {} DR{} → DR{}, tx index {} → {} (SNR max {:.1} dB, margin {:.1} dB)",
                session.dev_addr, current_dr, dr, current_tx, tx, snr_max, margin
            );
        }

        result
    }
}
