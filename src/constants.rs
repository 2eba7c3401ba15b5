//! LoRaWAN Protocol Constants
//!
//! This module defines constants used by the network-server implementation,
//! based on the LoRaWAN 1.1 link-layer specification and the EU868 regional
//! parameters.

use std::time::Duration;

/// FCtrl mask for the ADR bit (both directions)
pub const LORAWAN_FHDR_ADR_MASK: u8 = 0x80;

/// FCtrl mask for the ADRACKReq bit (uplink only, RFU on downlink)
pub const LORAWAN_FHDR_ADRACKREQ_MASK: u8 = 0x40;

/// FCtrl mask for the ACK bit (both directions)
pub const LORAWAN_FHDR_ACK_MASK: u8 = 0x20;

/// FCtrl mask for the ClassB bit (uplink only)
pub const LORAWAN_FHDR_CLASSB_MASK: u8 = 0x10;

/// FCtrl mask for the FPending bit (downlink only)
pub const LORAWAN_FHDR_FPENDING_MASK: u8 = 0x10;

/// FCtrl mask for the FOptsLen field
pub const LORAWAN_FHDR_FOPTSLEN_MASK: u8 = 0x0F;

/// Maximum number of bytes of piggy-backed MAC commands
pub const LORAWAN_FHDR_FOPTSLEN_MAX_SIZE: u8 = 15;

/// DevAddr (4) + FCtrl (1) + FCnt (2)
pub const LORAWAN_FHDR_MIN_SIZE: usize = 7;

/// Frame header (8 with FPort) + MHDR (1) + MIC (4)
pub const LORAWAN_MIN_DOWNLINK_PACKET_SIZE: usize = 8 + 1 + 4;

// MAC commands sent by the end device (uplink CIDs)
pub const CID_RESET_IND: u8 = 0x01;
pub const CID_LINK_CHECK_REQ: u8 = 0x02;
pub const CID_LINK_ADR_ANS: u8 = 0x03;
pub const CID_DUTY_CYCLE_ANS: u8 = 0x04;
pub const CID_RX_PARAM_SETUP_ANS: u8 = 0x05;
pub const CID_DEV_STATUS_ANS: u8 = 0x06;
pub const CID_NEW_CHANNEL_ANS: u8 = 0x07;
pub const CID_RX_TIMING_SETUP_ANS: u8 = 0x08;
pub const CID_TX_PARAM_SETUP_ANS: u8 = 0x09;
pub const CID_DL_CHANNEL_ANS: u8 = 0x0A;
pub const CID_REKEY_IND: u8 = 0x0B;
pub const CID_ADR_PARAM_SETUP_ANS: u8 = 0x0C;
pub const CID_DEVICE_TIME_REQ: u8 = 0x0D;
pub const CID_REJOIN_PARAM_SETUP_ANS: u8 = 0x0F;

// MAC commands sent by the network server (downlink CIDs)
pub const CID_RESET_CONF: u8 = 0x01;
pub const CID_LINK_CHECK_ANS: u8 = 0x02;
pub const CID_LINK_ADR_REQ: u8 = 0x03;
pub const CID_DUTY_CYCLE_REQ: u8 = 0x04;
pub const CID_RX_PARAM_SETUP_REQ: u8 = 0x05;
pub const CID_DEV_STATUS_REQ: u8 = 0x06;
pub const CID_NEW_CHANNEL_REQ: u8 = 0x07;
pub const CID_RX_TIMING_SETUP_REQ: u8 = 0x08;
pub const CID_TX_PARAM_SETUP_REQ: u8 = 0x09;
pub const CID_DL_CHANNEL_REQ: u8 = 0x0A;
pub const CID_REKEY_CONF: u8 = 0x0B;
pub const CID_ADR_PARAM_SETUP_REQ: u8 = 0x0C;
pub const CID_DEVICE_TIME_ANS: u8 = 0x0D;
pub const CID_FORCE_REJOIN_REQ: u8 = 0x0E;
pub const CID_REJOIN_PARAM_SETUP_REQ: u8 = 0x0F;

/// LinkADRAns status bit: power accepted
pub const LINK_ADR_ANS_POWER_ACK: u8 = 0x04;

/// LinkADRAns status bit: data rate accepted
pub const LINK_ADR_ANS_DATA_RATE_ACK: u8 = 0x02;

/// LinkADRAns status bit: channel mask accepted
pub const LINK_ADR_ANS_CHANNEL_MASK_ACK: u8 = 0x01;

/// Nibble value meaning "keep the current setting" in LinkADRReq
pub const LINK_ADR_REQ_NO_CHANGE: u8 = 0x0F;

/// Delay between the end of an uplink and the opening of RX1
pub const RECEIVE_DELAY1: Duration = Duration::from_secs(1);

/// Delay between the end of an uplink and the opening of RX2
pub const RECEIVE_DELAY2: Duration = Duration::from_secs(2);

/// Copies of an uplink seen within this window are duplicates
pub const DEDUP_WINDOW: Duration = Duration::from_secs(1);

/// Number of frames kept in the ADR SNR history
pub const SNR_HISTORY_DEPTH: usize = 20;

/// An ADR command is requested every this many unique uplinks
pub const ADR_FREQUENCY: u32 = 20;

/// Transmission budget of a confirmed downlink
pub const DEFAULT_NUMBER_DS_TRANSMISSIONS: u8 = 4;

/// Highest EU868 data-rate index used by ADR (SF7/125kHz)
pub const MAX_DATA_RATE_INDEX: u8 = 5;

/// Highest EU868 tx-power index (lowest power, max EIRP - 14 dB)
pub const MAX_TX_POWER_INDEX: u8 = 7;

/// EU868 RX2 channel (869.525 MHz, last entry of the channel plan)
pub const RW2_CHANNEL_INDEX: u8 = 8;

/// EU868 RX2 data rate (DR0, SF12/125kHz)
pub const RW2_DATA_RATE_INDEX: u8 = 0;

/// SNR floor used when computing the maximum over the ADR history
pub const ADR_SNR_FLOOR_DB: f64 = -128.0;

/// Frame port used for generated application downlinks
pub const DOWNLINK_TRAFFIC_FRAME_PORT: u8 = 1;
