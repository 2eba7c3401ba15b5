//! LoRaWAN MAC commands carried in the FOpts field.
//!
//! Only the link-adaptation pair is modeled: LinkADRReq (network → device) and
//! LinkADRAns (device → network). Every other CID is recognized for size lookups
//! but treated as unrecognized when decoding.

use super::OptionStep;
use crate::constants::*;
use crate::error::NetworkServerError;
use nom::number::complete::{le_u16, le_u8};
use nom::sequence::tuple;

/// Size in bytes (including the CID) of a MAC command sent by an end device.
pub fn uplink_command_size(cid: u8) -> Option<u8> {
    match cid {
        CID_RESET_IND => Some(2),
        CID_LINK_CHECK_REQ => Some(1),
        CID_LINK_ADR_ANS => Some(2),
        CID_DUTY_CYCLE_ANS => Some(1),
        CID_RX_PARAM_SETUP_ANS => Some(2),
        CID_DEV_STATUS_ANS => Some(3),
        CID_NEW_CHANNEL_ANS => Some(2),
        CID_RX_TIMING_SETUP_ANS => Some(1),
        CID_TX_PARAM_SETUP_ANS => Some(1),
        CID_DL_CHANNEL_ANS => Some(2),
        CID_REKEY_IND => Some(2),
        CID_ADR_PARAM_SETUP_ANS => Some(1),
        CID_DEVICE_TIME_REQ => Some(1),
        CID_REJOIN_PARAM_SETUP_ANS => Some(2),
        _ => None,
    }
}

/// Size in bytes (including the CID) of a MAC command sent by the network server.
pub fn downlink_command_size(cid: u8) -> Option<u8> {
    match cid {
        CID_RESET_CONF => Some(2),
        CID_LINK_CHECK_ANS => Some(3),
        CID_LINK_ADR_REQ => Some(5),
        CID_DUTY_CYCLE_REQ => Some(2),
        CID_RX_PARAM_SETUP_REQ => Some(5),
        CID_DEV_STATUS_REQ => Some(1),
        CID_NEW_CHANNEL_REQ => Some(6),
        CID_RX_TIMING_SETUP_REQ => Some(2),
        CID_TX_PARAM_SETUP_REQ => Some(2),
        CID_DL_CHANNEL_REQ => Some(5),
        CID_REKEY_CONF => Some(2),
        CID_ADR_PARAM_SETUP_REQ => Some(2),
        CID_DEVICE_TIME_ANS => Some(6),
        CID_FORCE_REJOIN_REQ => Some(3),
        CID_REJOIN_PARAM_SETUP_REQ => Some(2),
        _ => None,
    }
}

/// MAC commands an end device piggy-backs on an uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkMacCommand {
    /// Answer to a LinkADRReq
    LinkAdrAns {
        power_ack: bool,
        data_rate_ack: bool,
        channel_mask_ack: bool,
    },
}

impl UplinkMacCommand {
    pub fn cid(&self) -> u8 {
        match self {
            UplinkMacCommand::LinkAdrAns { .. } => CID_LINK_ADR_ANS,
        }
    }

    /// Encoded size including the CID.
    pub fn size(&self) -> u8 {
        uplink_command_size(self.cid()).unwrap_or(1)
    }

    /// True when the device accepted every part of the request.
    pub fn is_fully_acked(&self) -> bool {
        match *self {
            UplinkMacCommand::LinkAdrAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => power_ack && data_rate_ack && channel_mask_ack,
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        match *self {
            UplinkMacCommand::LinkAdrAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => {
                let mut status = 0u8;
                if power_ack {
                    status |= LINK_ADR_ANS_POWER_ACK;
                }
                if data_rate_ack {
                    status |= LINK_ADR_ANS_DATA_RATE_ACK;
                }
                if channel_mask_ack {
                    status |= LINK_ADR_ANS_CHANNEL_MASK_ACK;
                }
                out.push(CID_LINK_ADR_ANS);
                out.push(status);
            }
        }
    }

    pub(crate) fn decode_one(options: &[u8]) -> Result<OptionStep<Self>, NetworkServerError> {
        let cid = options[0];
        match cid {
            CID_LINK_ADR_ANS => {
                let needed = 2;
                if options.len() < needed {
                    return Err(NetworkServerError::TruncatedMacCommand {
                        cid,
                        needed,
                        available: options.len(),
                    });
                }
                let (_, status) = le_u8::<_, nom::error::Error<&[u8]>>(&options[1..])?;
                Ok(OptionStep::Command(
                    UplinkMacCommand::LinkAdrAns {
                        power_ack: status & LINK_ADR_ANS_POWER_ACK != 0,
                        data_rate_ack: status & LINK_ADR_ANS_DATA_RATE_ACK != 0,
                        channel_mask_ack: status & LINK_ADR_ANS_CHANNEL_MASK_ACK != 0,
                    },
                    needed,
                ))
            }
            _ => Ok(OptionStep::Unrecognized(cid)),
        }
    }
}

/// LinkADRReq payload: the link parameters the network wants the device to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAdrReq {
    /// Data-rate index, 15 = keep current
    pub data_rate_index: u8,
    /// Tx-power index, 15 = keep current
    pub tx_power_index: u8,
    /// Channel mask for the block selected by `ch_mask_ctrl`
    pub channel_mask: u16,
    /// Channel-mask control (3 bits)
    pub ch_mask_ctrl: u8,
    /// Number of transmissions per uplink (repetition count)
    pub nb_trans: u8,
}

impl LinkAdrReq {
    /// Validates field ranges before the command is placed in a frame.
    pub fn new(
        data_rate_index: u8,
        tx_power_index: u8,
        channel_mask: u16,
        ch_mask_ctrl: u8,
        nb_trans: u8,
    ) -> Result<Self, NetworkServerError> {
        check_field("data_rate_index", data_rate_index, 15)?;
        check_field("tx_power_index", tx_power_index, 15)?;
        check_field("ch_mask_ctrl", ch_mask_ctrl, 7)?;
        check_field("nb_trans", nb_trans, 7)?;
        Ok(Self {
            data_rate_index,
            tx_power_index,
            channel_mask,
            ch_mask_ctrl,
            nb_trans,
        })
    }

    pub fn requests_data_rate_change(&self) -> bool {
        self.data_rate_index != LINK_ADR_REQ_NO_CHANGE
    }

    pub fn requests_tx_power_change(&self) -> bool {
        self.tx_power_index != LINK_ADR_REQ_NO_CHANGE
    }
}

fn check_field(field: &'static str, value: u8, max: u8) -> Result<(), NetworkServerError> {
    if value > max {
        return Err(NetworkServerError::InvalidMacField { field, value, max });
    }
    Ok(())
}

/// MAC commands the network server piggy-backs on a downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkMacCommand {
    LinkAdrReq(LinkAdrReq),
}

impl DownlinkMacCommand {
    pub fn cid(&self) -> u8 {
        match self {
            DownlinkMacCommand::LinkAdrReq(_) => CID_LINK_ADR_REQ,
        }
    }

    /// Encoded size including the CID.
    pub fn size(&self) -> u8 {
        downlink_command_size(self.cid()).unwrap_or(1)
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        match self {
            DownlinkMacCommand::LinkAdrReq(req) => {
                out.push(CID_LINK_ADR_REQ);
                out.push((req.data_rate_index << 4) | (req.tx_power_index & 0x0F));
                out.extend_from_slice(&req.channel_mask.to_le_bytes());
                out.push(((req.ch_mask_ctrl & 0x07) << 4) | (req.nb_trans & 0x0F));
            }
        }
    }

    pub(crate) fn decode_one(options: &[u8]) -> Result<OptionStep<Self>, NetworkServerError> {
        let cid = options[0];
        match cid {
            CID_LINK_ADR_REQ => {
                let needed = 5;
                if options.len() < needed {
                    return Err(NetworkServerError::TruncatedMacCommand {
                        cid,
                        needed,
                        available: options.len(),
                    });
                }
                let (_, (dr_tx, channel_mask, redundancy)) =
                    tuple((le_u8::<_, nom::error::Error<&[u8]>>, le_u16, le_u8))(&options[1..])?;
                Ok(OptionStep::Command(
                    DownlinkMacCommand::LinkAdrReq(LinkAdrReq {
                        data_rate_index: dr_tx >> 4,
                        tx_power_index: dr_tx & 0x0F,
                        channel_mask,
                        ch_mask_ctrl: (redundancy >> 4) & 0x07,
                        nb_trans: redundancy & 0x0F,
                    }),
                    needed,
                ))
            }
            _ => Ok(OptionStep::Unrecognized(cid)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_adr_req_layout() {
        let req = LinkAdrReq::new(5, 3, 0x00FF, 0, 1).unwrap();
        let mut out = Vec::new();
        DownlinkMacCommand::LinkAdrReq(req).write(&mut out);
        assert_eq!(out, vec![0x03, 0x53, 0xFF, 0x00, 0x01]);
    }

    #[test]
    fn test_link_adr_req_rejects_out_of_range() {
        assert_eq!(
            LinkAdrReq::new(16, 0, 0, 0, 0),
            Err(NetworkServerError::InvalidMacField {
                field: "data_rate_index",
                value: 16,
                max: 15
            })
        );
        assert!(LinkAdrReq::new(0, 0, 0, 8, 0).is_err());
        assert!(LinkAdrReq::new(0, 0, 0, 0, 8).is_err());
        assert!(LinkAdrReq::new(15, 15, 0xFFFF, 7, 7).is_ok());
    }

    #[test]
    fn test_link_adr_ans_status_bits() {
        let step = UplinkMacCommand::decode_one(&[0x03, 0x05]).unwrap();
        assert_eq!(
            step,
            OptionStep::Command(
                UplinkMacCommand::LinkAdrAns {
                    power_ack: true,
                    data_rate_ack: false,
                    channel_mask_ack: true
                },
                2
            )
        );
    }

    #[test]
    fn test_truncated_link_adr_req() {
        let err = DownlinkMacCommand::decode_one(&[0x03, 0x50, 0xFF]).unwrap_err();
        assert_eq!(
            err,
            NetworkServerError::TruncatedMacCommand {
                cid: 0x03,
                needed: 5,
                available: 3
            }
        );
    }

    #[test]
    fn test_command_size_tables() {
        assert_eq!(uplink_command_size(CID_DEV_STATUS_ANS), Some(3));
        assert_eq!(uplink_command_size(0x0E), None);
        assert_eq!(downlink_command_size(CID_NEW_CHANNEL_REQ), Some(6));
        assert_eq!(downlink_command_size(0x00), None);
    }
}
