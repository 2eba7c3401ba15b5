//! Downlink frame header (network server → end device).

use super::mac_command::{DownlinkMacCommand, LinkAdrReq};
use super::{parse_frame_options, split_frame, DevAddr};
use crate::constants::{
    LORAWAN_FHDR_FOPTSLEN_MASK, LORAWAN_FHDR_FOPTSLEN_MAX_SIZE, LORAWAN_FHDR_MIN_SIZE,
};
use crate::error::NetworkServerError;
use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

bitflags! {
    /// Downlink FCtrl bits. Bit 6 is RFU and never set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DownlinkFlags: u8 {
        const ADR = 0x80;
        const ACK = 0x20;
        const FRAME_PENDING = 0x10;
    }
}

/// Downlink frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkFrameHeader {
    pub dev_addr: DevAddr,
    pub flags: DownlinkFlags,
    pub frame_counter: u16,
    pub frame_port: Option<u8>,
    mac_commands: Vec<DownlinkMacCommand>,
}

impl DownlinkFrameHeader {
    pub fn new(dev_addr: DevAddr, flags: DownlinkFlags, frame_counter: u16) -> Self {
        Self {
            dev_addr,
            flags,
            frame_counter,
            frame_port: None,
            mac_commands: Vec::new(),
        }
    }

    pub fn mac_commands(&self) -> &[DownlinkMacCommand] {
        &self.mac_commands
    }

    /// The first LinkADRReq carried in FOpts, if any.
    pub fn link_adr_req(&self) -> Option<&LinkAdrReq> {
        self.mac_commands.iter().find_map(|command| match command {
            DownlinkMacCommand::LinkAdrReq(req) => Some(req),
        })
    }

    pub fn frame_options_length(&self) -> u8 {
        self.mac_commands.iter().map(|c| c.size()).sum()
    }

    pub fn serialized_size(&self) -> usize {
        let port = usize::from(self.writes_frame_port());
        LORAWAN_FHDR_MIN_SIZE + port + self.frame_options_length() as usize
    }

    fn writes_frame_port(&self) -> bool {
        self.frame_port.is_some() || !self.mac_commands.is_empty()
    }

    /// Appends a LinkADRReq after validating its fields and the FOpts budget.
    pub fn add_link_adr_req(
        &mut self,
        data_rate_index: u8,
        tx_power_index: u8,
        channel_mask: u16,
        ch_mask_ctrl: u8,
        nb_trans: u8,
    ) -> Result<(), NetworkServerError> {
        let req = LinkAdrReq::new(
            data_rate_index,
            tx_power_index,
            channel_mask,
            ch_mask_ctrl,
            nb_trans,
        )?;
        let command = DownlinkMacCommand::LinkAdrReq(req);
        let current = self.frame_options_length();
        if current + command.size() > LORAWAN_FHDR_FOPTSLEN_MAX_SIZE {
            return Err(NetworkServerError::FOptsOverflow {
                current,
                requested: command.size(),
            });
        }
        self.frame_port.get_or_insert(0);
        self.mac_commands.push(command);
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        let fopts_len = self.frame_options_length() & LORAWAN_FHDR_FOPTSLEN_MASK;

        buf.put_u32_le(self.dev_addr.0);
        buf.put_u8(self.flags.bits() | fopts_len);
        buf.put_u16_le(self.frame_counter);

        if self.writes_frame_port() {
            buf.put_u8(self.frame_port.unwrap_or(0));
            let mut options = Vec::with_capacity(fopts_len as usize);
            for command in &self.mac_commands {
                command.write(&mut options);
            }
            buf.put_slice(&options);
        }

        buf.to_vec()
    }
}

/// Decodes a downlink frame into its header and the remaining payload bytes.
pub fn decode_downlink(input: &[u8]) -> Result<(DownlinkFrameHeader, &[u8]), NetworkServerError> {
    let raw = split_frame(input)?;
    let mac_commands =
        parse_frame_options(raw.frame_options, "downlink", DownlinkMacCommand::decode_one)?;

    let header = DownlinkFrameHeader {
        dev_addr: raw.dev_addr,
        flags: DownlinkFlags::from_bits_truncate(raw.frame_control),
        frame_counter: raw.frame_counter,
        frame_port: raw.frame_port,
        mac_commands,
    };

    Ok((header, raw.payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_only_frame() {
        let header = DownlinkFrameHeader::new(DevAddr(0x1234_5678), DownlinkFlags::ACK, 0);
        let bytes = header.encode();
        assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12, 0x20, 0x00, 0x00]);

        let (decoded, payload) = decode_downlink(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_link_adr_req_forces_port_zero() {
        let mut header = DownlinkFrameHeader::new(DevAddr(1), DownlinkFlags::ADR, 3);
        header.add_link_adr_req(5, 7, 0x00FF, 0, 1).unwrap();

        let bytes = header.encode();
        assert_eq!(
            bytes,
            vec![0x01, 0x00, 0x00, 0x00, 0x85, 0x03, 0x00, 0x00, 0x03, 0x57, 0xFF, 0x00, 0x01]
        );
        assert_eq!(header.serialized_size(), 13);

        let (decoded, _) = decode_downlink(&bytes).unwrap();
        assert_eq!(decoded.frame_port, Some(0));
        assert_eq!(decoded.link_adr_req().map(|r| r.tx_power_index), Some(7));
    }

    #[test]
    fn test_rfu_bit_is_dropped() {
        let (header, _) = decode_downlink(&[0, 0, 0, 0, 0x70, 0, 0]).unwrap();
        assert_eq!(header.flags, DownlinkFlags::ACK | DownlinkFlags::FRAME_PENDING);
    }

    #[test]
    fn test_add_link_adr_req_limits() {
        let mut header = DownlinkFrameHeader::new(DevAddr(1), DownlinkFlags::empty(), 0);
        assert!(matches!(
            header.add_link_adr_req(0, 0, 0, 0, 9),
            Err(NetworkServerError::InvalidMacField { field: "nb_trans", .. })
        ));
        for _ in 0..3 {
            header.add_link_adr_req(1, 1, 0x0007, 0, 1).unwrap();
        }
        assert_eq!(
            header.add_link_adr_req(1, 1, 0x0007, 0, 1),
            Err(NetworkServerError::FOptsOverflow {
                current: 15,
                requested: 5
            })
        );
    }

    #[test]
    fn test_truncated_command_is_an_error() {
        // FOptsLen = 3 but LinkADRReq needs 5
        let bytes = [0, 0, 0, 0, 0x03, 0, 0, 0x00, 0x03, 0x50, 0xFF];
        assert!(matches!(
            decode_downlink(&bytes),
            Err(NetworkServerError::TruncatedMacCommand { cid: 0x03, .. })
        ));
    }
}
