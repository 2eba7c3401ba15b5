//! Uplink frame header (end device → network server).

use super::mac_command::UplinkMacCommand;
use super::{parse_frame_options, split_frame, DevAddr};
use crate::constants::{
    LORAWAN_FHDR_FOPTSLEN_MASK, LORAWAN_FHDR_FOPTSLEN_MAX_SIZE, LORAWAN_FHDR_MIN_SIZE,
};
use crate::error::NetworkServerError;
use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

bitflags! {
    /// Uplink FCtrl bits (FOptsLen is derived from the MAC commands).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UplinkFlags: u8 {
        const ADR = 0x80;
        const ADR_ACK_REQ = 0x40;
        const ACK = 0x20;
        const CLASS_B = 0x10;
    }
}

/// Decoded uplink frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkFrameHeader {
    pub dev_addr: DevAddr,
    pub flags: UplinkFlags,
    pub frame_counter: u16,
    pub frame_port: Option<u8>,
    mac_commands: Vec<UplinkMacCommand>,
}

impl UplinkFrameHeader {
    pub fn new(dev_addr: DevAddr, flags: UplinkFlags, frame_counter: u16) -> Self {
        Self {
            dev_addr,
            flags,
            frame_counter,
            frame_port: None,
            mac_commands: Vec::new(),
        }
    }

    pub fn mac_commands(&self) -> &[UplinkMacCommand] {
        &self.mac_commands
    }

    pub fn is_ack(&self) -> bool {
        self.flags.contains(UplinkFlags::ACK)
    }

    pub fn is_adr_ack_req(&self) -> bool {
        self.flags.contains(UplinkFlags::ADR_ACK_REQ)
    }

    /// FOptsLen as written into FCtrl.
    pub fn frame_options_length(&self) -> u8 {
        self.mac_commands.iter().map(|c| c.size()).sum()
    }

    /// 7 bytes + FPort (if any) + FOpts.
    pub fn serialized_size(&self) -> usize {
        let port = usize::from(self.writes_frame_port());
        LORAWAN_FHDR_MIN_SIZE + port + self.frame_options_length() as usize
    }

    fn writes_frame_port(&self) -> bool {
        self.frame_port.is_some() || !self.mac_commands.is_empty()
    }

    /// Appends a LinkADRAns. Fails when FOpts would exceed 15 bytes.
    pub fn add_link_adr_ans(
        &mut self,
        power_ack: bool,
        data_rate_ack: bool,
        channel_mask_ack: bool,
    ) -> Result<(), NetworkServerError> {
        let command = UplinkMacCommand::LinkAdrAns {
            power_ack,
            data_rate_ack,
            channel_mask_ack,
        };
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

    /// Serializes the header; the application payload is appended by the caller.
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

/// Decodes an uplink frame into its header and the remaining payload bytes.
pub fn decode_uplink(input: &[u8]) -> Result<(UplinkFrameHeader, &[u8]), NetworkServerError> {
    let raw = split_frame(input)?;
    let mac_commands =
        parse_frame_options(raw.frame_options, "uplink", UplinkMacCommand::decode_one)?;

    let header = UplinkFrameHeader {
        dev_addr: raw.dev_addr,
        flags: UplinkFlags::from_bits_truncate(raw.frame_control),
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
    fn test_encode_minimal_header() {
        let header = UplinkFrameHeader::new(DevAddr(0x0000_0001), UplinkFlags::ACK, 0x0102);
        assert_eq!(header.encode(), vec![0x01, 0x00, 0x00, 0x00, 0x20, 0x02, 0x01]);
        assert_eq!(header.serialized_size(), 7);
    }

    #[test]
    fn test_encode_with_link_adr_ans() {
        let mut header = UplinkFrameHeader::new(
            DevAddr(0xAABB_CCDD),
            UplinkFlags::ADR | UplinkFlags::ADR_ACK_REQ,
            1,
        );
        header.frame_port = Some(2);
        header.add_link_adr_ans(true, true, false).unwrap();

        let bytes = header.encode();
        assert_eq!(
            bytes,
            vec![0xDD, 0xCC, 0xBB, 0xAA, 0xC2, 0x01, 0x00, 0x02, 0x03, 0x06]
        );
        assert_eq!(bytes.len(), header.serialized_size());
    }

    #[test]
    fn test_fopts_overflow() {
        let mut header = UplinkFrameHeader::new(DevAddr(1), UplinkFlags::empty(), 1);
        for _ in 0..7 {
            header.add_link_adr_ans(true, true, true).unwrap();
        }
        assert_eq!(header.frame_options_length(), 14);
        assert_eq!(
            header.add_link_adr_ans(true, true, true),
            Err(NetworkServerError::FOptsOverflow {
                current: 14,
                requested: 2
            })
        );
    }

    #[test]
    fn test_decode_class_b_and_payload() {
        let bytes = [0x10, 0x00, 0x00, 0x00, 0x10, 0x09, 0x00, 0x05, 0xDE, 0xAD];
        let (header, payload) = decode_uplink(&bytes).unwrap();
        assert!(header.flags.contains(UplinkFlags::CLASS_B));
        assert_eq!(header.frame_counter, 9);
        assert_eq!(header.frame_port, Some(5));
        assert_eq!(payload, &[0xDE, 0xAD]);
    }

    #[test]
    fn test_unrecognized_command_is_not_fatal() {
        // FOptsLen = 3: DevStatusAns (not modeled) + 2 bytes, then a payload byte
        let bytes = [0x01, 0, 0, 0, 0x03, 0x01, 0x00, 0x01, 0x06, 0xFF, 0x10, 0x42];
        let (header, payload) = decode_uplink(&bytes).unwrap();
        assert!(header.mac_commands().is_empty());
        assert_eq!(payload, &[0x42]);
    }
}
