//! # LoRaWAN Frame Header Codec
//!
//! This module encodes and decodes the LoRaWAN frame header (FHDR) together with the
//! optional frame port and the MAC commands piggy-backed in the FOpts field. The uplink
//! and downlink layouts share the address/counter fields and differ in the meaning of
//! two FCtrl bits, so each direction has its own header type:
//!
//! ```text
//!  DevAddr (4, LE) | FCtrl (1) | FCnt (2, LE) | [FPort (1) | FOpts (FOptsLen)] | payload
//!
//!  FCtrl uplink:   ADR | ADRACKReq | ACK | ClassB   | FOptsLen[3:0]
//!  FCtrl downlink: ADR | RFU       | ACK | FPending | FOptsLen[3:0]
//! ```
//!
//! The FPort is present iff bytes follow the 7 mandatory header bytes. MAC commands
//! are only carried when a frame port is present.
//!
//! ## Usage
//!
//! ```rust
//! use lorawan_ns::frame::{decode_uplink, DevAddr, UplinkFlags, UplinkFrameHeader};
//!
//! let mut header = UplinkFrameHeader::new(DevAddr(0x0102_0304), UplinkFlags::ADR, 7);
//! header.frame_port = Some(1);
//! header.add_link_adr_ans(true, true, true).unwrap();
//!
//! let bytes = header.encode();
//! let (decoded, payload) = decode_uplink(&bytes).unwrap();
//! assert_eq!(decoded, header);
//! assert!(payload.is_empty());
//! ```

pub mod downlink;
pub mod mac_command;
pub mod uplink;

pub use downlink::{decode_downlink, DownlinkFlags, DownlinkFrameHeader};
pub use mac_command::{
    downlink_command_size, uplink_command_size, DownlinkMacCommand, LinkAdrReq,
    UplinkMacCommand,
};
pub use uplink::{decode_uplink, UplinkFlags, UplinkFrameHeader};

use crate::constants::{LORAWAN_FHDR_FOPTSLEN_MASK, LORAWAN_FHDR_MIN_SIZE};
use crate::error::NetworkServerError;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::sequence::tuple;
use nom::IResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short device address assigned by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevAddr(pub u32);

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for DevAddr {
    fn from(value: u32) -> Self {
        DevAddr(value)
    }
}

/// Header fields common to both directions, before MAC command interpretation.
#[derive(Debug, PartialEq)]
pub(crate) struct RawFrameHeader<'a> {
    pub dev_addr: DevAddr,
    pub frame_control: u8,
    pub frame_counter: u16,
    pub frame_port: Option<u8>,
    pub frame_options: &'a [u8],
    pub payload: &'a [u8],
}

/// Parses DevAddr, FCtrl and FCnt.
fn parse_fixed_header(input: &[u8]) -> IResult<&[u8], (u32, u8, u16)> {
    tuple((le_u32, le_u8, le_u16))(input)
}

/// Splits a frame into its raw header fields, FOpts bytes and payload.
pub(crate) fn split_frame(input: &[u8]) -> Result<RawFrameHeader<'_>, NetworkServerError> {
    if input.len() < LORAWAN_FHDR_MIN_SIZE {
        return Err(NetworkServerError::FrameTooShort {
            expected: LORAWAN_FHDR_MIN_SIZE,
            actual: input.len(),
        });
    }

    let (rest, (dev_addr, frame_control, frame_counter)) = parse_fixed_header(input)?;

    if rest.is_empty() {
        return Ok(RawFrameHeader {
            dev_addr: DevAddr(dev_addr),
            frame_control,
            frame_counter,
            frame_port: None,
            frame_options: &[],
            payload: &[],
        });
    }

    let (rest, frame_port) = le_u8::<_, nom::error::Error<&[u8]>>(rest)?;
    let fopts_len = (frame_control & LORAWAN_FHDR_FOPTSLEN_MASK) as usize;
    if rest.len() < fopts_len {
        return Err(NetworkServerError::FrameTooShort {
            expected: input.len() - rest.len() + fopts_len,
            actual: input.len(),
        });
    }
    let (frame_options, payload) = rest.split_at(fopts_len);

    Ok(RawFrameHeader {
        dev_addr: DevAddr(dev_addr),
        frame_control,
        frame_counter,
        frame_port: Some(frame_port),
        frame_options,
        payload,
    })
}

/// Outcome of walking the FOpts bytes of one frame.
#[derive(Debug, PartialEq)]
pub(crate) enum OptionStep<C> {
    Command(C, usize),
    Unrecognized(u8),
}

/// Walks FOpts, decoding commands with `decode_one` until the options are exhausted
/// or an unrecognized command id stops the walk.
pub(crate) fn parse_frame_options<C>(
    mut options: &[u8],
    direction: &str,
    decode_one: impl Fn(&[u8]) -> Result<OptionStep<C>, NetworkServerError>,
) -> Result<Vec<C>, NetworkServerError> {
    let mut commands = Vec::new();

    while !options.is_empty() {
        match decode_one(options)? {
            OptionStep::Command(command, consumed) => {
                commands.push(command);
                options = &options[consumed..];
            }
            OptionStep::Unrecognized(cid) => {
                log::warn!(
                    "Unrecognized {direction} MAC command 0x{cid:02X}, skipping remaining {} option bytes",
                    options.len()
                );
                break;
            }
        }
    }

    Ok(commands)
}
