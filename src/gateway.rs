//! Gateway side of the network server.
//!
//! The server never owns gateways. The embedding harness passes an implementation
//! of [`GatewayDispatch`] into every call that may transmit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a gateway relaying frames to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GatewayId(pub u32);

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gw-{}", self.0)
    }
}

/// Radio parameters a gateway must use for one downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    pub channel_index: u8,
    pub data_rate_index: u8,
    pub code_rate: u8,
}

/// Downlink side of the gateway interface.
pub trait GatewayDispatch {
    /// Can `gateway` transmit immediately on `channel_index` at `data_rate_index`?
    fn try_send_now(&mut self, gateway: GatewayId, channel_index: u8, data_rate_index: u8) -> bool;

    /// Transmit `frame` through `gateway` now.
    fn send(&mut self, gateway: GatewayId, frame: &[u8], params: TxParams);
}

/// A frame handed to a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub gateway: GatewayId,
    pub frame: Vec<u8>,
    pub params: TxParams,
}

/// In-memory [`GatewayDispatch`] that records every transmission.
///
/// Gateways are available unless marked busy. Availability can be restricted
/// to a set of channels to model duty-cycle limits on a sub-band.
#[derive(Debug, Default)]
pub struct RecordingGateways {
    busy: HashMap<GatewayId, bool>,
    allowed_channels: HashMap<GatewayId, Vec<u8>>,
    sent: Vec<SentFrame>,
    queries: usize,
}

impl RecordingGateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_busy(&mut self, gateway: GatewayId, busy: bool) {
        self.busy.insert(gateway, busy);
    }

    /// Restricts `gateway` to transmitting on `channels` only.
    pub fn restrict_channels(&mut self, gateway: GatewayId, channels: &[u8]) {
        self.allowed_channels.insert(gateway, channels.to_vec());
    }

    pub fn sent(&self) -> &[SentFrame] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<SentFrame> {
        std::mem::take(&mut self.sent)
    }

    /// Number of `try_send_now` calls seen so far.
    pub fn queries(&self) -> usize {
        self.queries
    }
}

impl GatewayDispatch for RecordingGateways {
    fn try_send_now(&mut self, gateway: GatewayId, channel_index: u8, _data_rate_index: u8) -> bool {
        self.queries += 1;
        if self.busy.get(&gateway).copied().unwrap_or(false) {
            return false;
        }
        self.allowed_channels
            .get(&gateway)
            .map_or(true, |channels| channels.contains(&channel_index))
    }

    fn send(&mut self, gateway: GatewayId, frame: &[u8], params: TxParams) {
        self.sent.push(SentFrame {
            gateway,
            frame: frame.to_vec(),
            params,
        });
    }
}
