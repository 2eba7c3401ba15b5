//! # lorawan-ns - LoRaWAN Network Server Control Plane
//!
//! The lorawan-ns crate implements the decision-making core of a LoRaWAN network
//! server for Class A end devices. It is driven by a simulation or test harness that
//! owns the radio side: the harness delivers uplink frames received by gateways and
//! offers a way to transmit downlinks, the crate does everything in between.
//!
//! ## Features
//!
//! - Bit-exact encoding and decoding of the LoRaWAN frame header and FOpts MAC commands
//! - Per-device sessions with multi-gateway deduplication and retransmission detection
//! - RX1 / RX2 receive-window scheduling on a simulated clock
//! - Downstream queues with confirmed-downlink retries and ACK handling
//! - Network-side Adaptive Data Rate with LinkADRReq piggy-backing
//! - Optional generated downlink traffic and a JSON statistics report
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```rust
//! use lorawan_ns::{
//!     DevAddr, GatewayId, MessageKind, NetworkServer, RecordingGateways, ServerConfig,
//!     UplinkDelivery, UplinkFlags, UplinkFrameHeader,
//! };
//! use std::time::Duration;
//!
//! let mut server = NetworkServer::new(ServerConfig::default());
//! let mut gateways = RecordingGateways::new();
//! server.register_devices([DevAddr(0x2601_1BDA)]);
//!
//! let frame = UplinkFrameHeader::new(DevAddr(0x2601_1BDA), UplinkFlags::ADR, 0).encode();
//! server
//!     .on_uplink_frame(
//!         &mut gateways,
//!         UplinkDelivery {
//!             gateway: GatewayId(7),
//!             bytes: frame,
//!             channel_index: 1,
//!             data_rate_index: 0,
//!             code_rate: 1,
//!             snr: -3.0,
//!             message_kind: MessageKind::Unconfirmed,
//!             timestamp: Duration::from_secs(12),
//!         },
//!     )
//!     .unwrap();
//! server.run_until(&mut gateways, Duration::from_secs(20));
//!
//! println!("{}", server.report().to_json().unwrap());
//! ```

pub mod adr;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod instrumentation;
pub mod logging;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod util;

pub use crate::error::NetworkServerError;
pub use crate::logging::{init_logger, log_info};

pub use adr::{AdrConfig, AdrEngine, AdrResult, SnrTable};
pub use config::{InterArrival, InterArrivalSampler, ServerConfig};
pub use frame::{
    decode_downlink, decode_uplink, DevAddr, DownlinkFlags, DownlinkFrameHeader, UplinkFlags,
    UplinkFrameHeader,
};
pub use gateway::{GatewayDispatch, GatewayId, RecordingGateways, TxParams};
pub use instrumentation::{ServerNotification, ServerReport};
pub use queue::{DownstreamQueueManager, MessageKind};
pub use scheduler::{EventScheduler, ReceiveWindow};
pub use server::{NetworkServer, UplinkDelivery};
pub use session::{Classification, DeviceSession, SessionStore};
