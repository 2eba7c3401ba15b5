//! # Network Server
//!
//! [`NetworkServer`] ties the pieces together. The harness delivers every uplink
//! copy through [`NetworkServer::on_uplink_frame`] in timestamp order; the server
//! first runs every scheduled event due before that uplink, then classifies the
//! frame and arms the Class A receive windows. Window timers and downlink traffic
//! timers fire from [`NetworkServer::run_until`] or [`NetworkServer::step`].
//!
//! ```rust
//! use lorawan_ns::frame::{DevAddr, UplinkFlags, UplinkFrameHeader};
//! use lorawan_ns::gateway::{GatewayId, RecordingGateways};
//! use lorawan_ns::queue::MessageKind;
//! use lorawan_ns::server::{NetworkServer, UplinkDelivery};
//! use lorawan_ns::ServerConfig;
//! use std::time::Duration;
//!
//! let mut server = NetworkServer::new(ServerConfig::default());
//! let mut gateways = RecordingGateways::new();
//!
//! let frame = UplinkFrameHeader::new(DevAddr(1), UplinkFlags::empty(), 1).encode();
//! server
//!     .on_uplink_frame(
//!         &mut gateways,
//!         UplinkDelivery {
//!             gateway: GatewayId(1),
//!             bytes: frame,
//!             channel_index: 0,
//!             data_rate_index: 5,
//!             code_rate: 1,
//!             snr: 4.0,
//!             message_kind: MessageKind::Confirmed,
//!             timestamp: Duration::ZERO,
//!         },
//!     )
//!     .unwrap();
//!
//! // The confirmed uplink is acknowledged in RW1
//! server.run_until(&mut gateways, Duration::from_secs(5));
//! assert_eq!(gateways.sent().len(), 1);
//! assert_eq!(server.report().network.rw1_sent, 1);
//! ```

use crate::adr::AdrResult;
use crate::config::{InterArrivalSampler, ServerConfig};
use crate::constants::DOWNLINK_TRAFFIC_FRAME_PORT;
use crate::error::NetworkServerError;
use crate::frame::{decode_uplink, DevAddr, UplinkMacCommand};
use crate::gateway::{GatewayDispatch, GatewayId, TxParams};
use crate::instrumentation::{DeviceReport, NetworkCounters, ServerNotification, ServerReport};
use crate::logging::log_error;
use crate::queue::{DownstreamQueueManager, MessageKind};
use crate::scheduler::{EventKind, EventScheduler, ReceiveWindow, ScheduledEvent, WindowTimer};
use crate::session::{Classification, DeviceSession, SessionStore};
use crate::util::logging::{log_frame_hex, span_event_dispatch, ThrottleManager};
use crate::log_warn_throttled;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

const REARM_LOG_CATEGORY: &str = "window_rearm";
const DECODE_LOG_CATEGORY: &str = "undecodable_uplink";

/// One copy of an uplink frame as relayed by a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkDelivery {
    pub gateway: GatewayId,
    pub bytes: Vec<u8>,
    pub channel_index: u8,
    pub data_rate_index: u8,
    pub code_rate: u8,
    pub snr: f64,
    pub message_kind: MessageKind,
    /// Reception time in simulated time
    pub timestamp: Duration,
}

/// What happened when a receive window opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowOutcome {
    Sent,
    /// Something was pending but no gateway could transmit
    Missed,
    /// Nothing to send
    Idle,
}

pub struct NetworkServer {
    config: ServerConfig,
    sessions: SessionStore,
    scheduler: EventScheduler,
    queues: DownstreamQueueManager,
    rng: StdRng,
    network: NetworkCounters,
    notifications: Vec<ServerNotification>,
    /// Inter-arrival sampler, present while traffic generation is enabled
    traffic: Option<InterArrivalSampler>,
    traffic_sequence: u64,
    throttles: ThrottleManager,
}

impl NetworkServer {
    /// Creates a server. Configuration errors are logged and disable the
    /// feature they affect.
    pub fn new(config: ServerConfig) -> Self {
        for err in config.validate() {
            log_error(&format!("Network server configuration: {err}"));
        }

        let traffic = if config.traffic_generation_enabled() {
            config.downlink_inter_arrival.sampler().ok()
        } else {
            None
        };
        if config.generate_downlink_traffic && traffic.is_none() {
            log_error("Downlink traffic generation disabled by configuration errors");
        }

        Self {
            sessions: SessionStore::new(&config),
            scheduler: EventScheduler::new(),
            queues: DownstreamQueueManager::new(config.confirmed_transmissions, config.adr.clone()),
            rng: StdRng::seed_from_u64(config.rng_seed),
            network: NetworkCounters::default(),
            notifications: Vec::new(),
            traffic,
            traffic_sequence: 0,
            throttles: ThrottleManager::new(Duration::from_secs(60), 10),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn session(&self, dev_addr: DevAddr) -> Option<&DeviceSession> {
        self.sessions.get(dev_addr)
    }

    pub fn network_counters(&self) -> &NetworkCounters {
        &self.network
    }

    /// Whether downlink traffic generation is running.
    pub fn traffic_generation_enabled(&self) -> bool {
        self.traffic.is_some()
    }

    /// Drains the notifications emitted since the last call.
    pub fn take_notifications(&mut self) -> Vec<ServerNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Creates sessions for devices known in advance and starts their downlink
    /// traffic timers.
    pub fn register_devices<I>(&mut self, devices: I)
    where
        I: IntoIterator<Item = DevAddr>,
    {
        for dev_addr in devices {
            if self.sessions.register(dev_addr) {
                debug!("Registered device {dev_addr}");
                self.start_downlink_traffic(dev_addr);
            }
        }
    }

    /// Queues an application downlink for a known device.
    pub fn enqueue_downlink(
        &mut self,
        dev_addr: DevAddr,
        payload: Vec<u8>,
        kind: MessageKind,
        frame_port: u8,
    ) -> Result<(), NetworkServerError> {
        let session = self
            .sessions
            .get_mut(dev_addr)
            .ok_or(NetworkServerError::UnknownDevice(dev_addr))?;
        self.queues.enqueue(session, payload, kind, frame_port);
        Ok(())
    }

    /// Runs ADR for a device right away, outside the uplink-driven cadence.
    pub fn run_adr(&mut self, dev_addr: DevAddr) -> AdrResult {
        self.queues.adr().run(&mut self.sessions, dev_addr)
    }

    /// Ingests one uplink copy.
    ///
    /// Decode errors are returned (and counted); the server state is untouched by
    /// an undecodable frame apart from the clock.
    pub fn on_uplink_frame<G: GatewayDispatch>(
        &mut self,
        gateways: &mut G,
        delivery: UplinkDelivery,
    ) -> Result<Classification, NetworkServerError> {
        self.run_until(gateways, delivery.timestamp);
        let now = self.scheduler.now();

        log_frame_hex("Uplink", &delivery.bytes);
        let (header, _payload) = match decode_uplink(&delivery.bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.network.decode_errors += 1;
                log_warn_throttled!(
                    self.throttles.category(DECODE_LOG_CATEGORY),
                    now,
                    "Dropping undecodable uplink from {}: {err}",
                    delivery.gateway
                );
                return Err(err);
            }
        };

        let dev_addr = header.dev_addr;
        let unseen = !self.sessions.contains(dev_addr);
        let classification = self.sessions.classify(
            dev_addr,
            header.frame_counter,
            delivery.gateway,
            delivery.snr,
            now,
        );
        if unseen {
            self.start_downlink_traffic(dev_addr);
        }

        if classification == Classification::Duplicate {
            debug!(
                "Duplicate of {dev_addr} FCnt {} via {}",
                header.frame_counter, delivery.gateway
            );
            return Ok(classification);
        }

        let session = self
            .sessions
            .get_mut(dev_addr)
            .ok_or(NetworkServerError::UnknownDevice(dev_addr))?;
        session.update_radio(
            delivery.channel_index,
            delivery.data_rate_index,
            delivery.code_rate,
        );

        let retransmission = classification == Classification::Retransmission;
        self.notifications.push(ServerNotification::UplinkReceived {
            at: now,
            dev_addr,
            frame_counter: header.frame_counter,
            gateway: delivery.gateway,
            retransmission,
        });

        let ack_was_pending = session.pending_ack;
        if delivery.message_kind == MessageKind::Confirmed {
            session.pending_ack = true;
        }
        if header.is_ack() {
            if retransmission {
                debug!("Ignoring ACK bit on retransmission from {dev_addr}");
            } else {
                session.counters.uplink_acks_received += 1;
                self.queues
                    .acknowledge(session, now, &mut self.notifications);
            }
        }
        if header.is_adr_ack_req() {
            debug!("Device {dev_addr} requested an ADR acknowledgment");
            session.pending_ack = true;
        }
        if !ack_was_pending && session.pending_ack {
            session.counters.forced_downlinks += 1;
        }

        for command in header.mac_commands() {
            match command {
                UplinkMacCommand::LinkAdrAns { .. } if !command.is_fully_acked() => {
                    warn!("Device {dev_addr} rejected LinkADRReq: {command:?}");
                    session.counters.link_adr_rejections += 1;
                }
                UplinkMacCommand::LinkAdrAns { .. } => {
                    debug!("Device {dev_addr} accepted LinkADRReq");
                }
            }
        }

        self.arm_receive_windows(dev_addr, now);
        Ok(classification)
    }

    /// Dispatches every event due at or before `until`, then moves the clock there.
    pub fn run_until<G: GatewayDispatch>(&mut self, gateways: &mut G, until: Duration) {
        while let Some(event) = self.scheduler.pop_due(until) {
            self.dispatch(gateways, event);
        }
        self.scheduler.advance_to(until);
    }

    /// Dispatches the next scheduled event, whatever its time.
    pub fn step<G: GatewayDispatch>(&mut self, gateways: &mut G) -> Option<ScheduledEvent> {
        let event = self.scheduler.pop_due(Duration::MAX)?;
        self.dispatch(gateways, event);
        Some(event)
    }

    /// Firing time of the next scheduled event.
    pub fn next_event_time(&mut self) -> Option<Duration> {
        self.scheduler.next_event_time()
    }

    fn dispatch<G: GatewayDispatch>(&mut self, gateways: &mut G, event: ScheduledEvent) {
        let _span = span_event_dispatch(
            match event.kind {
                EventKind::ReceiveWindow1 => "rw1",
                EventKind::ReceiveWindow2 => "rw2",
                EventKind::DownlinkTraffic => "downlink_traffic",
            },
            event.dev_addr.0,
            event.time,
        );

        match event.kind {
            EventKind::ReceiveWindow1 => self.on_receive_window1(gateways, event),
            EventKind::ReceiveWindow2 => self.on_receive_window2(gateways, event),
            EventKind::DownlinkTraffic => self.on_downlink_traffic(event),
        }
    }

    fn arm_receive_windows(&mut self, dev_addr: DevAddr, uplink_at: Duration) {
        let Some(session) = self.sessions.get_mut(dev_addr) else {
            return;
        };

        if let Some(previous) = session.window_timer.take() {
            if self.scheduler.cancel(previous.timer())
                && self.throttles.allow(REARM_LOG_CATEGORY, uplink_at)
            {
                error!(
                    "Receive window of {dev_addr} re-armed while {previous:?} is pending, cancelling the earlier timer"
                );
            }
        }

        let timer = self.scheduler.schedule_at(
            dev_addr,
            uplink_at + self.config.receive_delay1,
            EventKind::ReceiveWindow1,
        );
        session.window_timer = Some(WindowTimer::AwaitingRw1 { timer, uplink_at });
    }

    fn on_receive_window1<G: GatewayDispatch>(&mut self, gateways: &mut G, event: ScheduledEvent) {
        let Some(session) = self.sessions.get_mut(event.dev_addr) else {
            return;
        };
        let uplink_at = match session.window_timer {
            Some(WindowTimer::AwaitingRw1 { timer, uplink_at }) if timer == event.id => uplink_at,
            _ => {
                debug!("Stale RW1 timer for {}", event.dev_addr);
                return;
            }
        };
        session.window_timer = None;

        match self.open_window(gateways, event.dev_addr, ReceiveWindow::Rw1, event.time) {
            WindowOutcome::Sent => self.network.rw1_sent += 1,
            outcome => {
                if outcome == WindowOutcome::Missed {
                    self.network.rw1_missed += 1;
                }
                let timer = self.scheduler.schedule_at(
                    event.dev_addr,
                    uplink_at + self.config.receive_delay2,
                    EventKind::ReceiveWindow2,
                );
                if let Some(session) = self.sessions.get_mut(event.dev_addr) {
                    session.window_timer = Some(WindowTimer::AwaitingRw2 { timer, uplink_at });
                }
            }
        }
    }

    fn on_receive_window2<G: GatewayDispatch>(&mut self, gateways: &mut G, event: ScheduledEvent) {
        let Some(session) = self.sessions.get_mut(event.dev_addr) else {
            return;
        };
        match session.window_timer {
            Some(WindowTimer::AwaitingRw2 { timer, .. }) if timer == event.id => {}
            _ => {
                debug!("Stale RW2 timer for {}", event.dev_addr);
                return;
            }
        }
        session.window_timer = None;

        match self.open_window(gateways, event.dev_addr, ReceiveWindow::Rw2, event.time) {
            WindowOutcome::Sent => self.network.rw2_sent += 1,
            WindowOutcome::Missed => self.network.rw2_missed += 1,
            WindowOutcome::Idle => {}
        }
    }

    /// Looks for a gateway of the reception set that can transmit now and sends
    /// the next downlink through it.
    fn open_window<G: GatewayDispatch>(
        &mut self,
        gateways: &mut G,
        dev_addr: DevAddr,
        window: ReceiveWindow,
        now: Duration,
    ) -> WindowOutcome {
        let Some(session) = self.sessions.get_mut(dev_addr) else {
            return WindowOutcome::Idle;
        };
        if !self.queues.has_pending(session) {
            return WindowOutcome::Idle;
        }

        let (query_channel, query_data_rate, params) = match window {
            ReceiveWindow::Rw1 => (
                session.last_channel_index,
                session.data_rate_index,
                TxParams {
                    channel_index: session.last_channel_index,
                    data_rate_index: session.rx1_data_rate_index(),
                    code_rate: session.last_code_rate,
                },
            ),
            ReceiveWindow::Rw2 => (
                self.config.rw2_channel_index,
                self.config.rw2_data_rate_index,
                TxParams {
                    channel_index: self.config.rw2_channel_index,
                    data_rate_index: self.config.rw2_data_rate_index,
                    code_rate: session.last_code_rate,
                },
            ),
        };

        let gateway = session
            .reception_set
            .iter()
            .copied()
            .find(|gateway| gateways.try_send_now(*gateway, query_channel, query_data_rate));
        let Some(gateway) = gateway else {
            info!("{window} of {dev_addr}: no gateway available");
            return WindowOutcome::Missed;
        };

        let Some(downlink) = self
            .queues
            .build_downlink(session, window, now, &mut self.notifications)
        else {
            return WindowOutcome::Idle;
        };

        log_frame_hex("Downlink", &downlink.frame);
        gateways.send(gateway, &downlink.frame, params);
        info!(
            "{window} of {dev_addr}: sent FCnt {} ({} bytes{}) via {gateway}",
            downlink.header.frame_counter,
            downlink.frame.len(),
            if downlink.ack_only { ", ACK only" } else { "" }
        );
        self.notifications.push(ServerNotification::DownlinkTransmitted {
            at: now,
            dev_addr,
            gateway,
            window,
            frame_counter: downlink.header.frame_counter,
            frame_len: downlink.frame.len(),
        });
        WindowOutcome::Sent
    }

    fn start_downlink_traffic(&mut self, dev_addr: DevAddr) {
        let Some(sampler) = self.traffic else {
            return;
        };
        match sampler.sample(&mut self.rng) {
            Some(delay) => {
                self.scheduler
                    .schedule(dev_addr, delay, EventKind::DownlinkTraffic);
            }
            None => error!("Inter-arrival delay out of range, downlink traffic stopped for {dev_addr}"),
        }
    }

    fn on_downlink_traffic(&mut self, event: ScheduledEvent) {
        if self.traffic.is_none() {
            return;
        }
        let Some(session) = self.sessions.get_mut(event.dev_addr) else {
            return;
        };

        let mut payload = vec![0u8; self.config.downlink_payload_size()];
        let sequence = self.traffic_sequence.to_le_bytes();
        if payload.len() >= sequence.len() {
            payload[..sequence.len()].copy_from_slice(&sequence);
        }
        self.traffic_sequence += 1;

        let kind = if self.config.confirmed_downlinks {
            MessageKind::Confirmed
        } else {
            MessageKind::Unconfirmed
        };
        let payload_len = payload.len();
        self.queues
            .enqueue(session, payload, kind, DOWNLINK_TRAFFIC_FRAME_PORT);
        self.notifications.push(ServerNotification::DownlinkGenerated {
            at: event.time,
            dev_addr: event.dev_addr,
            kind,
            payload_len,
        });

        self.start_downlink_traffic(event.dev_addr);
    }

    /// Snapshot of the statistics.
    pub fn report(&self) -> ServerReport {
        let devices = self
            .sessions
            .addresses()
            .into_iter()
            .filter_map(|dev_addr| self.sessions.get(dev_addr))
            .map(|session| DeviceReport {
                dev_addr: session.dev_addr,
                data_rate_index: session.data_rate_index,
                tx_power_index: session.tx_power_index,
                queued_downlinks: session.queue.len(),
                snr_max_db: session.snr_history.max_snr(),
                counters: session.counters,
            })
            .collect();

        ServerReport {
            at_seconds: self.scheduler.now().as_secs_f64(),
            network: self.network,
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{UplinkFlags, UplinkFrameHeader};
    use crate::gateway::RecordingGateways;

    const DEV: DevAddr = DevAddr(0x0000_0042);

    fn uplink(fcnt: u16, flags: UplinkFlags, kind: MessageKind, gw: u32, at_ms: u64) -> UplinkDelivery {
        UplinkDelivery {
            gateway: GatewayId(gw),
            bytes: UplinkFrameHeader::new(DEV, flags, fcnt).encode(),
            channel_index: 2,
            data_rate_index: 3,
            code_rate: 1,
            snr: 0.0,
            message_kind: kind,
            timestamp: Duration::from_millis(at_ms),
        }
    }

    #[test]
    fn test_unconfirmed_uplink_sends_nothing() {
        let mut server = NetworkServer::new(ServerConfig::default());
        let mut gateways = RecordingGateways::new();
        server
            .on_uplink_frame(&mut gateways, uplink(1, UplinkFlags::empty(), MessageKind::Unconfirmed, 1, 0))
            .unwrap();
        server.run_until(&mut gateways, Duration::from_secs(10));

        assert!(gateways.sent().is_empty());
        assert_eq!(gateways.queries(), 0);
        assert_eq!(*server.network_counters(), NetworkCounters::default());
    }

    #[test]
    fn test_rx1_parameters() {
        let config = ServerConfig {
            rx1_data_rate_offset: 2,
            ..ServerConfig::default()
        };
        let mut server = NetworkServer::new(config);
        let mut gateways = RecordingGateways::new();
        server
            .on_uplink_frame(&mut gateways, uplink(1, UplinkFlags::empty(), MessageKind::Confirmed, 1, 0))
            .unwrap();
        server.run_until(&mut gateways, Duration::from_secs(1));

        let sent = gateways.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].params,
            TxParams {
                channel_index: 2,
                data_rate_index: 1,
                code_rate: 1
            }
        );
    }

    #[test]
    fn test_undecodable_uplink_is_counted() {
        let mut server = NetworkServer::new(ServerConfig::default());
        let mut gateways = RecordingGateways::new();
        let mut delivery = uplink(1, UplinkFlags::empty(), MessageKind::Unconfirmed, 1, 0);
        delivery.bytes.truncate(4);

        assert!(matches!(
            server.on_uplink_frame(&mut gateways, delivery),
            Err(NetworkServerError::FrameTooShort { .. })
        ));
        assert_eq!(server.network_counters().decode_errors, 1);
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn test_decode_warnings_are_throttled() {
        let mut server = NetworkServer::new(ServerConfig::default());
        let mut gateways = RecordingGateways::new();
        for at in 0..12u64 {
            let mut delivery = uplink(1, UplinkFlags::empty(), MessageKind::Unconfirmed, 1, at);
            delivery.bytes.truncate(3);
            assert!(server.on_uplink_frame(&mut gateways, delivery).is_err());
        }
        assert_eq!(server.network_counters().decode_errors, 12);
        assert_eq!(server.throttles.suppressed(DECODE_LOG_CATEGORY), 2);
    }

    #[test]
    fn test_enqueue_for_unknown_device() {
        let mut server = NetworkServer::new(ServerConfig::default());
        assert_eq!(
            server.enqueue_downlink(DEV, vec![1], MessageKind::Unconfirmed, 1),
            Err(NetworkServerError::UnknownDevice(DEV))
        );
        server.register_devices([DEV]);
        assert!(server
            .enqueue_downlink(DEV, vec![1], MessageKind::Unconfirmed, 1)
            .is_ok());
    }

    #[test]
    fn test_link_adr_ans_rejection_is_counted() {
        let mut server = NetworkServer::new(ServerConfig::default());
        let mut gateways = RecordingGateways::new();
        let mut header = UplinkFrameHeader::new(DEV, UplinkFlags::empty(), 1);
        header.add_link_adr_ans(true, false, true).unwrap();
        let mut delivery = uplink(1, UplinkFlags::empty(), MessageKind::Unconfirmed, 1, 0);
        delivery.bytes = header.encode();

        server.on_uplink_frame(&mut gateways, delivery).unwrap();
        assert_eq!(server.session(DEV).unwrap().counters.link_adr_rejections, 1);
    }
}
