//! Per-device downstream queue and downlink assembly.
//!
//! Every device owns a FIFO of application payloads waiting for a receive window.
//! Confirmed payloads stay at the head until the device acknowledges them or their
//! transmission budget runs out; unconfirmed payloads leave the queue after one
//! transmission.

use crate::adr::{AdrConfig, AdrEngine};
use crate::frame::{DownlinkFlags, DownlinkFrameHeader};
use crate::instrumentation::ServerNotification;
use crate::log_error_throttled;
use crate::scheduler::ReceiveWindow;
use crate::session::DeviceSession;
use crate::util::logging::LogThrottle;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Confirmed,
    Unconfirmed,
}

/// One application payload waiting for a receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueElement {
    pub payload: Vec<u8>,
    pub kind: MessageKind,
    pub frame_port: u8,
    pub transmissions_remaining: u8,
    /// Set once the element has been sent at least once
    pub is_retransmission: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownstreamQueue {
    elements: VecDeque<QueueElement>,
}

impl DownstreamQueue {
    pub fn push(&mut self, element: QueueElement) {
        self.elements.push_back(element);
    }

    pub fn front(&self) -> Option<&QueueElement> {
        self.elements.front()
    }

    fn front_mut(&mut self) -> Option<&mut QueueElement> {
        self.elements.front_mut()
    }

    fn pop_front(&mut self) -> Option<QueueElement> {
        self.elements.pop_front()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueElement> {
        self.elements.iter()
    }
}

/// A downlink frame ready to be handed to a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    pub header: DownlinkFrameHeader,
    /// Encoded header followed by the payload
    pub frame: Vec<u8>,
    /// No queued payload, the frame only carries the ACK bit (and MAC commands)
    pub ack_only: bool,
}

#[derive(Debug)]
pub struct DownstreamQueueManager {
    confirmed_transmissions: u8,
    adr: AdrEngine,
    ack_throttle: LogThrottle,
}

impl DownstreamQueueManager {
    pub fn new(confirmed_transmissions: u8, adr: AdrConfig) -> Self {
        Self {
            confirmed_transmissions: confirmed_transmissions.max(1),
            adr: AdrEngine::new(adr),
            ack_throttle: LogThrottle::new(Duration::from_secs(60), 10),
        }
    }

    pub fn adr(&self) -> &AdrEngine {
        &self.adr
    }

    /// Queues a payload for the device.
    pub fn enqueue(
        &self,
        session: &mut DeviceSession,
        payload: Vec<u8>,
        kind: MessageKind,
        frame_port: u8,
    ) {
        let transmissions_remaining = match kind {
            MessageKind::Confirmed => self.confirmed_transmissions,
            MessageKind::Unconfirmed => 1,
        };
        debug!(
            "Queueing {kind:?} downlink of {} bytes on port {frame_port} for {}",
            payload.len(),
            session.dev_addr
        );
        session.queue.push(QueueElement {
            payload,
            kind,
            frame_port,
            transmissions_remaining,
            is_retransmission: false,
        });
        session.counters.downlink_generated += 1;
    }

    /// Whether the next receive window has anything to send.
    pub fn has_pending(&self, session: &DeviceSession) -> bool {
        session.has_pending()
    }

    /// Handles the ACK bit of an uplink: removes the confirmed head of the queue.
    ///
    /// Returns `false` (and logs) when there is no sent confirmed element to acknowledge.
    pub fn acknowledge(
        &mut self,
        session: &mut DeviceSession,
        now: Duration,
        notifications: &mut Vec<ServerNotification>,
    ) -> bool {
        let acknowledgeable = session
            .queue
            .front()
            .map_or(false, |head| head.kind == MessageKind::Confirmed && head.is_retransmission);

        if !acknowledgeable {
            log_error_throttled!(
                self.ack_throttle,
                now,
                "Device {} sent an ACK but no confirmed downlink is outstanding",
                session.dev_addr
            );
            return false;
        }

        session.queue.pop_front();
        session.counters.downlink_acked += 1;
        notifications.push(ServerNotification::DownlinkAcked {
            at: now,
            dev_addr: session.dev_addr,
        });
        true
    }

    /// Assembles the frame for the receive window that is about to be used.
    ///
    /// Picks the head of the queue, or an ACK-only frame when an acknowledgment is
    /// owed, and piggy-backs a LinkADRReq when ADR was requested and recommends a
    /// change. Updates the session as if the frame is sent.
    pub fn build_downlink(
        &mut self,
        session: &mut DeviceSession,
        window: ReceiveWindow,
        now: Duration,
        notifications: &mut Vec<ServerNotification>,
    ) -> Option<Downlink> {
        if session.queue.is_empty() && !session.pending_ack {
            return None;
        }

        let mut flags = DownlinkFlags::empty();
        if session.pending_ack {
            flags |= DownlinkFlags::ACK;
        }
        let frame_pending = session.queue.len() > 1;
        if frame_pending {
            flags |= DownlinkFlags::FRAME_PENDING;
        }

        let mut header =
            DownlinkFrameHeader::new(session.dev_addr, flags, session.downlink_frame_counter);
        let mut payload = Vec::new();
        let ack_only = session.queue.is_empty();

        if let Some(head) = session.queue.front_mut() {
            header.frame_port = Some(head.frame_port);
            payload = head.payload.clone();

            let remove = match head.kind {
                MessageKind::Confirmed => {
                    if head.is_retransmission {
                        session.counters.downlink_retransmitted += 1;
                    }
                    head.is_retransmission = true;
                    head.transmissions_remaining = head.transmissions_remaining.saturating_sub(1);
                    head.transmissions_remaining == 0
                }
                MessageKind::Unconfirmed => true,
            };

            if remove {
                let dropped_port = head.frame_port;
                let exhausted = head.kind == MessageKind::Confirmed;
                session.queue.pop_front();
                if exhausted {
                    warn!(
                        "Confirmed downlink for {} sent without ACK on its last attempt, dropping",
                        session.dev_addr
                    );
                    session.counters.downlink_dropped += 1;
                    notifications.push(ServerNotification::DownlinkDropped {
                        at: now,
                        dev_addr: session.dev_addr,
                        frame_port: Some(dropped_port),
                    });
                }
            }
        }

        if session.adr_requested {
            self.embed_link_adr_req(session, &mut header);
        }

        if header.flags.contains(DownlinkFlags::ACK) {
            session.counters.downlink_acks_sent += 1;
        }
        session.pending_ack = false;
        session.frame_pending = frame_pending;
        session.downlink_frame_counter = session.downlink_frame_counter.wrapping_add(1);
        session.counters.downlink_sent += 1;
        match window {
            ReceiveWindow::Rw1 => session.counters.downlink_sent_rw1 += 1,
            ReceiveWindow::Rw2 => session.counters.downlink_sent_rw2 += 1,
        }

        let mut frame = header.encode();
        frame.extend_from_slice(&payload);

        Some(Downlink {
            header,
            frame,
            ack_only,
        })
    }

    fn embed_link_adr_req(&self, session: &mut DeviceSession, header: &mut DownlinkFrameHeader) {
        session.adr_requested = false;

        let result = self.adr.run_for_session(session);
        if !result.changed {
            return;
        }

        match header.add_link_adr_req(
            result.data_rate_index,
            result.tx_power_index,
            result.channel_mask,
            result.ch_mask_ctrl,
            result.nb_trans,
        ) {
            Ok(()) => {
                header.flags |= DownlinkFlags::ADR;
                session.counters.adr_commands_sent += 1;
            }
            Err(err) => {
                warn!("Dropping LinkADRReq for {}: {err}", session.dev_addr);
                session.counters.adr_commands_dropped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode_downlink, DevAddr};

    fn session() -> DeviceSession {
        DeviceSession::new(DevAddr(0x0102_0304), 20, 10.0, 0)
    }

    fn manager() -> DownstreamQueueManager {
        DownstreamQueueManager::new(4, AdrConfig::default())
    }

    #[test]
    fn test_nothing_to_send() {
        let mut manager = manager();
        let mut session = session();
        let mut notes = Vec::new();
        assert!(manager
            .build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes)
            .is_none());
        assert_eq!(session.downlink_frame_counter, 0);
    }

    #[test]
    fn test_ack_only_frame() {
        let mut manager = manager();
        let mut session = session();
        session.pending_ack = true;
        let mut notes = Vec::new();

        let downlink = manager
            .build_downlink(&mut session, ReceiveWindow::Rw2, Duration::ZERO, &mut notes)
            .unwrap();
        assert!(downlink.ack_only);
        assert_eq!(downlink.frame, vec![0x04, 0x03, 0x02, 0x01, 0x20, 0x00, 0x00]);
        assert!(!session.pending_ack);
        assert_eq!(session.downlink_frame_counter, 1);
        assert_eq!(session.counters.downlink_acks_sent, 1);
        assert_eq!(session.counters.downlink_sent_rw2, 1);
    }

    #[test]
    fn test_unconfirmed_leaves_after_one_send_with_frame_pending() {
        let mut manager = manager();
        let mut session = session();
        let mut notes = Vec::new();
        manager.enqueue(&mut session, vec![0xAA], MessageKind::Unconfirmed, 1);
        manager.enqueue(&mut session, vec![0xBB], MessageKind::Unconfirmed, 2);

        let first = manager
            .build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes)
            .unwrap();
        assert!(first.header.flags.contains(DownlinkFlags::FRAME_PENDING));
        let (decoded, payload) = decode_downlink(&first.frame).unwrap();
        assert_eq!(decoded.frame_port, Some(1));
        assert_eq!(payload, &[0xAA]);

        let second = manager
            .build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes)
            .unwrap();
        assert!(!second.header.flags.contains(DownlinkFlags::FRAME_PENDING));
        assert_eq!(second.header.frame_counter, 1);
        assert!(session.queue.is_empty());
        assert!(notes.is_empty());
    }

    #[test]
    fn test_confirmed_dropped_after_budget() {
        let mut manager = DownstreamQueueManager::new(3, AdrConfig::default());
        let mut session = session();
        let mut notes = Vec::new();
        manager.enqueue(&mut session, vec![1, 2, 3], MessageKind::Confirmed, 1);

        for attempt in 1..=3 {
            assert!(manager
                .build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes)
                .is_some());
            assert_eq!(session.queue.is_empty(), attempt == 3);
        }
        assert_eq!(session.counters.downlink_retransmitted, 2);
        assert_eq!(session.counters.downlink_dropped, 1);
        assert!(matches!(
            notes.as_slice(),
            [ServerNotification::DownlinkDropped { frame_port: Some(1), .. }]
        ));
    }

    #[test]
    fn test_acknowledge_removes_sent_confirmed_head() {
        let mut manager = manager();
        let mut session = session();
        let mut notes = Vec::new();
        manager.enqueue(&mut session, vec![9], MessageKind::Confirmed, 1);

        // Not sent yet: nothing to acknowledge
        assert!(!manager.acknowledge(&mut session, Duration::ZERO, &mut notes));

        manager.build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes);
        assert!(manager.acknowledge(&mut session, Duration::from_secs(3), &mut notes));
        assert!(session.queue.is_empty());
        assert_eq!(session.counters.downlink_acked, 1);
        assert_eq!(
            notes,
            vec![ServerNotification::DownlinkAcked {
                at: Duration::from_secs(3),
                dev_addr: session.dev_addr
            }]
        );
    }

    #[test]
    fn test_adr_request_embeds_link_adr_req() {
        let mut manager = manager();
        let mut session = session();
        session.snr_history.push(1, 10.0);
        session.adr_requested = true;
        session.pending_ack = true;
        let mut notes = Vec::new();

        let downlink = manager
            .build_downlink(&mut session, ReceiveWindow::Rw1, Duration::ZERO, &mut notes)
            .unwrap();
        let (decoded, _) = decode_downlink(&downlink.frame).unwrap();
        let req = decoded.link_adr_req().unwrap();
        assert_eq!((req.data_rate_index, req.tx_power_index), (5, 3));
        assert_eq!(decoded.frame_port, Some(0));
        assert!(decoded.flags.contains(DownlinkFlags::ADR | DownlinkFlags::ACK));
        assert!(!session.adr_requested);
        assert_eq!(session.counters.adr_commands_sent, 1);
    }
}
