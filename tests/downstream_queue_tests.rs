//! Downstream queue behaviour through the server: confirmed retries, drops and
//! FPending.


use harness_support::{ms, unconfirmed, DEVICE};
use lorawan_ns::frame::decode_downlink;
use lorawan_ns::{
    DownlinkFlags, MessageKind, NetworkServer, RecordingGateways, ServerConfig,
    ServerNotification,
};

/// A confirmed downlink with a budget of N is sent N times without ACK, then
/// dropped with a notification on the Nth send.
#[test]
fn test_confirmed_downlink_dropped_after_budget() {
    let config = ServerConfig {
        confirmed_transmissions: 3,
        ..ServerConfig::default()
    };
    let mut server = NetworkServer::new(config);
    let mut gateways = RecordingGateways::new();
    server.register_devices([DEVICE]);
    server
        .enqueue_downlink(DEVICE, vec![1, 2, 3, 4], MessageKind::Confirmed, 5)
        .unwrap();

    let mut dropped_at = Vec::new();
    for fcnt in 1..=4u16 {
        let at = u64::from(fcnt) * 10_000;
        server.on_uplink_frame(&mut gateways, unconfirmed(fcnt, 1, ms(at))).unwrap();
        server.run_until(&mut gateways, ms(at + 5_000));
        for note in server.take_notifications() {
            if let ServerNotification::DownlinkDropped { at, frame_port, .. } = note {
                assert_eq!(frame_port, Some(5));
                dropped_at.push(at);
            }
        }
    }

    assert_eq!(gateways.sent().len(), 3);
    assert_eq!(dropped_at, vec![ms(31_000)]);

    let counters = server.session(DEVICE).unwrap().counters;
    assert_eq!(counters.downlink_sent, 3);
    assert_eq!(counters.downlink_retransmitted, 2);
    assert_eq!(counters.downlink_dropped, 1);
    assert_eq!(counters.downlink_acked, 0);

    let frame_counters: Vec<u16> = gateways
        .sent()
        .iter()
        .map(|sent| decode_downlink(&sent.frame).unwrap().0.frame_counter)
        .collect();
    assert_eq!(frame_counters, vec![0, 1, 2]);
}

#[test]
fn test_frame_pending_while_queue_has_more() {
    let mut server = NetworkServer::new(ServerConfig::default());
    let mut gateways = RecordingGateways::new();
    server.register_devices([DEVICE]);
    for byte in 0..3u8 {
        server
            .enqueue_downlink(DEVICE, vec![byte], MessageKind::Unconfirmed, 2)
            .unwrap();
    }

    for fcnt in 1..=3u16 {
        let at = u64::from(fcnt) * 10_000;
        server.on_uplink_frame(&mut gateways, unconfirmed(fcnt, 1, ms(at))).unwrap();
        server.run_until(&mut gateways, ms(at + 5_000));
    }

    let decoded: Vec<(bool, Vec<u8>)> = gateways
        .sent()
        .iter()
        .map(|sent| {
            let (header, payload) = decode_downlink(&sent.frame).unwrap();
            (header.flags.contains(DownlinkFlags::FRAME_PENDING), payload.to_vec())
        })
        .collect();
    assert_eq!(
        decoded,
        vec![(true, vec![0]), (true, vec![1]), (false, vec![2])]
    );
    assert!(server.session(DEVICE).unwrap().queue.is_empty());
}

/// A confirmed uplink with a queued payload gets both in one frame.
#[test]
fn test_ack_piggybacks_on_payload() {
    let mut server = NetworkServer::new(ServerConfig::default());
    let mut gateways = RecordingGateways::new();
    server.register_devices([DEVICE]);
    server
        .enqueue_downlink(DEVICE, vec![0x42], MessageKind::Unconfirmed, 9)
        .unwrap();

    server
        .on_uplink_frame(&mut gateways, harness_support::confirmed(1, 1, ms(0)))
        .unwrap();
    server.run_until(&mut gateways, ms(3_000));

    let sent = gateways.sent();
    assert_eq!(sent.len(), 1);
    let (header, payload) = decode_downlink(&sent[0].frame).unwrap();
    assert!(header.flags.contains(DownlinkFlags::ACK));
    assert_eq!(header.frame_port, Some(9));
    assert_eq!(payload, &[0x42]);

    let session = server.session(DEVICE).unwrap();
    assert!(!session.has_pending());
    assert_eq!(session.counters.downlink_acks_sent, 1);
}

/// An ACK with nothing outstanding is logged and otherwise ignored.
#[test]
fn test_spurious_ack() {
    let mut server = NetworkServer::new(ServerConfig::default());
    let mut gateways = RecordingGateways::new();

    let delivery = harness_support::uplink(
        DEVICE,
        1,
        lorawan_ns::UplinkFlags::ACK,
        MessageKind::Unconfirmed,
        1,
        ms(0),
    );
    server.on_uplink_frame(&mut gateways, delivery).unwrap();

    let session = server.session(DEVICE).unwrap();
    assert_eq!(session.counters.uplink_acks_received, 1);
    assert_eq!(session.counters.downlink_acked, 0);
}
