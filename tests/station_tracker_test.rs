mod common;

use std::sync::Arc;

use hex_literal::hex;
use tokio::sync::mpsc;

use common::{TestDatabase, ui_frame};
use tnc_tracker::broadcaster::{ChannelSink, EventBroadcaster};
use tnc_tracker::events::StateEvent;
use tnc_tracker::kiss_client::KissEvent;
use tnc_tracker::station_tracker::StationTracker;

struct Harness {
    _db: TestDatabase,
    tracker: Arc<StationTracker>,
    events: mpsc::Receiver<Arc<StateEvent>>,
}

fn harness() -> Harness {
    let db = TestDatabase::new().expect("Failed to create test database");
    let broadcaster = Arc::new(EventBroadcaster::new());
    let (sink, events) = ChannelSink::channel(64);
    broadcaster.subscribe(Arc::new(sink));
    let tracker = Arc::new(StationTracker::new(db.repository(), broadcaster));

    Harness {
        _db: db,
        tracker,
        events,
    }
}

fn drain(events: &mut mpsc::Receiver<Arc<StateEvent>>) -> Vec<Arc<StateEvent>> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_frame_produces_station_update_then_raw_packet() {
    let mut h = harness();

    let frame = ui_frame("N0CALL-9", &["WIDE1-1", "WIDE2-1"], b"!5144.50N/00009.00E-test");
    let (station, is_new) = h.tracker.ingest_ax25(&frame).await.unwrap().unwrap();
    assert!(is_new);
    assert_eq!(station.callsign, "N0CALL-9");

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 2);
    match events[0].as_ref() {
        StateEvent::StationUpdate { station, is_new } => {
            assert!(*is_new);
            assert_eq!(station.callsign, "N0CALL-9");
            assert_eq!(station.comment, "test");
        }
        other => panic!("expected station update, got {:?}", other),
    }
    match events[1].as_ref() {
        StateEvent::RawPacket(packet) => {
            assert_eq!(packet.source, "N0CALL-9");
            assert_eq!(packet.destination, "APRS");
            assert_eq!(packet.path, vec!["WIDE1-1", "WIDE2-1"]);
            assert_eq!(packet.raw_info, "!5144.50N/00009.00E-test");
        }
        other => panic!("expected raw packet, got {:?}", other),
    }
}

#[tokio::test]
async fn test_updates_are_published_in_decode_order() {
    let mut h = harness();

    for (call, info) in [("AAA", ">one"), ("BBB", ">two"), ("AAA", ">three")] {
        h.tracker
            .ingest_ax25(&ui_frame(call, &[], info.as_bytes()))
            .await
            .unwrap();
    }

    let updates: Vec<(String, bool, String)> = drain(&mut h.events)
        .iter()
        .filter_map(|event| match event.as_ref() {
            StateEvent::StationUpdate { station, is_new } => {
                Some((station.callsign.clone(), *is_new, station.comment.clone()))
            }
            _ => None,
        })
        .collect();

    assert_eq!(
        updates,
        vec![
            ("AAA".to_string(), true, "one".to_string()),
            ("BBB".to_string(), true, "two".to_string()),
            ("AAA".to_string(), false, "three".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_invalid_frames_are_dropped_without_state_change() {
    let mut h = harness();

    // Too short to hold two addresses
    assert!(h.tracker.ingest_ax25(&hex!("c0 00 01 02")).await.unwrap().is_none());

    // Connected-mode control byte
    let mut frame = ui_frame("N0CALL", &[], b">hello");
    frame[14] = 0x3f;
    assert!(h.tracker.ingest_ax25(&frame).await.unwrap().is_none());

    // Valid UI frame with an empty information field
    let empty = ui_frame("N0CALL", &[], b"");
    assert!(h.tracker.ingest_ax25(&empty).await.unwrap().is_none());

    assert!(drain(&mut h.events).is_empty());
    let stats = h.tracker.repository().get_stats().await.unwrap();
    assert_eq!(stats.total_stations, 0);
    assert_eq!(stats.total_packets, 0);
}

#[tokio::test]
async fn test_connection_events_publish_only_on_transition() {
    let mut h = harness();
    let peer = "127.0.0.1:8001".parse().unwrap();

    assert!(!h.tracker.is_kiss_connected());
    h.tracker
        .handle_kiss_event(KissEvent::Connected { peer })
        .await
        .unwrap();
    h.tracker
        .handle_kiss_event(KissEvent::Connected { peer })
        .await
        .unwrap();
    assert!(h.tracker.is_kiss_connected());

    h.tracker
        .handle_kiss_event(KissEvent::Disconnected)
        .await
        .unwrap();
    h.tracker
        .handle_kiss_event(KissEvent::Disconnected)
        .await
        .unwrap();
    assert!(!h.tracker.is_kiss_connected());

    let kinds: Vec<&str> = drain(&mut h.events).iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["kiss_connected", "kiss_disconnected"]);
}

#[tokio::test]
async fn test_run_consumes_frames_until_channel_closes() {
    let mut h = harness();
    let (tx, rx) = flume::unbounded();

    tx.send(KissEvent::Connected {
        peer: "127.0.0.1:8001".parse().unwrap(),
    })
    .unwrap();
    tx.send(KissEvent::Frame(ui_frame("N0CALL", &[], b">one")))
        .unwrap();
    tx.send(KissEvent::Frame(vec![0x00, 0x01])).unwrap();
    tx.send(KissEvent::Frame(ui_frame("N0CALL", &[], b">two")))
        .unwrap();
    drop(tx);

    h.tracker.run(rx).await;

    let kinds: Vec<&str> = drain(&mut h.events).iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "kiss_connected",
            "station_update",
            "aprs_packet",
            "station_update",
            "aprs_packet",
            "kiss_disconnected",
        ]
    );

    let station = h
        .tracker
        .repository()
        .get_by_callsign("N0CALL")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(station.packet_count, 2);
    assert_eq!(station.comment, "two");
}

#[tokio::test]
async fn test_publish_stats() {
    let mut h = harness();

    h.tracker
        .ingest_ax25(&ui_frame("N0CALL", &[], b"!5144.50N/00009.00E-"))
        .await
        .unwrap();
    drain(&mut h.events);

    let stats = h.tracker.publish_stats().await.unwrap();
    assert_eq!(stats.total_stations, 1);
    assert_eq!(stats.stations_with_position, 1);

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].as_ref(),
        &StateEvent::StatsUpdate { stats }
    );
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_ingest() {
    let db = TestDatabase::new().expect("Failed to create test database");
    let broadcaster = Arc::new(EventBroadcaster::new());

    let (closed_sink, closed_rx) = ChannelSink::channel(4);
    drop(closed_rx);
    broadcaster.subscribe(Arc::new(closed_sink));
    let (sink, mut events) = ChannelSink::channel(16);
    broadcaster.subscribe(Arc::new(sink));

    let tracker = StationTracker::new(db.repository(), Arc::clone(&broadcaster));
    tracker
        .ingest_ax25(&ui_frame("N0CALL", &[], b">hello"))
        .await
        .unwrap();

    assert_eq!(broadcaster.subscriber_count(), 1);
    assert_eq!(drain(&mut events).len(), 2);
}
