//! Heartbeat scheduling across several devices.

mod common;

use cellar_ble::mock::Operation;
use cellar_control::{CellarConfig, HeartbeatStatus};
use cellar_core::DeviceId;
use common::*;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::timeout;

const ONLINE_DEVICE: u32 = 1001;
const OFFLINE_DEVICE: u32 = 1002;

fn id(n: u32) -> DeviceId {
    DeviceId::new(n).unwrap()
}

async fn collect(
    rx: &mut UnboundedReceiver<(u32, HeartbeatStatus)>,
    per_device: usize,
) -> HashMap<u32, Vec<HeartbeatStatus>> {
    let mut seen: HashMap<u32, Vec<HeartbeatStatus>> = HashMap::new();
    while seen.values().filter(|v| v.len() >= per_device).count() < 2 {
        let (device, status) = timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("heartbeat tick timed out")
            .expect("heartbeat channel closed");
        seen.entry(device).or_default().push(status);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_are_independent_per_device() {
    let (stack, handle) = stack();
    handle.advertise(vec![vec![sighting(ONLINE_DEVICE, 0)]]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    for device in [ONLINE_DEVICE, OFFLINE_DEVICE] {
        let tx = tx.clone();
        stack.heartbeat().start(
            id(device),
            move |status| {
                let _ = tx.send((device, status));
            },
            Some(Duration::from_secs(1)),
        );
    }

    let seen = collect(&mut rx, 2).await;
    assert!(seen[&ONLINE_DEVICE].iter().all(|s| *s == HeartbeatStatus::Online));
    assert!(seen[&OFFLINE_DEVICE].iter().all(|s| *s == HeartbeatStatus::Offline));
    assert_eq!(
        stack.heartbeat().last_status(id(ONLINE_DEVICE)),
        Some(HeartbeatStatus::Online)
    );

    assert!(stack.heartbeat().stop(id(ONLINE_DEVICE)));
    while rx.try_recv().is_ok() {}

    for _ in 0..2 {
        let (device, status) = timeout(Duration::from_secs(120), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((device, status), (OFFLINE_DEVICE, HeartbeatStatus::Offline));
    }
    assert!(!stack.heartbeat().is_running(id(ONLINE_DEVICE)));
    assert!(stack.heartbeat().is_running(id(OFFLINE_DEVICE)));

    stack.heartbeat().stop_all();
    assert!(stack.heartbeat().running().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_uses_probe_over_open_link() {
    let (stack, handle) = stack();
    stack
        .connections()
        .connect_device(device(), &address())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    stack.heartbeat().start(
        device(),
        move |status| {
            let _ = tx.send(status);
        },
        Some(Duration::from_secs(30)),
    );

    assert_eq!(rx.recv().await, Some(HeartbeatStatus::Online));
    assert_eq!(handle.writes()[0].1.as_ref(), &[0xFF]);
    assert_eq!(handle.call_count(Operation::StartDiscovery), 0);
    stack.heartbeat().stop(device());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_survives_link_loss() {
    let (stack, handle) = stack();
    handle.advertise(vec![vec![sighting(DEVICE, 0)]]);
    stack
        .connections()
        .connect_device(device(), &address())
        .await
        .unwrap();

    handle.drop_connection(&address());
    tokio::task::yield_now().await;

    // The link is gone on the platform side; the scan fallback still finds
    // the device.
    assert_eq!(
        stack.heartbeat().check_now(device()).await,
        HeartbeatStatus::Online
    );
    assert!(!stack.connections().is_connected(&address()));
}

#[tokio::test(start_paused = true)]
async fn test_closed_control_link_is_not_reused() {
    let (stack, handle) = stack();
    handle.queue_session(vec![vec![sighting(DEVICE, 0)]]);
    handle.queue_session(vec![vec![sighting(DEVICE, 1)]]);

    assert!(stack.protocol().execute(device(), COMMAND).await.success());
    let frames = handle.writes().len();
    assert_eq!(stack.connections().device_address(device()), None);

    // Nothing advertises any more: the tick must scan, not write to the
    // address the control run used.
    assert_eq!(
        stack.heartbeat().check_now(device()).await,
        HeartbeatStatus::Offline
    );
    assert_eq!(handle.writes().len(), frames);
}

#[tokio::test(start_paused = true)]
async fn test_control_run_and_heartbeat_share_adapter() {
    let mut config = CellarConfig::default();
    config.protocol.verify = false;
    let (stack, handle) = stack_with(config);

    const WATCHED: u32 = 777;
    handle.queue_session(vec![vec![sighting(DEVICE, 0)]]);
    let mut watched = noise_batches(20);
    watched.push(vec![sighting(WATCHED, 0)]);
    handle.queue_session(watched);

    let (report, status) = tokio::join!(
        stack.protocol().execute(device(), COMMAND),
        stack.heartbeat().check_now(id(WATCHED)),
    );

    assert!(report.success(), "{}", report.message());
    assert_eq!(status, HeartbeatStatus::Online);
    assert_eq!(stack.scanner().adapter().holders().await, 0);
    assert!(!handle.adapter_open());
    assert_eq!(handle.call_count(Operation::OpenAdapter), 1);
    assert_eq!(handle.call_count(Operation::CloseAdapter), 1);

    // The adapter closed only after the heartbeat's session stopped.
    let calls = handle.calls();
    let close = calls
        .iter()
        .position(|op| *op == Operation::CloseAdapter)
        .unwrap();
    let last_stop = calls
        .iter()
        .rposition(|op| *op == Operation::StopDiscovery)
        .unwrap();
    assert!(last_stop < close);
}
