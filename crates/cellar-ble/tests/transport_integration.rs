//! Scanner and connection manager sharing one mock platform.

use cellar_ble::mock::{MockPlatform, Operation, StatusPayload, foreign_payload};
use cellar_ble::{
    ConnectionManager, NotFoundReason, ScanOutcome, ScanRecord, ScanRequest, Scanner,
};
use cellar_core::{DeviceId, StatusCode, TransportAddress};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn address(last: u8) -> TransportAddress {
    TransportAddress::new(format!("DE:AD:BE:EF:00:{last:02X}")).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_scan_stops_discovery() {
    let (platform, handle) = MockPlatform::new();
    let scanner = Scanner::new(Arc::new(platform));
    let request = ScanRequest::new(DeviceId::new(77).unwrap()).timeout(Duration::from_secs(10));

    let result = tokio::time::timeout(Duration::from_secs(1), scanner.scan(request)).await;

    assert!(result.is_err());
    assert!(!handle.discovery_active());
    assert_eq!(handle.call_count(Operation::StopDiscovery), 1);

    // The cancelled scan's adapter lease is returned on a spawned task.
    tokio::task::yield_now().await;
    assert_eq!(scanner.adapter().holders().await, 0);
    assert!(!handle.adapter_open());
}

#[tokio::test(start_paused = true)]
async fn test_scan_picks_target_among_neighbours() {
    let (platform, handle) = MockPlatform::new();
    handle.advertise(vec![
        vec![ScanRecord::new(address(1), -70, foreign_payload())],
        vec![
            ScanRecord::new(address(2), -60, StatusPayload::new(500).build()),
            ScanRecord::new(address(3), -45, StatusPayload::new(501).status(5).build()),
        ],
    ]);
    let scanner = Scanner::new(Arc::new(platform));

    let progress = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&progress);
    let outcome = scanner
        .scan(
            ScanRequest::new(DeviceId::new(501).unwrap())
                .on_progress(move |n| counter.store(n, Ordering::SeqCst)),
        )
        .await
        .unwrap();

    let hit = outcome.into_hit().unwrap();
    assert_eq!(hit.address, address(3));
    assert_eq!(hit.rssi, -45);
    assert_eq!(hit.status.status, StatusCode::FullCutoff);
    assert_eq!(progress.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_link_opened_for_scanned_device_and_lost() {
    let (platform, handle) = MockPlatform::new();
    let platform = Arc::new(platform);
    handle.advertise(vec![vec![ScanRecord::new(
        address(9),
        -50,
        StatusPayload::new(9).build(),
    )]]);

    let scanner = Scanner::new(Arc::clone(&platform));
    let connections = Arc::new(ConnectionManager::new(platform));
    let listener = connections.spawn_listener();

    let hit = scanner
        .scan(ScanRequest::new(DeviceId::new(9).unwrap()))
        .await
        .unwrap()
        .into_hit()
        .unwrap();
    connections.connect(&hit.address).await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    connections.on_disconnect(&hit.address, move |lost| {
        let _ = tx.send(lost.clone());
    });
    handle.drop_connection(&hit.address);

    assert_eq!(rx.await.unwrap(), address(9));
    assert!(connections.connected_addresses().is_empty());
    listener.abort();
}

#[tokio::test(start_paused = true)]
async fn test_callback_cap_ends_scan_early() {
    let (platform, handle) = MockPlatform::new();
    handle.advertise(
        (0..10)
            .map(|i| vec![ScanRecord::new(address(i), -80, foreign_payload())])
            .collect(),
    );
    let scanner = Scanner::new(Arc::new(platform));

    let started = tokio::time::Instant::now();
    let outcome = scanner
        .scan(
            ScanRequest::new(DeviceId::new(1).unwrap())
                .max_callbacks(4)
                .timeout(Duration::from_secs(8)),
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ScanOutcome::NotFound {
            reason: NotFoundReason::CallbackCap,
            callbacks: 4,
            last_seen: None,
        }
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}
