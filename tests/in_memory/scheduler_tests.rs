//! Periodic sync task tests.

use crate::in_memory::helpers::{CoverageHarness, harness};
use fleetwatch::coverage::services::{SyncError, SyncPeriod, spawn_periodic_sync};
use rstest::rstest;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const PERIOD: Duration = Duration::from_millis(20);

fn period() -> SyncPeriod {
    SyncPeriod::new(PERIOD).expect("period should be non-zero")
}
const WAIT: Duration = Duration::from_secs(5);

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn task_syncs_until_shutdown(harness: CoverageHarness) {
    let endpoint_id = harness.add_docker_endpoint(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (errors_tx, mut errors_rx) = mpsc::channel(4);

    let handle = spawn_periodic_sync(harness.reconciler.clone(), period(), shutdown_rx, errors_tx);
    tokio::time::sleep(PERIOD * 5).await;
    shutdown_tx.send(true).expect("task should still listen");
    let metrics = timeout(WAIT, handle)
        .await
        .expect("task should stop")
        .expect("task should not panic");

    let snapshot = metrics.snapshot();
    assert!(snapshot.passes >= 2, "expected repeated passes, got {snapshot:?}");
    assert_eq!(snapshot.failures, 0);
    assert_eq!(snapshot.endpoints_added, 1);
    assert!(errors_rx.try_recv().is_err());
    assert!(harness.status_of(endpoint_id).await.is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_passes_are_reported_on_error_channel(harness: CoverageHarness) {
    harness
        .orchestrator
        .fail_inventory("control plane down")
        .expect("failure injection should succeed");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (errors_tx, mut errors_rx) = mpsc::channel(4);

    let handle = spawn_periodic_sync(harness.reconciler.clone(), period(), shutdown_rx, errors_tx);
    let reported = timeout(WAIT, errors_rx.recv())
        .await
        .expect("an error should be reported")
        .expect("channel should stay open");
    drop(shutdown_tx);
    let metrics = timeout(WAIT, handle)
        .await
        .expect("task should stop when the shutdown sender drops")
        .expect("task should not panic");

    assert!(matches!(reported, SyncError::Inventory(_)));
    assert!(metrics.snapshot().failures >= 1);
}
