use std::time::Duration;

use mtls_lifecycle::RotationController;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::support::*;

const HOUR: Duration = Duration::from_secs(3600);

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_renews_certificate_past_threshold() {
    let harness =
        Harness::with(FakeCa::new().unwrap(), RecordingProvider::new(), fast_settings()).unwrap();
    harness.ca.set_backdate(20 * HOUR);
    harness.manager.refresh_keys().unwrap();
    let stale = harness.provider.certificate_snapshot();
    harness.ca.set_backdate(Duration::ZERO);

    let handle = RotationController::new(harness.manager.clone()).spawn();

    assert!(wait_for(|| harness.ca.calls() >= 2).await);
    // The renewed certificate is fresh, so further ticks are no-ops.
    sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    assert_eq!(harness.ca.calls(), 2);
    assert_eq!(harness.backoff.resets(), 1);
    assert_ne!(harness.provider.certificate_snapshot().serial, stale.serial);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_tick_waits_for_backoff_delay() {
    let harness =
        Harness::with(FakeCa::new().unwrap(), RecordingProvider::new(), fast_settings()).unwrap();
    harness.ca.fail_always(rejected);

    let handle = RotationController::new(harness.manager.clone()).spawn();
    sleep(Duration::from_millis(400)).await;
    handle.shutdown().await;

    // Ticking at the 20ms interval would have produced far more calls.
    let calls = harness.ca.calls();
    assert!((1..=3).contains(&calls), "unexpected CA calls: {calls}");
    assert_eq!(harness.backoff.durations(), calls);
    assert_eq!(harness.backoff.resets(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_token_stops_the_loop() {
    let harness =
        Harness::with(FakeCa::new().unwrap(), RecordingProvider::new(), fast_settings()).unwrap();
    let token = CancellationToken::new();

    let handle = RotationController::new(harness.manager.clone())
        .with_interval(Duration::from_secs(60))
        .with_shutdown(token.clone())
        .spawn();

    assert!(wait_for(|| harness.ca.calls() == 1).await);
    assert!(!handle.is_finished());

    token.cancel();
    assert!(wait_for(|| handle.is_finished()).await);
    assert!(handle.shutdown_token().is_cancelled());
}

#[tokio::test]
async fn shutdown_interrupts_a_long_wait() {
    let harness = Harness::new().unwrap();
    let handle = RotationController::new(harness.manager.clone())
        .with_interval(Duration::from_secs(3600))
        .spawn();

    assert!(wait_for(|| harness.ca.calls() == 1).await);
    timeout(Duration::from_secs(2), handle.shutdown()).await.expect("loop stopped promptly");
}
