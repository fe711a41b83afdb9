use std::time::Duration;

use mtls_lifecycle::errors::{CaError, Error, ProviderError};
use mtls_lifecycle::provider::KeyProvider;
use mtls_lifecycle::{Identity, KeyAlgorithm, KeyRequest, LifecycleSettings};
use tracing_test::traced_test;

use crate::lifecycle::support::*;

#[test]
fn fresh_certificate_is_not_signed_again() {
    let harness = Harness::new().unwrap();

    harness.manager.refresh_keys().unwrap();
    harness.manager.refresh_keys().unwrap();

    assert_eq!(harness.ca.calls(), 1);
    assert_eq!(harness.provider.generate_calls(), 1);
}

#[test]
fn revoke_forces_signing_with_the_same_key() {
    let harness = Harness::new().unwrap();
    harness.manager.refresh_keys().unwrap();
    let first = harness.provider.certificate_snapshot();

    harness.manager.manual_revoke();
    harness.manager.refresh_keys().unwrap();
    let second = harness.provider.certificate_snapshot();

    assert_eq!(harness.ca.calls(), 2);
    assert_eq!(harness.provider.generate_calls(), 1);
    assert_ne!(first.serial, second.serial);
    assert_eq!(first.public_key, second.public_key);
}

#[test]
#[traced_test]
fn slow_ca_times_out_and_installs_later() {
    let settings = LifecycleSettings { refresh_timeout_ms: 100, ..Default::default() };
    let harness = Harness::with_settings(settings).unwrap();
    harness.ca.set_latency(Duration::from_millis(400));

    let err = harness.manager.refresh_keys().unwrap_err();
    assert!(matches!(err, Error::RefreshTimeout { timeout_ms: 100 }));
    assert!(logs_contain("Certificate refresh timed out"));

    std::thread::sleep(Duration::from_millis(800));
    assert!(harness.provider.ready());
    assert_eq!(harness.ca.calls(), 1);
}

#[test]
fn transient_failures_are_retried_until_success() {
    let harness = Harness::new().unwrap();
    harness.ca.fail_next([unavailable(), unavailable()]);

    harness.manager.refresh_keys().unwrap();

    assert_eq!(harness.ca.calls(), 3);
    assert_eq!(harness.provider.signals(), 2);
    assert!(harness.provider.ready());
}

#[test]
fn permanent_failure_is_returned_unchanged() {
    let harness = Harness::new().unwrap();
    harness.ca.fail_next([rejected()]);

    let err = harness.manager.refresh_keys().unwrap_err();

    match err {
        Error::CaSigningFailed { source: CaError::Rejected(message) } => {
            assert_eq!(message, "profile not allowed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.ca.calls(), 1);
    assert_eq!(harness.provider.signals(), 1);
    assert!(!harness.provider.ready());
}

#[test]
fn retries_are_capped_for_always_retriable_provider() {
    let settings = LifecycleSettings { max_refresh_attempts: 4, ..Default::default() };
    let harness = Harness::with_settings(settings).unwrap();
    harness.provider.set_judgement(RetryJudgement::Always);
    harness.ca.fail_always(rejected);

    let err = harness.manager.refresh_keys().unwrap_err();

    assert!(matches!(err, Error::CaSigningFailed { .. }));
    assert_eq!(harness.ca.calls(), 4);
    assert_eq!(harness.provider.signals(), 4);
}

#[test]
fn transient_failures_exhaust_attempts() {
    let harness = Harness::new().unwrap();
    harness.ca.fail_always(unavailable);

    let err = harness.manager.refresh_keys().unwrap_err();

    assert!(err.is_transient());
    assert_eq!(harness.ca.calls(), 3);
}

#[test]
fn unsupported_key_request_fails_generation() {
    let identity = Identity::workload("test_site", "cluster_test", "server1")
        .with_key_request(KeyRequest { algorithm: KeyAlgorithm::Rsa, size: 2048 });
    let harness = Harness::with_identity(
        FakeCa::new().unwrap(),
        RecordingProvider::new(),
        LifecycleSettings::default(),
        identity,
    )
    .unwrap();

    let err = harness.manager.refresh_keys().unwrap_err();

    assert!(matches!(
        err,
        Error::KeyGenerationFailed { source: ProviderError::UnsupportedKey { size: 2048, .. } }
    ));
    assert_eq!(harness.ca.calls(), 0);
}

#[test]
fn identity_key_request_is_used() {
    let identity = Identity::workload("test_site", "cluster_test", "server1")
        .with_key_request(KeyRequest { algorithm: KeyAlgorithm::Ecdsa, size: 384 });
    let harness = Harness::with_identity(
        FakeCa::new().unwrap(),
        RecordingProvider::new(),
        LifecycleSettings::default(),
        identity,
    )
    .unwrap();

    harness.manager.refresh_keys().unwrap();

    // Uncompressed P-384 point: 0x04 || X || Y
    assert_eq!(harness.provider.certificate_snapshot().public_key.len(), 97);
}

#[test]
fn revoke_survives_a_transient_failure() {
    let harness = Harness::new().unwrap();
    harness.manager.refresh_keys().unwrap();
    let before = harness.provider.certificate_snapshot();

    harness.manager.manual_revoke();
    harness.ca.fail_next([unavailable()]);
    harness.manager.refresh_keys().unwrap();

    assert_eq!(harness.ca.calls(), 3);
    assert_eq!(harness.provider.signals(), 1);
    assert_ne!(harness.provider.certificate_snapshot().serial, before.serial);
}

#[test]
#[traced_test]
fn stalled_signing_does_not_block_later_refreshes() {
    let settings = LifecycleSettings { refresh_timeout_ms: 200, ..Default::default() };
    let harness = Harness::with_settings(settings).unwrap();
    harness.ca.set_latency(Duration::from_millis(1_500));
    assert!(matches!(harness.manager.refresh_keys(), Err(Error::RefreshTimeout { .. })));

    harness.ca.set_latency(Duration::ZERO);
    harness.manager.refresh_keys().unwrap();
    let installed = harness.provider.certificate_snapshot();
    assert_eq!(harness.ca.calls(), 2);
    assert!(logs_contain("In-flight certificate refresh stalled"));

    // The stalled signing finishes later and must not replace the newer certificate.
    std::thread::sleep(Duration::from_millis(1_800));
    assert_eq!(harness.provider.certificate_snapshot().serial, installed.serial);
    assert!(logs_contain("Discarding signed certificate"));
}
