use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use mtls_lifecycle::trust::TrustStore;
use mtls_lifecycle::{LifecycleSettings, TrustStoreSettings};

use crate::lifecycle::support::FakeCa;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const LIFECYCLE_VARS: &[&str] = &[
    "MTLS_LIFECYCLE_REFRESH_RATE",
    "MTLS_LIFECYCLE_REFRESH_TIMEOUT_MS",
    "MTLS_LIFECYCLE_MAX_REFRESH_ATTEMPTS",
    "MTLS_LIFECYCLE_BACKOFF__MAX_MS",
    "MTLS_LIFECYCLE_CA_BUNDLE",
    "MTLS_LIFECYCLE_CLIENT_CA_BUNDLE",
];

fn clear_env() {
    for var in LIFECYCLE_VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn settings_default_without_environment() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let settings = LifecycleSettings::from_env().expect("settings load");
    assert_eq!(settings, LifecycleSettings::default());
}

#[test]
fn settings_read_from_environment() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("MTLS_LIFECYCLE_REFRESH_RATE", "4");
    std::env::set_var("MTLS_LIFECYCLE_REFRESH_TIMEOUT_MS", "2500");
    std::env::set_var("MTLS_LIFECYCLE_BACKOFF__MAX_MS", "30000");

    let settings = LifecycleSettings::from_env().expect("settings load");
    assert_eq!(settings.refresh_rate, 4);
    assert_eq!(settings.refresh_timeout(), Duration::from_millis(2_500));
    assert_eq!(settings.backoff.max_ms, 30_000);

    clear_env();
}

#[test]
fn settings_reject_out_of_range_attempts() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    std::env::set_var("MTLS_LIFECYCLE_MAX_REFRESH_ATTEMPTS", "0");
    let err = LifecycleSettings::from_env().expect_err("zero attempts should error");
    assert!(format!("{err}").contains("invalid lifecycle settings"));

    clear_env();
}

#[test]
fn trust_settings_require_ca_bundle() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let err = TrustStoreSettings::from_env().expect_err("missing bundle should error");
    assert!(format!("{err}").contains("MTLS_LIFECYCLE_CA_BUNDLE"));
}

#[test]
fn trust_settings_load_both_stores() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let roots = FakeCa::new().unwrap();
    let clients = FakeCa::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let ca_path = dir.path().join("ca.pem");
    let client_path = dir.path().join("clients.pem");
    std::fs::write(&ca_path, roots.root_pem()).unwrap();
    std::fs::write(&client_path, format!("{}{}", roots.root_pem(), clients.root_pem())).unwrap();

    std::env::set_var("MTLS_LIFECYCLE_CA_BUNDLE", &ca_path);
    std::env::set_var("MTLS_LIFECYCLE_CLIENT_CA_BUNDLE", &client_path);

    let settings = TrustStoreSettings::from_env().expect("trust settings");
    assert_eq!(settings.client_ca_bundle, Some(PathBuf::from(&client_path)));

    let (own, peers) = settings.load_stores().expect("stores load");
    assert_eq!(own.pool().len(), 1);
    assert_eq!(peers.pool().len(), 2);

    clear_env();
}

#[test]
fn missing_bundle_file_is_reported() {
    let settings = TrustStoreSettings { ca_bundle: PathBuf::from("/unused"), client_ca_bundle: None };
    let err = settings.load_stores().expect_err("missing file should error");
    assert!(format!("{err}").contains("/unused"));
}
