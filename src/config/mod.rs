//! # Configuration Management
//!
//! Settings for the lifecycle manager, loaded from defaults, an optional file
//! and `MTLS_LIFECYCLE_*` environment variables.

mod settings;
mod tls;

pub use settings::{BackoffSettings, LifecycleSettings, LoggingSettings, ENV_PREFIX};
pub use tls::TrustStoreSettings;
