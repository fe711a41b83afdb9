//! # mtls-lifecycle
//!
//! Client-side mutual-TLS credential lifecycle manager. It keeps a workload
//! supplied with a valid X.509 certificate/key pair issued by a certificate
//! authority, rotates it well before expiry, and exposes rustls
//! configurations that always present the current certificate.
//!
//! ## Architecture
//!
//! ```text
//! RotationController ──tick──▶ CertificateManager ──▶ KeyProvider
//!                                  ▲      │               ▲
//!        TLS handshake ── resolver─┘      └──▶ CertificateAuthority
//! ```
//!
//! ## Core Components
//!
//! - **CertificateManager**: rotation policy, bounded refresh, certificate lookup
//! - **KeyProvider**: holds the key pair and issued certificate
//! - **CertificateAuthority**: signs certificate requests
//! - **TrustStore**: root pools for the own chain and for client certificates
//! - **BackoffPolicy**: delays between failed rotation attempts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mtls_lifecycle::{
//!     CertificateManager, Identity, LocalCertificateAuthority, Result, RotationController,
//!     StandardKeyProvider, StaticTrustStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ca = Arc::new(LocalCertificateAuthority::new("Example CA")?);
//!     let roots = Arc::new(StaticTrustStore::from_pem("ca", &ca.root_pem())?);
//!
//!     let manager = CertificateManager::builder(
//!         Arc::new(StandardKeyProvider::new()),
//!         ca,
//!         Identity::workload("site-a", "cluster-1", "api"),
//!     )
//!     .trust_store(roots)
//!     .build()?;
//!
//!     let rotation = RotationController::new(manager.clone()).spawn();
//!     let _server_config = manager.server_config()?;
//!
//!     rotation.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod backoff;
pub mod config;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod provider;
pub mod tls;
pub mod trust;
pub mod utils;

// Re-export commonly used types and traits
pub use authority::{CertificateAuthority, LocalCertificateAuthority};
pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use config::{LifecycleSettings, TrustStoreSettings};
pub use errors::{Error, Result};
pub use identity::{Identity, KeyAlgorithm, KeyRequest};
pub use lifecycle::{
    CertificateManager, Lifespan, RotationController, RotationFailure, RotationHandle,
    RotationStatus,
};
pub use observability::init_logging;
pub use provider::{KeyProvider, SigningRequest, StandardKeyProvider};
pub use tls::{ClientAuthClientConfig, ClientAuthServerConfig};
pub use trust::{StaticTrustStore, TrustStore};

// Used by the exported span macros.
#[doc(hidden)]
pub use {tracing, uuid};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
