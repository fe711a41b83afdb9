//! Key provider abstraction.
//!
//! A `KeyProvider` owns the workload's key pair and the certificate issued for
//! it. The lifecycle manager never holds certificate state itself; it drives
//! the provider through generation, CSR construction, installation and
//! persistence, and reads the current credential back for handshakes.
//!
//! # Available Providers
//!
//! - **StandardKeyProvider**: in-process keys generated with `rcgen`, optional
//!   file persistence
//!
//! # Example
//!
//! ```rust,ignore
//! use mtls_lifecycle::provider::{KeyProvider, StandardKeyProvider};
//!
//! let provider = StandardKeyProvider::new().with_storage("/var/lib/app/cert.pem", "/var/lib/app/key.pem");
//! if provider.load().is_err() {
//!     provider.generate(KeyAlgorithm::Ecdsa, 256)?;
//! }
//! ```

mod standard;

pub use standard::StandardKeyProvider;

use std::sync::Arc;

use rustls::sign::CertifiedKey;

use crate::errors::{Error, ProviderError};
use crate::identity::{Identity, KeyAlgorithm};
use crate::utils::IssuedCertificate;

/// A PEM-encoded PKCS#10 certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pem: String,
}

impl SigningRequest {
    pub fn from_pem<S: Into<String>>(pem: S) -> Self {
        Self { pem: pem.into() }
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }
}

/// Holder of the current key pair and certificate.
///
/// Implementations must be thread-safe: handshakes read the current
/// credential while a refresh installs a new one, and every reader must see
/// either the old or the new credential in full.
pub trait KeyProvider: Send + Sync + std::fmt::Debug {
    /// True when a key and an unexpired certificate are both present.
    fn ready(&self) -> bool;

    /// Load previously stored key material.
    ///
    /// Returns [`ProviderError::CertificateUnavailable`] when the key was
    /// loaded but no certificate exists for it.
    fn load(&self) -> Result<(), ProviderError>;

    /// Generate and hold a fresh key pair.
    fn generate(&self, algorithm: KeyAlgorithm, size: u32) -> Result<(), ProviderError>;

    /// Build a signing request for the held key.
    fn certificate_request(&self, identity: &Identity) -> Result<SigningRequest, ProviderError>;

    /// Install a PEM certificate chain issued for the held key.
    fn set_certificate_pem(&self, pem: &str) -> Result<(), ProviderError>;

    /// Whether [`store`](Self::store) should be called after installation.
    fn persistent(&self) -> bool;

    /// Persist the current key and certificate.
    fn store(&self) -> Result<(), ProviderError>;

    /// The current credential in the form a TLS handshake presents.
    fn x509_key_pair(&self) -> Result<Arc<CertifiedKey>, ProviderError>;

    /// The current certificate, if any.
    fn certificate(&self) -> Option<Arc<IssuedCertificate>>;

    /// Report a refresh failure; returns true when the refresh should be retried.
    fn signal_failure(&self, err: &Error) -> bool;
}
