use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// TLS-specific error variants surfaced while handling certificate material
/// and building rustls configurations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No certificates were found in the supplied PEM.
    #[error("PEM input does not contain any certificates")]
    EmptyCertificateChain,

    /// The certificate PEM contents were invalid or unreadable.
    #[error("Certificate PEM is not valid: {source}")]
    InvalidCertificatePem {
        #[source]
        source: anyhow::Error,
    },

    /// The supplied certificate and key do not match.
    #[error("Certificate and private key do not match")]
    CertificateKeyMismatch,

    /// The certificate is already expired.
    #[error("Certificate expired at {not_after}")]
    CertificateExpired { not_after: DateTime<Utc> },

    /// Generic metadata extraction failure.
    #[error("Failed to extract certificate metadata: {source}")]
    CertificateMetadata {
        #[source]
        source: anyhow::Error,
    },

    /// Key generation or CSR encoding failed.
    #[error("Failed to encode key material: {0}")]
    Encoding(#[from] rcgen::Error),

    /// A trust pool has no usable root certificates.
    #[error("Trust pool '{name}' does not contain any root certificates")]
    EmptyTrustPool { name: String },

    /// The expected peer name is not a valid DNS name or IP address.
    #[error("Invalid server name '{name}'")]
    InvalidServerName { name: String },

    /// Building a peer verifier failed.
    #[error("Failed to build certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    /// rustls rejected a configuration or key.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),

    /// The TLS handshake with a peer failed.
    #[error("TLS handshake failed: {source}")]
    Handshake {
        #[source]
        source: std::io::Error,
    },
}
