//! # Error Handling
//!
//! Error types for the certificate lifecycle manager. Every failure raised by a
//! collaborator (key provider, certificate authority) is kept as the `source`
//! of the lifecycle error that reports it, so callers can walk the chain for
//! diagnostics.

mod collaborator;
mod tls;

pub use collaborator::{CaError, ProviderError};
pub use tls::TlsError;

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the lifecycle manager
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No valid credential is available and none could be produced.
    #[error("Certificate unavailable: {reason}")]
    CertificateUnavailable {
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// The bounded refresh did not finish inside its wait budget.
    #[error("Certificate refresh timed out after {timeout_ms}ms")]
    RefreshTimeout { timeout_ms: u64 },

    /// The provider could not produce a key pair.
    #[error("Key generation failed: {source}")]
    KeyGenerationFailed {
        #[source]
        source: ProviderError,
    },

    /// The provider could not build a signing request.
    #[error("Signing request failed: {source}")]
    SigningRequestFailed {
        #[source]
        source: ProviderError,
    },

    /// The certificate authority refused or failed to sign.
    #[error("CA signing failed: {source}")]
    CaSigningFailed {
        #[source]
        source: CaError,
    },

    /// The provider rejected the certificate returned by the CA.
    #[error("Certificate install failed: {source}")]
    CertificateInstallFailed {
        #[source]
        source: ProviderError,
    },

    /// The provider could not persist the new credential.
    #[error("Persistence failed: {source}")]
    PersistenceFailed {
        #[source]
        source: ProviderError,
    },

    /// TLS configuration or certificate material errors
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Faults that are neither collaborator nor configuration failures
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Wrap a failure as `CertificateUnavailable`, keeping it as the source.
    pub fn unavailable<S: Into<String>>(reason: S, source: Error) -> Self {
        Self::CertificateUnavailable { reason: reason.into(), source: Some(Box::new(source)) }
    }

    /// Whether the collaborator that raised this error considers it temporary.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::CaSigningFailed { source } => source.is_transient(),
            Error::PersistenceFailed { source } => source.is_transient(),
            Error::CertificateUnavailable { source: Some(inner), .. } => inner.is_transient(),
            Error::RefreshTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::config_with_source("invalid lifecycle settings", Box::new(err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::config_with_source("failed to load lifecycle settings", Box::new(err))
    }
}
