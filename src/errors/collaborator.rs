use thiserror::Error;

use super::TlsError;

/// Failures reported by a [`KeyProvider`](crate::provider::KeyProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A key pair was loaded but there is no certificate for it yet.
    #[error("key pair is loaded but no certificate is available")]
    CertificateUnavailable,

    /// No key material exists (nothing stored, nothing generated).
    #[error("no key material is available")]
    KeyUnavailable,

    /// The requested key algorithm or size cannot be produced.
    #[error("unsupported key request: {algorithm} ({size} bits)")]
    UnsupportedKey { algorithm: String, size: u32 },

    /// Persistence was requested from a provider without storage.
    #[error("provider has no storage configured")]
    NotPersistent,

    /// Encoding or parsing of key or certificate material failed.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Reading or writing stored key material failed.
    #[error("key material I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Provider-specific failure.
    #[error("{0}")]
    Backend(String),
}

impl ProviderError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend(message.into())
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Failures reported by a [`CertificateAuthority`](crate::authority::CertificateAuthority).
#[derive(Debug, Error)]
pub enum CaError {
    /// The CA could not be reached or answered with a server-side failure.
    #[error("certificate authority unavailable: {0}")]
    Unavailable(String),

    /// The CA is shedding load.
    #[error("certificate authority rate limited the request: {0}")]
    RateLimited(String),

    /// The CA refused to sign.
    #[error("certificate authority rejected the request: {0}")]
    Rejected(String),

    /// The signing request could not be decoded or is not acceptable.
    #[error("invalid signing request: {0}")]
    InvalidRequest(String),
}

impl CaError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaError::Unavailable(_) | CaError::RateLimited(_))
    }

    /// Classify a transport-level failure message from a remote CA.
    ///
    /// Connection failures and 5xx answers are unavailability, 429 is rate
    /// limiting, anything else is a rejection.
    pub fn classify<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("429") || lower.contains("too many requests") {
            return CaError::RateLimited(message);
        }

        if lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("connection closed")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
        {
            return CaError::Unavailable(message);
        }

        CaError::Rejected(message)
    }
}
