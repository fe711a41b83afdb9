//! Certificate authority abstraction.
//!
//! The lifecycle manager only needs one operation from a CA: turn a signing
//! request into a signed PEM certificate. Transport, authentication and
//! signing policy belong to the implementation.
//!
//! # Available Authorities
//!
//! - **LocalCertificateAuthority**: in-process self-signed root for
//!   development and tests

mod local;

pub use local::LocalCertificateAuthority;

use crate::errors::CaError;
use crate::provider::SigningRequest;

/// A certificate authority able to sign PKCS#10 requests.
///
/// Implementations must be thread-safe; the manager may call `sign_csr` from
/// several refresh attempts at once. Report temporary failures with
/// [`CaError::Unavailable`] or [`CaError::RateLimited`] so the key provider
/// can judge them retriable, and permanent ones with
/// [`CaError::Rejected`] / [`CaError::InvalidRequest`].
pub trait CertificateAuthority: Send + Sync + std::fmt::Debug {
    /// Sign the request and return the issued chain as PEM (leaf first).
    fn sign_csr(&self, request: &SigningRequest) -> Result<String, CaError>;
}
