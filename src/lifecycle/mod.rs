//! # Certificate Lifecycle
//!
//! The [`CertificateManager`] owns the rotation policy and the refresh
//! protocol:
//!
//! 1. If the provider is not ready, load stored key material or generate a
//!    new key pair from the identity's key request.
//! 2. Evaluate the [`Lifespan`]; skip signing while the certificate is fresh.
//! 3. Build a CSR, have the CA sign it and install the result.
//! 4. Persist when the provider is persistent.
//!
//! Any failure is reported to the provider, which decides whether the
//! refresh is retried (up to `max_refresh_attempts`). Callers wait at most
//! `refresh_timeout` for the whole protocol.
//!
//! The [`RotationController`] calls [`CertificateManager::auto_update`]
//! periodically so handshakes normally read an already valid credential.

mod gate;
mod lifespan;
mod manager;
mod rotation;

pub use lifespan::Lifespan;
pub use manager::{CertificateManager, CertificateManagerBuilder};
pub use rotation::{RotationController, RotationFailure, RotationHandle, RotationStatus};
