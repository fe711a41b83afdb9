use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::SignatureScheme;
use tracing::error;

use crate::lifecycle::CertificateManager;

/// Certificate resolver backed by [`CertificateManager::get_certificate`].
///
/// Invoked by rustls on every handshake, from any number of connections at
/// once. A lookup failure is logged and no certificate is returned, which
/// aborts a server handshake and leaves a client without a certificate for a
/// peer that requires one.
///
/// The lookup is synchronous. When the credential needs a refresh it blocks
/// the thread driving the handshake, a tokio worker under `tokio-rustls`, for
/// up to `refresh_timeout`. Running the [`RotationController`] keeps that
/// path cold.
///
/// [`RotationController`]: crate::lifecycle::RotationController
#[derive(Debug, Clone)]
pub struct ManagedCertResolver {
    manager: CertificateManager,
    role: &'static str,
}

impl ManagedCertResolver {
    pub fn server(manager: CertificateManager) -> Self {
        Self { manager, role: "server" }
    }

    pub fn client(manager: CertificateManager) -> Self {
        Self { manager, role: "client" }
    }

    fn lookup(&self) -> Option<Arc<CertifiedKey>> {
        match self.manager.get_certificate() {
            Ok(key) => Some(key),
            Err(err) => {
                error!(role = self.role, error = %err, "Certificate acquisition failed");
                None
            }
        }
    }
}

impl ResolvesServerCert for ManagedCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.lookup()
    }
}

impl ResolvesClientCert for ManagedCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.lookup()
    }

    fn has_certs(&self) -> bool {
        true
    }
}
