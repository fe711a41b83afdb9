//! # TLS Configuration Factories
//!
//! rustls configurations that look up the current certificate through the
//! [`CertificateManager`] on every handshake, so long-lived listeners and
//! dialers present the freshest credential without being rebuilt.
//!
//! All configurations share the approved cipher suites and the TLS 1.2 floor
//! from [`policy`].

pub mod policy;
mod resolver;
mod verifier;

pub use resolver::ManagedCertResolver;
pub use verifier::PinnedServerNameVerifier;

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::server::{Acceptor, WebPkiClientVerifier};
use rustls::{ClientConfig, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{client, server, LazyConfigAcceptor, TlsConnector};
use tracing::{debug, warn};

use crate::errors::{Result, TlsError};
use crate::lifecycle::CertificateManager;

/// Outbound configuration presenting the managed certificate, verifying the
/// server against the own-chain trust pool and a pinned name.
#[derive(Debug, Clone)]
pub struct ClientAuthClientConfig {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

impl ClientAuthClientConfig {
    pub fn config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// The pinned server name, also used for SNI by [`connect`](Self::connect).
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.config())
    }

    /// Perform a client handshake over `io`.
    pub async fn connect<IO>(&self, io: IO) -> Result<client::TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self
            .connector()
            .connect(self.server_name.clone(), io)
            .await
            .map_err(|source| TlsError::Handshake { source })?;
        Ok(stream)
    }
}

/// Inbound configuration that requires client certificates.
///
/// A fresh [`ServerConfig`] is built for every handshake from the current
/// client trust pool.
#[derive(Debug, Clone)]
pub struct ClientAuthServerConfig {
    manager: CertificateManager,
}

impl ClientAuthServerConfig {
    /// Build the configuration for one handshake.
    pub fn config_for_handshake(&self) -> Result<Arc<ServerConfig>> {
        let provider = policy::crypto_provider();
        let verifier = WebPkiClientVerifier::builder_with_provider(
            self.manager.client_trust_store().pool(),
            Arc::clone(&provider),
        )
        .build()
        .map_err(TlsError::from)?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(policy::PROTOCOL_VERSIONS)
            .map_err(TlsError::from)?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(Arc::new(ManagedCertResolver::server(self.manager.clone())));

        Ok(Arc::new(config))
    }

    /// Accept a connection, building its configuration once the ClientHello
    /// has arrived.
    pub async fn accept<IO>(&self, io: IO) -> Result<server::TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(Acceptor::default(), io)
            .await
            .map_err(|source| TlsError::Handshake { source })?;

        if let Some(name) = start.client_hello().server_name() {
            debug!(server_name = %name, "Received ClientHello");
        }

        let config = self.config_for_handshake()?;
        let stream = start.into_stream(config).await.map_err(|source| {
            warn!(error = %source, "Client-authenticated handshake failed");
            TlsError::Handshake { source }
        })?;
        Ok(stream)
    }
}

impl CertificateManager {
    /// Configuration for outbound connections that present a client
    /// certificate. `server_name` is pinned: the server must hold a
    /// certificate for it.
    pub fn client_auth_client_config(&self, server_name: &str) -> Result<ClientAuthClientConfig> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName { name: server_name.to_string() })?;

        let provider = policy::crypto_provider();
        let verifier = PinnedServerNameVerifier::new(
            self.trust_store().pool(),
            server_name.clone(),
            Arc::clone(&provider),
        )?;

        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(policy::PROTOCOL_VERSIONS)
            .map_err(TlsError::from)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_cert_resolver(Arc::new(ManagedCertResolver::client(self.clone())));

        Ok(ClientAuthClientConfig { config: Arc::new(config), server_name })
    }

    /// Configuration for inbound connections that must present a client
    /// certificate signed by the client trust pool.
    pub fn client_auth_server_config(&self) -> Result<ClientAuthServerConfig> {
        let factory = ClientAuthServerConfig { manager: self.clone() };
        // Surface an unusable client trust pool at setup time.
        factory.config_for_handshake()?;
        Ok(factory)
    }

    /// General inbound configuration; client certificates are verified only
    /// when presented.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let provider = policy::crypto_provider();
        let verifier = WebPkiClientVerifier::builder_with_provider(
            self.client_trust_store().pool(),
            Arc::clone(&provider),
        )
        .allow_unauthenticated()
        .build()
        .map_err(TlsError::from)?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(policy::PROTOCOL_VERSIONS)
            .map_err(TlsError::from)?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(Arc::new(ManagedCertResolver::server(self.clone())));

        Ok(Arc::new(config))
    }
}
