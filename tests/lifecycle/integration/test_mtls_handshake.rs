use std::sync::Arc;

use mtls_lifecycle::tls::policy;
use mtls_lifecycle::{
    CertificateManager, Identity, LocalCertificateAuthority, StandardKeyProvider, StaticTrustStore,
    TrustStore,
};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::lifecycle::support::*;

const SERVER_NAME: &str = "server.lifecycle.test";

struct Pki {
    ca: Arc<LocalCertificateAuthority>,
    roots: Arc<StaticTrustStore>,
}

impl Pki {
    fn new() -> Self {
        let ca = Arc::new(LocalCertificateAuthority::new("Handshake Test CA").unwrap());
        let roots = Arc::new(StaticTrustStore::from_pem("ca", &ca.root_pem()).unwrap());
        Self { ca, roots }
    }

    fn manager(&self, identity: Identity) -> CertificateManager {
        CertificateManager::builder(Arc::new(StandardKeyProvider::new()), self.ca.clone(), identity)
            .trust_store(self.roots.clone())
            .build()
            .unwrap()
    }

    fn server(&self) -> CertificateManager {
        self.manager(
            Identity::workload("test_site", "cluster_test", "server1").with_dns_names([SERVER_NAME]),
        )
    }

    fn client(&self) -> CertificateManager {
        self.manager(Identity::workload("test_site", "cluster_test", "client1"))
    }
}

fn serial_of(der: &[u8]) -> String {
    let (_, cert) = X509Certificate::from_der(der).unwrap();
    cert.raw_serial_as_string()
}

#[tokio::test]
async fn mutual_tls_handshake_presents_managed_certificates() {
    let pki = Pki::new();
    let server = pki.server().client_auth_server_config().unwrap();
    let client = pki.client().client_auth_client_config(SERVER_NAME).unwrap();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);

    let server_task = tokio::spawn(async move {
        let mut stream = server.accept(server_io).await.unwrap();
        let (_, connection) = stream.get_ref();
        let peer = connection.peer_certificates().expect("client certificate").to_vec();

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(b"pong").await.unwrap();
        stream.shutdown().await.unwrap();
        (buf, peer)
    });

    let mut stream = client.connect(client_io).await.unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await.unwrap();

    let (request, peer) = server_task.await.unwrap();
    assert_eq!(&request, b"ping");
    assert_eq!(&reply, b"pong");
    assert_eq!(peer.len(), 1);
}

#[tokio::test]
async fn rotated_certificate_is_presented_without_rebuilding_config() {
    let pki = Pki::new();
    let server_manager = pki.server();
    let server = server_manager.client_auth_server_config().unwrap();
    let client = pki.client().client_auth_client_config(SERVER_NAME).unwrap();

    let mut serials = Vec::new();
    for round in 0..2 {
        if round == 1 {
            server_manager.manual_revoke();
            let manager = server_manager.clone();
            tokio::task::spawn_blocking(move || manager.auto_update()).await.unwrap().unwrap();
        }

        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let server = server.clone();
        let server_task = tokio::spawn(async move {
            let mut stream = server.accept(server_io).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let stream = client.connect(client_io).await.unwrap();
        let (_, connection) = stream.get_ref();
        let leaf = connection.peer_certificates().unwrap()[0].clone();
        serials.push(serial_of(leaf.as_ref()));
        server_task.await.unwrap();
    }

    assert_ne!(serials[0], serials[1]);
}

#[tokio::test]
async fn server_rejects_client_without_certificate() {
    let pki = Pki::new();
    let server = pki.server().client_auth_server_config().unwrap();

    let config = ClientConfig::builder_with_provider(policy::crypto_provider())
        .with_protocol_versions(policy::PROTOCOL_VERSIONS)
        .unwrap()
        .with_root_certificates(pki.roots.pool())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let server_task = tokio::spawn(async move { server.accept(server_io).await });

    // TLS 1.3 clients learn about the rejection on first read.
    let client_result = async {
        let mut stream =
            connector.connect(ServerName::try_from(SERVER_NAME).unwrap(), client_io).await?;
        let mut buf = [0u8; 1];
        stream.read(&mut buf).await
    }
    .await;

    assert!(server_task.await.unwrap().is_err());
    assert!(client_result.is_err() || client_result.unwrap() == 0);
}

#[tokio::test]
async fn optional_client_auth_accepts_anonymous_clients() {
    let pki = Pki::new();
    let server_config = pki.server().server_config().unwrap();

    let config = ClientConfig::builder_with_provider(policy::crypto_provider())
        .with_protocol_versions(policy::PROTOCOL_VERSIONS)
        .unwrap()
        .with_root_certificates(pki.roots.pool())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let acceptor = tokio_rustls::TlsAcceptor::from(server_config);

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let server_task = tokio::spawn(async move {
        let mut stream = acceptor.accept(server_io).await.unwrap();
        let anonymous = stream.get_ref().1.peer_certificates().is_none();
        stream.write_all(b"ok").await.unwrap();
        anonymous
    });

    let mut stream =
        connector.connect(ServerName::try_from(SERVER_NAME).unwrap(), client_io).await.unwrap();
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();

    assert!(server_task.await.unwrap());
    assert_eq!(&buf, b"ok");
}

#[tokio::test]
async fn pinned_name_mismatch_fails() {
    let pki = Pki::new();
    let server = pki.server().client_auth_server_config().unwrap();
    let client = pki.client().client_auth_client_config("other.lifecycle.test").unwrap();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let server_task = tokio::spawn(async move { server.accept(server_io).await });

    assert!(client.connect(client_io).await.is_err());
    assert!(server_task.await.unwrap().is_err());
}

#[tokio::test]
async fn unavailable_ca_fails_handshake_closed() {
    let ca = FakeCa::new().unwrap();
    ca.fail_always(rejected);
    let harness = Harness::with_identity(
        ca,
        RecordingProvider::new(),
        fast_settings(),
        Identity::workload("test_site", "cluster_test", "server1").with_dns_names([SERVER_NAME]),
    )
    .unwrap();
    let server = harness.manager.client_auth_server_config().unwrap();
    let pki = Pki::new();
    let client = pki.client().client_auth_client_config(SERVER_NAME).unwrap();

    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let server_task = tokio::spawn(async move { server.accept(server_io).await });

    assert!(client.connect(client_io).await.is_err());
    assert!(server_task.await.unwrap().is_err());
    assert!(harness.ca.calls() >= 1);
}

#[test]
fn invalid_server_name_is_rejected() {
    let pki = Pki::new();
    let err = pki.client().client_auth_client_config("not a hostname!").unwrap_err();
    assert!(err.to_string().contains("Invalid server name"));
}
