//! Trust stores: the root pools used to verify the CA-issued chain and peer
//! client certificates.

use std::{
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use rustls::{pki_types::CertificateDer, RootCertStore};
use tracing::{debug, warn};

use crate::errors::TlsError;
use crate::utils::{pem_certificates, read_pem_certificates};

/// Source of a verification pool.
///
/// `pool` is called at configuration time and, for per-handshake server
/// configurations, on every handshake; implementations should return a
/// cheap shared snapshot.
pub trait TrustStore: Send + Sync + std::fmt::Debug {
    fn pool(&self) -> Arc<RootCertStore>;
}

/// Trust store holding a fixed set of roots that can be swapped at runtime.
#[derive(Debug)]
pub struct StaticTrustStore {
    name: String,
    roots: RwLock<Arc<RootCertStore>>,
}

impl StaticTrustStore {
    /// An empty store. Verifiers built from it reject every peer.
    pub fn empty(name: &str) -> Self {
        Self { name: name.to_string(), roots: RwLock::new(Arc::new(RootCertStore::empty())) }
    }

    /// Build a store from a PEM bundle.
    pub fn from_pem(name: &str, pem: &str) -> Result<Self, TlsError> {
        let store = Self::empty(name);
        store.replace_pem(pem)?;
        Ok(store)
    }

    /// Build a store from a PEM bundle on disk.
    pub fn from_pem_file(name: &str, path: &Path) -> Result<Self, TlsError> {
        let store = Self::empty(name);
        store.replace(read_pem_certificates(path)?)?;
        Ok(store)
    }

    /// Replace the whole pool with the roots in `pem`.
    pub fn replace_pem(&self, pem: &str) -> Result<usize, TlsError> {
        self.replace(pem_certificates(pem)?)
    }

    /// Replace the whole pool. Returns the number of roots accepted.
    pub fn replace(&self, certs: Vec<CertificateDer<'static>>) -> Result<usize, TlsError> {
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);

        if ignored > 0 {
            warn!(store = %self.name, ignored, "Ignored unparsable trust anchors");
        }
        if added == 0 {
            return Err(TlsError::EmptyTrustPool { name: self.name.clone() });
        }

        *self.roots.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(roots);
        debug!(store = %self.name, roots = added, "Replaced trust pool");
        Ok(added)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TrustStore for StaticTrustStore {
    fn pool(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots.read().unwrap_or_else(PoisonError::into_inner))
    }
}
