use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::trust::StaticTrustStore;

/// Locations of the PEM bundles backing the two trust stores.
#[derive(Debug, Clone)]
pub struct TrustStoreSettings {
    /// Roots that verify the CA-issued chain and outbound peers.
    pub ca_bundle: PathBuf,
    /// Roots that verify inbound client certificates. Defaults to `ca_bundle`.
    pub client_ca_bundle: Option<PathBuf>,
}

impl TrustStoreSettings {
    /// Load bundle locations from environment variables.
    pub fn from_env() -> Result<Self> {
        let ca_bundle = std::env::var("MTLS_LIFECYCLE_CA_BUNDLE")
            .map_err(|_| Error::config("MTLS_LIFECYCLE_CA_BUNDLE is not set"))?
            .trim()
            .to_string();

        if ca_bundle.is_empty() {
            return Err(Error::config("MTLS_LIFECYCLE_CA_BUNDLE is empty"));
        }

        let client_ca_bundle = std::env::var("MTLS_LIFECYCLE_CLIENT_CA_BUNDLE")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self { ca_bundle: PathBuf::from(ca_bundle), client_ca_bundle })
    }

    /// Build the own-chain and client trust stores.
    pub fn load_stores(&self) -> Result<(Arc<StaticTrustStore>, Arc<StaticTrustStore>)> {
        let roots = Arc::new(StaticTrustStore::from_pem_file("ca", &self.ca_bundle)?);
        let clients = match &self.client_ca_bundle {
            Some(path) => Arc::new(StaticTrustStore::from_pem_file("client-ca", path)?),
            None => Arc::clone(&roots),
        };
        Ok((roots, clients))
    }
}
