//! Workload identity and key request parameters used to build signing requests.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Key algorithms a provider may be asked to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Ecdsa,
    Ed25519,
    Rsa,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ecdsa => "ecdsa",
            Self::Ed25519 => "ed25519",
            Self::Rsa => "rsa",
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Algorithm and size of the key to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub algorithm: KeyAlgorithm,
    pub size: u32,
}

impl Default for KeyRequest {
    /// ECDSA on P-256.
    fn default() -> Self {
        Self { algorithm: KeyAlgorithm::Ecdsa, size: 256 }
    }
}

/// Immutable description of the workload a certificate is requested for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub site_id: String,
    pub cluster_id: String,
    pub unique_id: String,
    pub common_name: String,
    pub organization: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub uris: Vec<String>,
    pub key_request: Option<KeyRequest>,
}

impl Identity {
    /// Identity for a workload addressed as `site/cluster/unique`.
    ///
    /// The unique id becomes the common name and the triple is carried as a
    /// `spiffe://{site}/{cluster}/{unique}` URI SAN.
    pub fn workload(site_id: &str, cluster_id: &str, unique_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            cluster_id: cluster_id.to_string(),
            unique_id: unique_id.to_string(),
            common_name: unique_id.to_string(),
            uris: vec![format!("spiffe://{site_id}/{cluster_id}/{unique_id}")],
            ..Default::default()
        }
    }

    pub fn with_dns_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_ip_addresses<I: IntoIterator<Item = IpAddr>>(mut self, addresses: I) -> Self {
        self.ip_addresses.extend(addresses);
        self
    }

    pub fn with_key_request(mut self, request: KeyRequest) -> Self {
        self.key_request = Some(request);
        self
    }

    /// The key request to use, falling back to the default.
    pub fn effective_key_request(&self) -> KeyRequest {
        self.key_request.unwrap_or_default()
    }
}
