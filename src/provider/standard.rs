use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use chrono::Utc;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType, SignatureAlgorithm};
use rustls::{
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
    sign::CertifiedKey,
};
use tracing::{debug, info, warn};

use super::{KeyProvider, SigningRequest};
use crate::errors::{Error, ProviderError, TlsError};
use crate::identity::{Identity, KeyAlgorithm};
use crate::utils::{parse_certificate_chain, IssuedCertificate};

/// File locations used when the provider is persistent.
#[derive(Debug, Clone)]
struct KeyStorage {
    cert_path: PathBuf,
    key_path: PathBuf,
}

/// One consistent snapshot of key, certificate and handshake material.
#[derive(Default)]
struct Credential {
    key: Option<Arc<KeyPair>>,
    issued: Option<Arc<IssuedCertificate>>,
    certified: Option<Arc<CertifiedKey>>,
    chain_pem: Option<String>,
}

/// In-process key provider backed by `rcgen` keys.
///
/// Supports ECDSA P-256/P-384 and Ed25519. With storage configured the key
/// (PKCS#8 PEM) and certificate chain are written to disk after every
/// installation and read back by [`load`](KeyProvider::load).
pub struct StandardKeyProvider {
    credential: RwLock<Credential>,
    storage: Option<KeyStorage>,
    failures: AtomicU32,
}

impl std::fmt::Debug for StandardKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credential = self.credential.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("StandardKeyProvider")
            .field("has_key", &credential.key.is_some())
            .field("certificate", &credential.issued.as_ref().map(|c| c.serial.clone()))
            .field("storage", &self.storage)
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StandardKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardKeyProvider {
    /// Create an empty, non-persistent provider.
    pub fn new() -> Self {
        Self { credential: RwLock::new(Credential::default()), storage: None, failures: AtomicU32::new(0) }
    }

    /// Persist key and certificate to the given paths.
    pub fn with_storage(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.storage = Some(KeyStorage { cert_path: cert_path.into(), key_path: key_path.into() });
        self
    }

    /// Number of failures signalled since construction.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    fn current_key(&self) -> Option<Arc<KeyPair>> {
        self.credential.read().unwrap_or_else(PoisonError::into_inner).key.clone()
    }

    fn signature_algorithm(
        algorithm: KeyAlgorithm,
        size: u32,
    ) -> Result<&'static SignatureAlgorithm, ProviderError> {
        match (algorithm, size) {
            (KeyAlgorithm::Ecdsa, 256) => Ok(&rcgen::PKCS_ECDSA_P256_SHA256),
            (KeyAlgorithm::Ecdsa, 384) => Ok(&rcgen::PKCS_ECDSA_P384_SHA384),
            (KeyAlgorithm::Ed25519, _) => Ok(&rcgen::PKCS_ED25519),
            (algorithm, size) => {
                Err(ProviderError::UnsupportedKey { algorithm: algorithm.to_string(), size })
            }
        }
    }

    /// Build handshake material for `chain_pem` signed over `key`.
    fn build_credential(
        key: Arc<KeyPair>,
        chain_pem: &str,
    ) -> Result<Credential, ProviderError> {
        let issued = parse_certificate_chain(chain_pem)?;

        if issued.public_key != key.public_key_raw() {
            return Err(TlsError::CertificateKeyMismatch.into());
        }

        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der()));
        let signing_key =
            rustls::crypto::ring::sign::any_supported_type(&key_der).map_err(TlsError::from)?;
        let certified = CertifiedKey::new(issued.chain.clone(), signing_key);

        Ok(Credential {
            key: Some(key),
            issued: Some(Arc::new(issued)),
            certified: Some(Arc::new(certified)),
            chain_pem: Some(chain_pem.to_string()),
        })
    }

    fn install(&self, credential: Credential) {
        *self.credential.write().unwrap_or_else(PoisonError::into_inner) = credential;
    }

    fn read_optional(path: &Path) -> Result<Option<String>, ProviderError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ProviderError::Io(err)),
        }
    }

    fn write_file(path: &Path, contents: &str, private: bool) -> Result<(), ProviderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        if private {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        #[cfg(not(unix))]
        let _ = private;

        let mut file = options.open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl KeyProvider for StandardKeyProvider {
    fn ready(&self) -> bool {
        let credential = self.credential.read().unwrap_or_else(PoisonError::into_inner);
        match (&credential.key, &credential.certified, &credential.issued) {
            (Some(_), Some(_), Some(issued)) => !issued.is_expired_at(Utc::now()),
            _ => false,
        }
    }

    fn load(&self) -> Result<(), ProviderError> {
        let storage = self.storage.as_ref().ok_or(ProviderError::KeyUnavailable)?;

        let key_pem = Self::read_optional(&storage.key_path)?.ok_or(ProviderError::KeyUnavailable)?;
        let key = Arc::new(KeyPair::from_pem(&key_pem).map_err(TlsError::from)?);

        let Some(chain_pem) = Self::read_optional(&storage.cert_path)? else {
            debug!(key_path = %storage.key_path.display(), "Loaded key without certificate");
            self.install(Credential { key: Some(key), ..Default::default() });
            return Err(ProviderError::CertificateUnavailable);
        };

        let credential = Self::build_credential(Arc::clone(&key), &chain_pem)?;
        let expired = credential.issued.as_ref().is_some_and(|c| c.is_expired_at(Utc::now()));

        if expired {
            debug!(cert_path = %storage.cert_path.display(), "Stored certificate is expired");
            self.install(Credential { key: Some(key), ..Default::default() });
            return Err(ProviderError::CertificateUnavailable);
        }

        self.install(credential);
        info!(cert_path = %storage.cert_path.display(), "Loaded stored key pair and certificate");
        Ok(())
    }

    fn generate(&self, algorithm: KeyAlgorithm, size: u32) -> Result<(), ProviderError> {
        let alg = Self::signature_algorithm(algorithm, size)?;
        let key = KeyPair::generate_for(alg).map_err(TlsError::from)?;

        self.install(Credential { key: Some(Arc::new(key)), ..Default::default() });
        debug!(algorithm = %algorithm, size, "Generated new key pair");
        Ok(())
    }

    fn certificate_request(&self, identity: &Identity) -> Result<SigningRequest, ProviderError> {
        let key = self.current_key().ok_or(ProviderError::KeyUnavailable)?;

        let mut params =
            CertificateParams::new(identity.dns_names.clone()).map_err(TlsError::from)?;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, identity.common_name.as_str());
        if let Some(organization) = &identity.organization {
            name.push(DnType::OrganizationName, organization.as_str());
        }
        if !identity.cluster_id.is_empty() {
            name.push(DnType::OrganizationalUnitName, identity.cluster_id.as_str());
        }
        params.distinguished_name = name;

        for ip in &identity.ip_addresses {
            params.subject_alt_names.push(SanType::IpAddress(*ip));
        }
        for uri in &identity.uris {
            params
                .subject_alt_names
                .push(SanType::URI(uri.as_str().try_into().map_err(TlsError::from)?));
        }

        let csr = params.serialize_request(&key).map_err(TlsError::from)?;
        let pem = csr.pem().map_err(TlsError::from)?;
        Ok(SigningRequest::from_pem(pem))
    }

    fn set_certificate_pem(&self, pem: &str) -> Result<(), ProviderError> {
        let key = self.current_key().ok_or(ProviderError::KeyUnavailable)?;
        let credential = Self::build_credential(Arc::clone(&key), pem)?;

        if let Some(issued) = &credential.issued {
            if issued.is_expired_at(Utc::now()) {
                return Err(TlsError::CertificateExpired { not_after: issued.not_after }.into());
            }
        }

        let mut current = self.credential.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent generate may have replaced the key this chain was issued for.
        let same_key = current.key.as_ref().is_some_and(|held| Arc::ptr_eq(held, &key));
        if !same_key {
            return Err(TlsError::CertificateKeyMismatch.into());
        }
        *current = credential;
        Ok(())
    }

    fn persistent(&self) -> bool {
        self.storage.is_some()
    }

    fn store(&self) -> Result<(), ProviderError> {
        let storage = self.storage.as_ref().ok_or(ProviderError::NotPersistent)?;

        let (key_pem, chain_pem) = {
            let credential = self.credential.read().unwrap_or_else(PoisonError::into_inner);
            let key = credential.key.as_ref().ok_or(ProviderError::KeyUnavailable)?;
            let chain = credential.chain_pem.clone().ok_or(ProviderError::CertificateUnavailable)?;
            (key.serialize_pem(), chain)
        };

        Self::write_file(&storage.key_path, &key_pem, true)?;
        Self::write_file(&storage.cert_path, &chain_pem, false)?;
        debug!(cert_path = %storage.cert_path.display(), "Stored key pair and certificate");
        Ok(())
    }

    fn x509_key_pair(&self) -> Result<Arc<CertifiedKey>, ProviderError> {
        let credential = self.credential.read().unwrap_or_else(PoisonError::into_inner);
        match (&credential.key, &credential.certified) {
            (Some(_), Some(certified)) => Ok(Arc::clone(certified)),
            (Some(_), None) => Err(ProviderError::CertificateUnavailable),
            (None, _) => Err(ProviderError::KeyUnavailable),
        }
    }

    fn certificate(&self) -> Option<Arc<IssuedCertificate>> {
        self.credential.read().unwrap_or_else(PoisonError::into_inner).issued.clone()
    }

    fn signal_failure(&self, err: &Error) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        let retry = err.is_transient();
        warn!(error = %err, failures, retry, "Key provider signalled refresh failure");
        retry
    }
}
