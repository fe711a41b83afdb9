use std::{fs, path::Path, time::Duration};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::{pem::PemObject, CertificateDer};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::errors::TlsError;

/// An issued credential: the leaf validity window plus the signed chain.
///
/// Instances are never mutated; a refresh installs a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Leaf first, then any intermediates, DER encoded.
    pub chain: Vec<CertificateDer<'static>>,
    /// Raw subjectPublicKey bits of the leaf.
    pub public_key: Vec<u8>,
}

impl IssuedCertificate {
    /// Total validity (`notAfter - notBefore`), zero for inverted windows.
    pub fn validity(&self) -> Duration {
        (self.not_after - self.not_before).to_std().unwrap_or(Duration::ZERO)
    }

    /// Validity left at `now`, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.not_after - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_after
    }

    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.chain.first()
    }
}

/// Parse a PEM certificate chain. The first certificate is the leaf.
pub fn parse_certificate_chain(pem: &str) -> Result<IssuedCertificate, TlsError> {
    let chain: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(pem.as_bytes())
        .map(|result| result.map_err(|err| TlsError::InvalidCertificatePem { source: anyhow!(err) }))
        .collect::<Result<_, _>>()?;

    if chain.is_empty() {
        return Err(TlsError::EmptyCertificateChain);
    }

    let (_, leaf) = X509Certificate::from_der(chain[0].as_ref())
        .map_err(|err| TlsError::CertificateMetadata { source: anyhow!(err) })?;

    let validity = leaf.validity();
    let not_before = to_chrono(validity.not_before.timestamp())?;
    let not_after = to_chrono(validity.not_after.timestamp())?;

    Ok(IssuedCertificate {
        subject: leaf.subject().to_string(),
        issuer: leaf.issuer().to_string(),
        serial: leaf.raw_serial_as_string(),
        not_before,
        not_after,
        public_key: leaf.public_key().subject_public_key.data.to_vec(),
        chain,
    })
}

/// Read every certificate from a PEM bundle on disk.
pub fn read_pem_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bytes = fs::read(path)
        .map_err(|e| TlsError::ReadError { path: path.to_path_buf(), source: e })?;

    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&bytes)
        .map(|result| result.map_err(|err| TlsError::InvalidCertificatePem { source: anyhow!(err) }))
        .collect::<Result<_, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::EmptyCertificateChain);
    }
    Ok(certs)
}

/// Parse every certificate from PEM text.
pub fn pem_certificates(pem: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_slice_iter(pem.as_bytes())
        .map(|result| result.map_err(|err| TlsError::InvalidCertificatePem { source: anyhow!(err) }))
        .collect()
}

fn to_chrono(timestamp: i64) -> Result<DateTime<Utc>, TlsError> {
    Utc.timestamp_opt(timestamp, 0).single().ok_or_else(|| TlsError::CertificateMetadata {
        source: anyhow!("certificate time {timestamp} out of range"),
    })
}
