use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SerialNumber,
};
use tracing::{debug, info};

use super::CertificateAuthority;
use crate::errors::{CaError, TlsError};
use crate::provider::SigningRequest;

const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);
const ROOT_VALIDITY_DAYS: i64 = 365;

/// Self-signed ECDSA root that signs requests in process.
///
/// Issued certificates start at the signing time, carry both server and
/// client authentication EKUs and keep the SANs of the request.
pub struct LocalCertificateAuthority {
    cert: Certificate,
    key: KeyPair,
    validity: Duration,
}

impl std::fmt::Debug for LocalCertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCertificateAuthority")
            .field("validity", &self.validity)
            .field("key", &"[KeyPair]")
            .finish()
    }
}

impl LocalCertificateAuthority {
    /// Create a new root with the given common name.
    pub fn new(common_name: &str) -> Result<Self, TlsError> {
        let key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;

        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::days(1);
        params.not_after = now + time::Duration::days(ROOT_VALIDITY_DAYS);

        let cert = params.self_signed(&key)?;
        info!(common_name = %common_name, "Created local certificate authority");

        Ok(Self { cert, key, validity: DEFAULT_VALIDITY })
    }

    /// Set the validity of issued certificates.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// The root certificate as PEM, for trust stores.
    pub fn root_pem(&self) -> String {
        self.cert.pem()
    }
}

impl CertificateAuthority for LocalCertificateAuthority {
    fn sign_csr(&self, request: &SigningRequest) -> Result<String, CaError> {
        let mut csr = CertificateSigningRequestParams::from_pem(request.pem())
            .map_err(|e| CaError::InvalidRequest(e.to_string()))?;

        let validity = time::Duration::try_from(self.validity)
            .map_err(|e| CaError::Rejected(format!("invalid validity: {e}")))?;
        let now = time::OffsetDateTime::now_utc();

        csr.params.not_before = now;
        csr.params.not_after = now + validity;
        csr.params.serial_number = Some(random_serial());
        csr.params.is_ca = IsCa::ExplicitNoCa;
        csr.params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        csr.params.extended_key_usages =
            vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];
        csr.params.use_authority_key_identifier_extension = true;

        let cert = csr
            .signed_by(&self.cert, &self.key)
            .map_err(|e| CaError::Rejected(format!("signing failed: {e}")))?;

        debug!(validity_secs = self.validity.as_secs(), "Signed certificate request");
        Ok(cert.pem())
    }
}

// rcgen's default serial is a digest of the public key, so re-signing the
// same key would repeat it.
fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}
