use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use rustls::sign::CertifiedKey;
use tracing::{debug, error, info, warn};

use super::gate::RefreshGate;
use super::lifespan::Lifespan;
use super::rotation::{RotationFailure, RotationStatus};
use crate::authority::CertificateAuthority;
use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::config::LifecycleSettings;
use crate::errors::{Error, ProviderError, Result};
use crate::identity::Identity;
use crate::provider::KeyProvider;
use crate::utils::IssuedCertificate;
use crate::trust::TrustStore;
use crate::{refresh_span, rotation_span};

/// Keeps a workload supplied with a valid certificate.
///
/// The manager holds no credential itself. It decides when the
/// [`KeyProvider`]'s certificate must be replaced, drives the provider and the
/// [`CertificateAuthority`] through a refresh, and serves the current
/// credential to TLS handshakes.
///
/// Cloning is cheap; clones share state.
#[derive(Clone, Debug)]
pub struct CertificateManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    provider: Arc<dyn KeyProvider>,
    authority: Arc<dyn CertificateAuthority>,
    identity: Identity,
    trust_store: Arc<dyn TrustStore>,
    client_trust_store: Arc<dyn TrustStore>,
    backoff: Arc<dyn BackoffPolicy>,
    settings: LifecycleSettings,
    revoke_requested: AtomicBool,
    refresh_gate: RefreshGate,
}

/// What a refresh may skip.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Renewal {
    /// Sign only when the current certificate is no longer fresh.
    IfStale,
    /// Sign unless the certificate with this serial (or the absence of one)
    /// has already been replaced.
    Replace(Option<String>),
}

/// Builder for [`CertificateManager`].
#[derive(Debug)]
pub struct CertificateManagerBuilder {
    provider: Arc<dyn KeyProvider>,
    authority: Arc<dyn CertificateAuthority>,
    identity: Identity,
    trust_store: Option<Arc<dyn TrustStore>>,
    client_trust_store: Option<Arc<dyn TrustStore>>,
    backoff: Option<Arc<dyn BackoffPolicy>>,
    settings: LifecycleSettings,
}

impl CertificateManagerBuilder {
    /// Roots used to verify the CA-issued chain and outbound peers.
    pub fn trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.trust_store = Some(store);
        self
    }

    /// Roots used to verify inbound client certificates. Defaults to the
    /// own-chain store.
    pub fn client_trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.client_trust_store = Some(store);
        self
    }

    /// Backoff for the rotation loop. Defaults to an [`ExponentialBackoff`]
    /// built from the settings.
    pub fn backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<CertificateManager> {
        self.settings.validate()?;

        let trust_store =
            self.trust_store.ok_or_else(|| Error::config("a trust store is required"))?;
        let client_trust_store =
            self.client_trust_store.unwrap_or_else(|| Arc::clone(&trust_store));
        let backoff = self.backoff.unwrap_or_else(|| {
            Arc::new(ExponentialBackoff::from_settings(&self.settings.backoff))
        });

        debug!(
            common_name = %self.identity.common_name,
            refresh_rate = self.settings.refresh_rate,
            refresh_timeout_ms = self.settings.refresh_timeout_ms,
            max_refresh_attempts = self.settings.max_refresh_attempts,
            "Created certificate manager"
        );

        Ok(CertificateManager {
            inner: Arc::new(Inner {
                provider: self.provider,
                authority: self.authority,
                identity: self.identity,
                trust_store,
                client_trust_store,
                backoff,
                settings: self.settings,
                revoke_requested: AtomicBool::new(false),
                refresh_gate: RefreshGate::default(),
            }),
        })
    }
}

impl CertificateManager {
    pub fn builder(
        provider: Arc<dyn KeyProvider>,
        authority: Arc<dyn CertificateAuthority>,
        identity: Identity,
    ) -> CertificateManagerBuilder {
        CertificateManagerBuilder {
            provider,
            authority,
            identity,
            trust_store: None,
            client_trust_store: None,
            backoff: None,
            settings: LifecycleSettings::default(),
        }
    }

    /// The credential to present in a handshake.
    ///
    /// Runs a bounded refresh first when the provider is not ready or its
    /// certificate has expired. Never returns an expired or absent
    /// credential: if none can be produced the error is
    /// [`Error::CertificateUnavailable`] carrying the refresh failure.
    pub fn get_certificate(&self) -> Result<Arc<CertifiedKey>> {
        let provider = &self.inner.provider;

        if !provider.ready() || !self.has_live_certificate() {
            debug!("Credential not ready, refreshing before handshake");
            self.inner
                .bounded_refresh(Renewal::IfStale, "handshake")
                .map_err(|e| Error::unavailable("refresh failed", e))?;
        }

        if !self.has_live_certificate() {
            return Err(Error::CertificateUnavailable {
                reason: "no unexpired certificate after refresh".to_string(),
                source: None,
            });
        }

        provider.x509_key_pair().map_err(|e| Error::CertificateUnavailable {
            reason: format!("key pair unavailable: {e}"),
            source: None,
        })
    }

    /// Remaining validity and rotation threshold of the current certificate.
    ///
    /// Returns [`Lifespan::EXPIRED`] when there is no certificate, it has
    /// expired, or [`manual_revoke`](Self::manual_revoke) was called since the
    /// last evaluation. The revoke request is cleared by this call.
    pub fn lifespan(&self) -> Lifespan {
        self.inner.lifespan()
    }

    /// Force the next lifespan evaluation to report an expired certificate.
    pub fn manual_revoke(&self) {
        self.inner.revoke_requested.store(true, Ordering::Release);
        info!("Manual certificate revoke requested");
    }

    /// Refresh the credential, waiting at most the configured refresh timeout.
    ///
    /// On timeout the refresh keeps running in the background and installs
    /// its result when it completes; the caller gets
    /// [`Error::RefreshTimeout`].
    pub fn refresh_keys(&self) -> Result<()> {
        self.inner.bounded_refresh(Renewal::IfStale, "manual")
    }

    /// One tick of the rotation loop.
    ///
    /// Does nothing while `remain > rotate_at`. Otherwise refreshes; a
    /// failure returns the delay to wait before the next tick, a success
    /// resets the backoff. Panics raised during the tick are caught and
    /// reported as a failure.
    pub fn auto_update(&self) -> std::result::Result<RotationStatus, RotationFailure> {
        let span = rotation_span!();
        let _entered = span.enter();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.rotation_tick()));

        let error = match outcome {
            Ok(Ok(status)) => return Ok(status),
            Ok(Err(err)) => err,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Rotation tick panicked");
                Error::internal(format!("rotation tick panicked: {message}"))
            }
        };

        let retry_in = self.inner.backoff.duration();
        warn!(
            error = %error,
            retry_in_ms = retry_in.as_millis() as u64,
            "Failed to update certificate, will try again"
        );
        Err(RotationFailure { retry_in, source: error })
    }

    fn rotation_tick(&self) -> Result<RotationStatus> {
        let current = self.inner.provider.certificate();
        let lifespan = self.inner.evaluate(current.as_deref());
        if !lifespan.rotation_due() {
            debug!(
                remain_secs = lifespan.remain.as_secs(),
                rotate_at_secs = lifespan.rotate_at.as_secs(),
                "Rotation time not reached"
            );
            return Ok(RotationStatus::NotDue(lifespan));
        }

        // The evaluation above may have consumed a revoke request, so the
        // refresh must not skip signing on its own evaluation. It still skips
        // when a concurrent refresh has replaced the certificate seen here.
        let seen = current.map(|cert| cert.serial.clone());
        self.inner.bounded_refresh(Renewal::Replace(seen), "rotation")?;
        self.inner.backoff.reset();

        let lifespan = Lifespan::at(
            self.inner.provider.certificate().as_deref(),
            Utc::now(),
            self.inner.settings.refresh_rate,
        );
        Ok(RotationStatus::Rotated(lifespan))
    }

    fn has_live_certificate(&self) -> bool {
        self.inner
            .provider
            .certificate()
            .is_some_and(|cert| !cert.is_expired_at(Utc::now()))
    }

    pub fn provider(&self) -> &Arc<dyn KeyProvider> {
        &self.inner.provider
    }

    pub fn trust_store(&self) -> &Arc<dyn TrustStore> {
        &self.inner.trust_store
    }

    pub fn client_trust_store(&self) -> &Arc<dyn TrustStore> {
        &self.inner.client_trust_store
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.inner.settings
    }
}

impl Inner {
    fn lifespan(&self) -> Lifespan {
        self.evaluate(self.provider.certificate().as_deref())
    }

    /// Lifespan of `cert`, consuming a pending revoke request.
    fn evaluate(&self, cert: Option<&IssuedCertificate>) -> Lifespan {
        if self.revoke_requested.swap(false, Ordering::AcqRel) {
            debug!("Consumed manual revoke request");
            return Lifespan::EXPIRED;
        }
        Lifespan::at(cert, Utc::now(), self.settings.refresh_rate)
    }

    fn current_serial(&self) -> Option<String> {
        self.provider.certificate().map(|cert| cert.serial.clone())
    }

    /// Run [`refresh`](Self::refresh) on its own thread and wait for it, at
    /// most `refresh_timeout`.
    fn bounded_refresh(self: &Arc<Self>, renewal: Renewal, trigger: &'static str) -> Result<()> {
        let timeout = self.settings.refresh_timeout();
        let timeout_ms = self.settings.refresh_timeout_ms;
        let (tx, rx) = mpsc::sync_channel(1);

        let inner = Arc::clone(self);
        let span = refresh_span!(trigger, forced = matches!(renewal, Renewal::Replace(_)));
        thread::Builder::new()
            .name("mtls-refresh".to_string())
            .spawn(move || {
                let _entered = span.enter();
                // The receiver is gone after a timeout; the result is dropped.
                let _ = tx.send(inner.refresh(renewal));
            })
            .map_err(|e| Error::internal(format!("failed to spawn refresh worker: {e}")))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms, trigger, "Certificate refresh timed out, attempt continues in background");
                Err(Error::RefreshTimeout { timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!(trigger, "Refresh worker exited without a result");
                Err(Error::internal("refresh worker exited without a result"))
            }
        }
    }

    /// The unbounded refresh protocol with provider-driven retries.
    ///
    /// Concurrent refreshes queue on the refresh gate and re-check the
    /// certificate once admitted. A waiter stops waiting once the holder has
    /// run for `refresh_timeout`.
    fn refresh(&self, mut renewal: Renewal) -> Result<()> {
        let _pass = self.refresh_gate.enter(self.settings.refresh_timeout());
        let max_attempts = self.settings.max_refresh_attempts.max(1);

        let mut attempt = 1;
        loop {
            let err = match self.refresh_attempt(&mut renewal) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let retriable = self.provider.signal_failure(&err);
            if !retriable || attempt >= max_attempts {
                debug!(attempt, retriable, error = %err, "Certificate refresh failed");
                return Err(err);
            }

            warn!(attempt, max_attempts, error = %err, "Retrying certificate refresh");
            attempt += 1;
        }
    }

    fn refresh_attempt(&self, renewal: &mut Renewal) -> Result<()> {
        if !self.provider.ready() {
            self.prepare_key()?;
        }

        let current = self.provider.certificate();
        let seen = current.as_ref().map(|cert| cert.serial.clone());
        match renewal {
            Renewal::IfStale => {
                let lifespan = self.evaluate(current.as_deref());
                if lifespan.is_fresh() {
                    debug!(
                        remain_secs = lifespan.remain.as_secs(),
                        rotate_at_secs = lifespan.rotate_at.as_secs(),
                        "Certificate still fresh, skipping signing"
                    );
                    return Ok(());
                }
                // Retries keep signing: this evaluation may have consumed a revoke.
                *renewal = Renewal::Replace(seen.clone());
            }
            Renewal::Replace(expected) => {
                if seen.is_some() && seen != *expected {
                    debug!(serial = ?seen, "Certificate already replaced, skipping signing");
                    return Ok(());
                }
            }
        }

        debug!("Creating certificate signing request");
        let request = self
            .provider
            .certificate_request(&self.identity)
            .map_err(|source| Error::SigningRequestFailed { source })?;

        debug!("Requesting certificate from CA");
        let pem = self
            .authority
            .sign_csr(&request)
            .map_err(|source| Error::CaSigningFailed { source })?;

        let installed = self.current_serial();
        if installed.is_some() && installed != seen {
            warn!(serial = ?installed, "Discarding signed certificate, a newer one was installed");
            return Ok(());
        }

        self.provider
            .set_certificate_pem(&pem)
            .map_err(|source| Error::CertificateInstallFailed { source })?;

        if self.provider.persistent() {
            debug!("Storing certificate");
            self.provider.store().map_err(|source| Error::PersistenceFailed { source })?;
        }

        match self.provider.certificate() {
            Some(cert) => info!(
                subject = %cert.subject,
                serial = %cert.serial,
                not_after = %cert.not_after,
                "Installed new certificate"
            ),
            None => warn!("Provider reports no certificate after installation"),
        }
        Ok(())
    }

    /// Load stored key material, generating a new key when none exists.
    fn prepare_key(&self) -> Result<()> {
        debug!("Key and certificate are not ready, loading");
        match self.provider.load() {
            Ok(()) => Ok(()),
            Err(ProviderError::CertificateUnavailable) => {
                debug!("Loaded key has no usable certificate");
                Ok(())
            }
            Err(err) => {
                let request = self.identity.effective_key_request();
                debug!(
                    error = %err,
                    algorithm = %request.algorithm,
                    size = request.size,
                    "No stored key pair, generating a new one"
                );
                self.provider
                    .generate(request.algorithm, request.size)
                    .map_err(|source| Error::KeyGenerationFailed { source })
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
