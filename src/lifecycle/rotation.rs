//! Background rotation loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::lifespan::Lifespan;
use super::manager::CertificateManager;
use crate::errors::Error;

/// Outcome of a rotation tick that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStatus {
    /// More than the rotation threshold remains; nothing was done.
    NotDue(Lifespan),
    /// A refresh ran; carries the lifespan of the installed certificate.
    Rotated(Lifespan),
}

/// A failed rotation tick and how long the scheduler should wait before the
/// next one.
#[derive(thiserror::Error, Debug)]
#[error("certificate rotation failed, retrying in {retry_in:?}: {source}")]
pub struct RotationFailure {
    pub retry_in: Duration,
    #[source]
    pub source: Error,
}

/// Drives [`CertificateManager::auto_update`] on a tokio task.
///
/// Ticks every `interval` while rotations succeed or are not due, and waits
/// the backoff delay returned by a failed tick instead.
#[derive(Debug)]
pub struct RotationController {
    manager: CertificateManager,
    interval: Duration,
    shutdown: CancellationToken,
}

impl RotationController {
    /// Create a controller ticking at the manager's configured rotation interval.
    pub fn new(manager: CertificateManager) -> Self {
        let interval = manager.settings().rotation_interval();
        Self { manager, interval, shutdown: CancellationToken::new() }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop the loop when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Spawn the loop on the current runtime.
    pub fn spawn(self) -> RotationHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());
        RotationHandle { shutdown, task }
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Certificate rotation loop started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let manager = self.manager.clone();
            let delay = match tokio::task::spawn_blocking(move || manager.auto_update()).await {
                Ok(Ok(RotationStatus::Rotated(lifespan))) => {
                    info!(
                        remain_secs = lifespan.remain.as_secs(),
                        rotate_at_secs = lifespan.rotate_at.as_secs(),
                        "Certificate rotated"
                    );
                    self.interval
                }
                Ok(Ok(RotationStatus::NotDue(_))) => self.interval,
                Ok(Err(failure)) => {
                    warn!(
                        error = %failure.source,
                        retry_in_ms = failure.retry_in.as_millis() as u64,
                        "Certificate rotation failed"
                    );
                    failure.retry_in
                }
                Err(join_error) => {
                    error!(error = %join_error, "Rotation tick did not complete");
                    self.interval
                }
            };

            debug!(delay_ms = delay.as_millis() as u64, "Waiting for next rotation tick");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Certificate rotation loop stopped");
    }
}

/// Handle to a spawned rotation loop.
#[derive(Debug)]
pub struct RotationHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RotationHandle {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Rotation loop task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
