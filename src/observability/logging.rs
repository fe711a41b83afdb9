//! # Structured Logging
//!
//! Span macros for the refresh protocol and the rotation loop, plus the
//! subscriber installation used by embedding binaries.
//!
//! Every span carries a fresh `attempt_id` so that concurrent refreshes
//! triggered from several handshakes can be told apart in the output.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::errors::{Error, Result};

/// Create a tracing span for one refresh of the credential.
///
/// ```rust,ignore
/// let span = refresh_span!("handshake");
/// let span = refresh_span!("rotation", attempt = 2);
/// ```
#[macro_export]
macro_rules! refresh_span {
    ($trigger:expr) => {
        $crate::tracing::debug_span!(
            "certificate_refresh",
            trigger = %$trigger,
            attempt_id = %$crate::uuid::Uuid::new_v4()
        )
    };
    ($trigger:expr, $($field:tt)*) => {
        $crate::tracing::debug_span!(
            "certificate_refresh",
            trigger = %$trigger,
            attempt_id = %$crate::uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a rotation-loop tick
#[macro_export]
macro_rules! rotation_span {
    () => {
        $crate::tracing::debug_span!("rotation_tick", tick_id = %$crate::uuid::Uuid::new_v4())
    };
    ($($field:tt)*) => {
        $crate::tracing::debug_span!(
            "rotation_tick",
            tick_id = %$crate::uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails with
/// [`Error::Config`] if the level is not a valid filter or a global
/// subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level).map_err(|e| {
            Error::config_with_source(format!("invalid log level '{}'", settings.level), Box::new(e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if settings.json { builder.json().try_init() } else { builder.try_init() };

    installed.map_err(|e| Error::config_with_source("failed to install log subscriber", e))
}
