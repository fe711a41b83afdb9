//! # Observability
//!
//! Structured logging for the lifecycle manager. Log fields are key/value
//! pairs (`remain_secs`, `rotate_at_secs`, `attempt`) so rotations can be
//! followed in JSON output.

pub mod logging;

pub use logging::init_logging;
