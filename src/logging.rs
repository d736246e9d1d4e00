//! Logging configuration.
//!
//! onion reports failures through [`tracing`]. Every event it emits uses the
//! target [`TARGET`], which the fmt subscriber prints as the line prefix.
//!
//! Two classes of failure are logged:
//!
//! | Source | Level | Gated by [`LogLevel`] |
//! |---|---|---|
//! | [`Data::json`](crate::Data::json) rejects the body | `WARN` | yes |
//! | [`Data::error`](crate::Data::error) / [`Data::write_json`](crate::Data::write_json) | `ERROR` | no |
//!
//! Client-caused decode failures are routine under load, so they can be
//! silenced. Server-side failures are always recorded.
//!
//! A [`Logging`] value is built once, handed to
//! [`Router::with_logging`](crate::Router::with_logging), and borrowed by
//! every request context after that. Configure it before serving.

use std::fmt;

use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Target attached to every event onion emits.
pub const TARGET: &str = "onion";

/// Verbosity switch for client-caused failures.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogLevel {
    /// Log everything (default).
    #[default]
    All,
    /// Hide decode failures. Internal errors are still logged.
    None,
}

/// Logging configuration shared by every request context of a router.
#[derive(Clone, Debug, Default)]
pub struct Logging {
    level: LogLevel,
}

impl Logging {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Logs a rejected request payload, unless the level is [`LogLevel::None`].
    pub(crate) fn invalid_request(&self, err: &dyn fmt::Display) {
        if self.level != LogLevel::None {
            warn!(target: TARGET, "{err}");
        }
    }

    /// Logs a server-side failure. Always emitted.
    pub(crate) fn internal_error(&self, err: &dyn fmt::Display) {
        error!(target: TARGET, "internal server error: {err}");
    }
}

/// Installs a stderr sink with timestamps and the `onion` prefix.
///
/// Filtering follows `RUST_LOG`, defaulting to `onion=info`. Does nothing
/// if a global subscriber is already installed, so applications that bring
/// their own `tracing` setup can skip this entirely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{TARGET}=info")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
