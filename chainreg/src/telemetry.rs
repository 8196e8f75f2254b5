//! Console logging setup.
//!
//! Filter directives come from `RUST_LOG`; when unset, the level passed to
//! [`Telemetry::with_log_level`] applies (default `info`).

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration for the binary.
#[derive(Debug, Default)]
pub struct Telemetry {
    log_level: Option<String>,
}

impl Telemetry {
    /// Creates a new, empty [`Telemetry`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level filter used when `RUST_LOG` is not set.
    ///
    /// Accepts any valid [`EnvFilter`] directive string (e.g. `"debug"`,
    /// `"chainreg=debug,reqwest=info"`).
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Installs the global subscriber. Later calls are ignored.
    pub fn register(self) {
        let fallback = self.log_level.as_deref().unwrap_or("info");
        let installed = tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    }
}
