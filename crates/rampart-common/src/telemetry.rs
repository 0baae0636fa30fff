//! Tracing subscriber setup
//!
//! The engine only emits `tracing` events; whoever embeds it calls
//! [`init_tracing`] once at startup to decide where they go.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::env::EnvSource;
use crate::Error;

/// Environment variable selecting the log format: `json` or `text`
pub const ENV_LOG_FORMAT: &str = "RAMPART_LOG_FORMAT";

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,rampart_policy=debug,rampart_common=debug";

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Filter directives used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Apply [`ENV_LOG_FORMAT`] on top of the current values
    pub fn with_env_overrides(mut self, env: &dyn EnvSource) -> Self {
        if let Some(format) = env.var(ENV_LOG_FORMAT) {
            self.json = format.trim().eq_ignore_ascii_case("json");
        }
        self
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed (e.g., a second call).
pub fn init_tracing(config: TelemetryConfig) -> Result<(), Error> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| Error::internal_with_context("telemetry", e.to_string()))?;

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        (Some(layer), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| Error::internal_with_context("telemetry", e.to_string()))?;

    tracing::debug!(json = config.json, "tracing initialized");
    Ok(())
}
