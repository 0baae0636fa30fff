//! Translator configuration
//!
//! Loaded from YAML (the controller's config file) and then overridden from
//! the environment. Environment access goes through [`EnvSource`] so tests
//! never touch process-global state.

use serde::{Deserialize, Serialize};

use rampart_common::yaml::parse_yaml_document;

pub use rampart_common::env::{EnvSource, OsEnv};

/// Environment variable that disables EndpointSlice routing
pub const ENV_ENDPOINT_ROUTING_DISABLED: &str = "RAMPART_ENDPOINT_ROUTING_DISABLED";

/// Environment variable that enables merged gateways
pub const ENV_MERGE_GATEWAYS: &str = "RAMPART_MERGE_GATEWAYS";

/// Default OIDC discovery request timeout
pub const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Default lifetime of a cached discovery document
pub const DEFAULT_DISCOVERY_CACHE_TTL_SECS: u64 = 3600;

/// Settings for one translation pass
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatorConfig {
    /// Route to the Service ClusterIP instead of individual endpoints
    pub endpoint_routing_disabled: bool,

    /// All Gateways of a GatewayClass share one IR entry keyed by class name
    pub merge_gateways: bool,

    /// OIDC discovery client settings
    pub discovery: DiscoveryConfig,
}

/// OIDC well-known discovery settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Cache discovery documents per issuer
    pub cache_enabled: bool,

    /// How long a cached document stays valid, in seconds
    pub cache_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            cache_enabled: true,
            cache_ttl_secs: DEFAULT_DISCOVERY_CACHE_TTL_SECS,
        }
    }
}

impl TranslatorConfig {
    /// Parse configuration from a YAML document; empty input yields defaults
    pub fn from_yaml(input: &str) -> Result<Self, rampart_common::Error> {
        let value = parse_yaml_document(input)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| rampart_common::Error::validation_for("TranslatorConfig", e.to_string()))
    }

    /// Apply environment overrides on top of the loaded values
    ///
    /// Unparseable boolean values are ignored with a warning.
    pub fn with_env_overrides(mut self, env: &dyn EnvSource) -> Self {
        if let Some(v) = env_flag(env, ENV_ENDPOINT_ROUTING_DISABLED) {
            self.endpoint_routing_disabled = v;
        }
        if let Some(v) = env_flag(env, ENV_MERGE_GATEWAYS) {
            self.merge_gateways = v;
        }
        self
    }
}

fn env_flag(env: &dyn EnvSource, key: &str) -> Option<bool> {
    let raw = env.var(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(variable = key, value = %raw, "ignoring non-boolean environment override");
            None
        }
    }
}
