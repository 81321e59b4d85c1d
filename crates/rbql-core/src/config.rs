//! Engine configuration that embedders can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Surface internal error details alongside classified errors.
    pub debug: bool,

    /// Separator used by the default `ARRAY_AGG` post-processor.
    pub array_agg_separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            array_agg_separator: "|".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RBQL_DEBUG`: "1"/"true" enables debug details
    /// - `RBQL_ARRAY_AGG_SEPARATOR`: default ARRAY_AGG join separator
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RBQL_DEBUG") {
            cfg.debug = s == "1" || s.eq_ignore_ascii_case("true");
        }

        if let Ok(s) = std::env::var("RBQL_ARRAY_AGG_SEPARATOR") {
            cfg.array_agg_separator = s;
        }

        cfg
    }
}
