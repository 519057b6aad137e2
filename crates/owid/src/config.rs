//! Ambient runtime configuration: the HTTP scheme and timeout used to reach
//! a signer endpoint, loaded from `owid.toml` and overridable by environment
//! variables.
//!
//! This is deliberately separate from the signing/verification state
//! machine in [`crate::owid`], which takes every one of these values as an
//! explicit argument instead — `OwidConfig` exists only to give a host
//! application (the CLI, a service) one place to assemble those arguments
//! from.

use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct OwidConfig {
    /// URL scheme used when resolving a signer over HTTP. Tests point this
    /// at `"http"` to talk to a local mock server.
    pub scheme: String,

    /// Request timeout, in milliseconds, for a single signer fetch.
    pub http_timeout_ms: u64,

    /// Synthetic per-request delay applied by an in-memory cache under
    /// test. `None` in production.
    pub cache_delay_ms: Option<u64>,
}

impl Default for OwidConfig {
    fn default() -> Self {
        Self { scheme: "https".to_string(), http_timeout_ms: 5_000, cache_delay_ms: None }
    }
}

impl OwidConfig {
    /// Builds the layered provider: compiled-in defaults, then
    /// `owid.toml` in the current directory if present, then `OWID_*`
    /// environment variables, each layer overriding the last.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(OwidConfig::default()))
            .merge(Toml::file("owid.toml"))
            .merge(Env::prefixed("OWID_"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn cache_delay(&self) -> Option<Duration> {
        self.cache_delay_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_extract_cleanly() {
        let config: OwidConfig = Figment::from(Serialized::defaults(OwidConfig::default())).extract().unwrap();
        assert_eq!(config.scheme, "https");
        assert_eq!(config.http_timeout_ms, 5_000);
        assert_eq!(config.cache_delay_ms, None);
    }

    #[test]
    fn env_overrides_defaults() {
        std::env::set_var("OWID_SCHEME", "http");
        let figment = Figment::from(Serialized::defaults(OwidConfig::default())).merge(Env::prefixed("OWID_"));
        let config: OwidConfig = figment.extract().unwrap();
        std::env::remove_var("OWID_SCHEME");
        assert_eq!(config.scheme, "http");
    }

    #[test]
    fn timeouts_convert_to_duration() {
        let config = OwidConfig { http_timeout_ms: 2_500, ..OwidConfig::default() };
        assert_eq!(config.http_timeout(), Duration::from_millis(2_500));
    }
}
