//! Engine configuration, loaded from `GATE_*` environment variables.

use anyhow::{anyhow, Result};
use std::str::FromStr;
use std::time::Duration;

/// Delay before the post-beta redirect, long enough to read the notice
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 3_000;

/// Freshness window for the cached bypass config (5 minutes)
pub const DEFAULT_BYPASS_CONFIG_TTL_SECS: i64 = 300;

/// Longest accepted bypass config freshness window (one week)
pub const MAX_BYPASS_CONFIG_TTL_SECS: i64 = 7 * 24 * 60 * 60;

pub const DEFAULT_BETA_POLL_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_SUBSCRIBE_ROUTE: &str = "/subscribe";

/// Access engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Base URL of the membership API
    pub api_base_url: String,
    /// Bearer credential for the current session
    pub session_token: Option<String>,
    pub redirect_delay_ms: u64,
    pub bypass_config_ttl_secs: i64,
    pub beta_poll_interval_secs: u64,
    /// Route the user is sent to when the beta ends without a subscription
    pub subscribe_route: String,
    pub request_timeout_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            session_token: None,
            redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            bypass_config_ttl_secs: DEFAULT_BYPASS_CONFIG_TTL_SECS,
            beta_poll_interval_secs: DEFAULT_BETA_POLL_INTERVAL_SECS,
            subscribe_route: DEFAULT_SUBSCRIBE_ROUTE.to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl GateConfig {
    /// Load from the process environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_base_url: text("GATE_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            session_token: text("GATE_SESSION_TOKEN"),
            redirect_delay_ms: parse_number("GATE_REDIRECT_DELAY_MS", text("GATE_REDIRECT_DELAY_MS"))?
                .unwrap_or(defaults.redirect_delay_ms),
            bypass_config_ttl_secs: parse_ttl(text("GATE_BYPASS_TTL_SECS"))?
                .unwrap_or(defaults.bypass_config_ttl_secs),
            beta_poll_interval_secs: parse_number("GATE_BETA_POLL_SECS", text("GATE_BETA_POLL_SECS"))?
                .unwrap_or(defaults.beta_poll_interval_secs),
            subscribe_route: text("GATE_SUBSCRIBE_ROUTE").unwrap_or(defaults.subscribe_route),
            request_timeout_secs: parse_number(
                "GATE_REQUEST_TIMEOUT_SECS",
                text("GATE_REQUEST_TIMEOUT_SECS"),
            )?
            .unwrap_or(defaults.request_timeout_secs),
        })
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn beta_poll_interval(&self) -> Duration {
        Duration::from_secs(self.beta_poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Clamped to `0..=MAX_BYPASS_CONFIG_TTL_SECS` for hand-built configs
    pub fn bypass_config_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.bypass_config_ttl_secs
                .clamp(0, MAX_BYPASS_CONFIG_TTL_SECS),
        )
    }
}

fn parse_number<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, value))
    })
    .transpose()
}

fn parse_ttl(raw: Option<String>) -> Result<Option<i64>> {
    let ttl = parse_number::<i64>("GATE_BYPASS_TTL_SECS", raw)?;
    match ttl {
        Some(secs) if !(0..=MAX_BYPASS_CONFIG_TTL_SECS).contains(&secs) => Err(anyhow!(
            "GATE_BYPASS_TTL_SECS must be between 0 and {}, got {}",
            MAX_BYPASS_CONFIG_TTL_SECS,
            secs
        )),
        _ => Ok(ttl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GateConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GateConfig::default());
        assert_eq!(config.redirect_delay(), Duration::from_secs(3));
        assert_eq!(config.bypass_config_ttl(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_overrides() {
        let config = GateConfig::from_lookup(lookup(&[
            ("GATE_API_URL", "https://members.example.com/"),
            ("GATE_SESSION_TOKEN", "tok_123"),
            ("GATE_REDIRECT_DELAY_MS", "1500"),
            ("GATE_BYPASS_TTL_SECS", "30"),
            ("GATE_BETA_POLL_SECS", "15"),
            ("GATE_SUBSCRIBE_ROUTE", "/pricing"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://members.example.com");
        assert_eq!(config.session_token.as_deref(), Some("tok_123"));
        assert_eq!(config.redirect_delay_ms, 1500);
        assert_eq!(config.bypass_config_ttl_secs, 30);
        assert_eq!(config.beta_poll_interval(), Duration::from_secs(15));
        assert_eq!(config.subscribe_route, "/pricing");
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = GateConfig::from_lookup(lookup(&[
            ("GATE_SESSION_TOKEN", "  "),
            ("GATE_REDIRECT_DELAY_MS", ""),
        ]))
        .unwrap();
        assert_eq!(config.session_token, None);
        assert_eq!(config.redirect_delay_ms, DEFAULT_REDIRECT_DELAY_MS);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = GateConfig::from_lookup(lookup(&[("GATE_BETA_POLL_SECS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("GATE_BETA_POLL_SECS"));
    }

    #[test]
    fn test_bypass_ttl_out_of_range_is_error() {
        for raw in ["-5", "9223372036854775807", "604801"] {
            let err = GateConfig::from_lookup(lookup(&[("GATE_BYPASS_TTL_SECS", raw)])).unwrap_err();
            assert!(err.to_string().contains("GATE_BYPASS_TTL_SECS"), "{}", raw);
        }

        let config = GateConfig::from_lookup(lookup(&[("GATE_BYPASS_TTL_SECS", "604800")])).unwrap();
        assert_eq!(config.bypass_config_ttl(), chrono::Duration::weeks(1));
    }

    #[test]
    fn test_hand_built_ttl_is_clamped() {
        let config = GateConfig {
            bypass_config_ttl_secs: i64::MAX,
            ..GateConfig::default()
        };
        assert_eq!(config.bypass_config_ttl(), chrono::Duration::weeks(1));

        let config = GateConfig {
            bypass_config_ttl_secs: -1,
            ..GateConfig::default()
        };
        assert_eq!(config.bypass_config_ttl(), chrono::Duration::zero());
    }
}
