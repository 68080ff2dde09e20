//! Client configuration.
//!
//! Backend locations and local settings come from the environment, with a
//! `.env` file picked up through `dotenvy` when present.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_POSTGRES_URL: &str = "http://localhost:5000";
const DEFAULT_SCHEDULER_URL: &str = "http://localhost:5001";
const DEFAULT_INFLUX_URL: &str = "http://localhost:5002";
const DEFAULT_STORE_PATH: &str = ".harvest_session";
const DEFAULT_MESSAGE_KEY: &str = "message";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Metadata connector: login, registration, catalog and subscription lists.
    pub postgres_url: String,
    /// Scheduler: subscribe / unsubscribe / resubscribe.
    pub scheduler_url: String,
    /// Time-series connector: telemetry reads.
    pub influx_url: String,
    /// Directory of the sled database holding the credential triple.
    pub store_path: PathBuf,
    /// JSON key the backends use for their status text.
    pub message_key: String,
    pub request_timeout: Duration,
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            postgres_url: DEFAULT_POSTGRES_URL.to_string(),
            scheduler_url: DEFAULT_SCHEDULER_URL.to_string(),
            influx_url: DEFAULT_INFLUX_URL.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            message_key: DEFAULT_MESSAGE_KEY.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_json: false,
        }
    }
}

impl ClientConfig {
    /// Load from the process environment (after reading `.env`, if any).
    pub fn from_env() -> Self {
        // Missing .env is the normal case outside development
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let timeout = lookup("HARVEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let log_json = lookup("HARVEST_LOG_JSON")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.log_json);

        Self {
            postgres_url: lookup("HARVEST_POSTGRES_URL")
                .map(|u| normalize_base(&u))
                .unwrap_or(defaults.postgres_url),
            scheduler_url: lookup("HARVEST_SCHEDULER_URL")
                .map(|u| normalize_base(&u))
                .unwrap_or(defaults.scheduler_url),
            influx_url: lookup("HARVEST_INFLUX_URL")
                .map(|u| normalize_base(&u))
                .unwrap_or(defaults.influx_url),
            store_path: lookup("HARVEST_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            message_key: lookup("HARVEST_MESSAGE_KEY").unwrap_or(defaults.message_key),
            request_timeout: timeout,
            log_json,
        }
    }

    /// Point every service at the same host (single gateway deployments).
    pub fn with_base_url(base: &str) -> Self {
        let base = normalize_base(base);
        Self {
            postgres_url: base.clone(),
            scheduler_url: base.clone(),
            influx_url: base,
            ..Self::default()
        }
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HARVEST_POSTGRES_URL", "http://db.internal:8080/"),
            ("HARVEST_TIMEOUT_SECS", "5"),
            ("HARVEST_LOG_JSON", "true"),
        ]);
        let cfg = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.postgres_url, "http://db.internal:8080");
        assert_eq!(cfg.scheduler_url, DEFAULT_SCHEDULER_URL);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert!(cfg.log_json);
        assert_eq!(cfg.message_key, "message");
    }

    #[test]
    fn unparsable_timeout_falls_back() {
        let cfg = ClientConfig::from_lookup(|k| {
            (k == "HARVEST_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn single_base_url_covers_all_services() {
        let cfg = ClientConfig::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(cfg.postgres_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.scheduler_url, "http://127.0.0.1:9000");
        assert_eq!(cfg.influx_url, "http://127.0.0.1:9000");
    }
}
