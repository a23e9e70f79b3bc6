//! Configuration loading and representation.
//!
//! Everything comes from environment variables; [`AppConfig::from_lookup`] takes
//! any key/value source so tests never touch the process environment.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PAYMENTS_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
    /// Payment provider base URL; `None` selects the in-memory gateway.
    pub payments_host: Option<String>,
    /// Our own public base URL, used to build the webhook URL handed to the provider.
    pub public_host: String,
    pub payments_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("API_PORT") {
            Some(raw) => parse("API_PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(raw) => parse_flag("USE_PERSISTENT_STORES", &raw)?,
            None => false,
        };

        let database_url = get("DATABASE_URL").or_else(|| {
            let host = get("DB_HOST")?;
            let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
            let user = get("DB_USER").unwrap_or_else(|| "postgres".to_string());
            let password = get("DB_PASSWORD").unwrap_or_default();
            let name = get("DB_NAME").unwrap_or_else(|| "postgres".to_string());
            Some(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
        });
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let payments_timeout = match get("PAYMENTS_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse("PAYMENTS_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(DEFAULT_PAYMENTS_TIMEOUT_SECS),
        };

        Ok(Self {
            port,
            database_url,
            use_persistent_stores,
            payments_host: get("VEHICLE_PLATFORM_PAYMENTS_HOST"),
            public_host: get("VEHICLE_PLATFORM_SALES_HOST")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            payments_timeout,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.payments_host, None);
        assert_eq!(cfg.public_host, "http://localhost:8080");
        assert_eq!(cfg.payments_timeout, Duration::from_secs(3));
    }

    #[test]
    fn database_url_is_assembled_from_parts() {
        let cfg = config(&[
            ("DB_HOST", "db"),
            ("DB_PORT", "5433"),
            ("DB_USER", "carlot"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "sales"),
        ])
        .unwrap();
        assert_eq!(
            cfg.database_url.as_deref(),
            Some("postgres://carlot:secret@db:5433/sales")
        );
    }

    #[test]
    fn explicit_database_url_wins() {
        let cfg = config(&[("DATABASE_URL", "postgres://x/y"), ("DB_HOST", "ignored")]).unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://x/y"));
    }

    #[test]
    fn persistent_stores_need_a_database() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn malformed_values_are_reported() {
        assert!(matches!(
            config(&[("API_PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "API_PORT", .. })
        ));
        assert!(matches!(
            config(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { key: "USE_PERSISTENT_STORES", .. })
        ));
    }

    #[test]
    fn public_host_follows_port_unless_set() {
        let cfg = config(&[("API_PORT", "9000")]).unwrap();
        assert_eq!(cfg.public_host, "http://localhost:9000");

        let cfg = config(&[("API_PORT", "9000"), ("VEHICLE_PLATFORM_SALES_HOST", "https://cars.example")])
            .unwrap();
        assert_eq!(cfg.public_host, "https://cars.example");
    }
}
