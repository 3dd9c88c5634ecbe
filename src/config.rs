//! Process configuration
//!
//! Read once at startup (after `dotenvy` has loaded `.env`) and handed to the
//! services that need it. Nothing reads the environment after this point.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_PORT: u16 = 5000;
/// One year
pub const MAX_JWT_EXPIRES_IN_HOURS: i64 = 24 * 365;
const DEFAULT_JWT_EXPIRES_IN_HOURS: i64 = 24;
const DEFAULT_STARTING_BALANCE: i64 = 100_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// JWT signing settings
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expires_in_hours: i64,
}

/// External quote provider settings. Both are optional: without them cached
/// quotes are still served, but refreshes fail.
#[derive(Debug, Clone, Default)]
pub struct MarketDataConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub frontend_url: Option<String>,
    pub auth: AuthConfig,
    pub market_data: MarketDataConfig,
    /// Cash credited to a newly created virtual portfolio
    pub starting_balance: Decimal,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let port = parsed(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT);
        let starting_balance =
            parsed(&lookup, "STARTING_BALANCE")?.unwrap_or(Decimal::from(DEFAULT_STARTING_BALANCE));
        if starting_balance <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                name: "STARTING_BALANCE",
                value: starting_balance.to_string(),
            });
        }

        Ok(Self {
            database_url,
            port,
            frontend_url: optional(&lookup, "FRONTEND_URL"),
            auth: AuthConfig::from_lookup(&lookup)?,
            market_data: MarketDataConfig {
                api_url: optional(&lookup, "MARKET_DATA_API_URL"),
                api_key: optional(&lookup, "MARKET_DATA_API_KEY"),
            },
            starting_balance,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = required(&lookup, "JWT_SECRET")?;
        let jwt_expires_in_hours =
            parsed(&lookup, "JWT_EXPIRES_IN_HOURS")?.unwrap_or(DEFAULT_JWT_EXPIRES_IN_HOURS);
        if !(1..=MAX_JWT_EXPIRES_IN_HOURS).contains(&jwt_expires_in_hours) {
            return Err(ConfigError::Invalid {
                name: "JWT_EXPIRES_IN_HOURS",
                value: jwt_expires_in_hours.to_string(),
            });
        }

        Ok(Self {
            jwt_secret,
            jwt_expires_in_hours,
        })
    }
}

fn optional<F>(lookup: &F, name: &'static str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parsed<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/edutrade"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.starting_balance, Decimal::from(100_000));
        assert_eq!(config.auth.jwt_expires_in_hours, 24);
        assert!(config.frontend_url.is_none());
        assert!(config.market_data.api_url.is_none());
    }

    #[test]
    fn test_missing_required_variable() {
        let result = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")]));
        assert!(matches!(result, Err(ConfigError::Missing("JWT_SECRET"))));

        let result = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s"), ("DATABASE_URL", "  ")]));
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))), "Blank counts as missing");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PORT", .. })));

        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("STARTING_BALANCE", "-5"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "STARTING_BALANCE", .. })));

        for hours in ["0", "9000", "3000000000000"] {
            let result = AuthConfig::from_lookup(lookup_from(&[
                ("JWT_SECRET", "s"),
                ("JWT_EXPIRES_IN_HOURS", hours),
            ]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { name: "JWT_EXPIRES_IN_HOURS", .. })),
                "{} hours should be rejected",
                hours
            );
        }
    }

    #[test]
    fn test_overrides_parsed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("PORT", "8080"),
            ("STARTING_BALANCE", "25000.50"),
            ("MARKET_DATA_API_URL", "https://quotes.example.com/v1"),
            ("MARKET_DATA_API_KEY", "key"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.starting_balance.to_string(), "25000.50");
        assert_eq!(config.market_data.api_url.as_deref(), Some("https://quotes.example.com/v1"));
        assert_eq!(config.market_data.api_key.as_deref(), Some("key"));
    }
}
