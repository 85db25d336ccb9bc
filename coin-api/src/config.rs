use dotenv::dotenv;
use std::{env, str::FromStr};
use thiserror::Error;

/// `DATABASE_URL` value selecting the in-process store.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Database configuration
    pub database_url: String,
    pub database_max_connections: u32,

    // Security
    pub jwt_secret: String,
    pub jwt_expiration: u64, // in seconds
    pub allowed_origins: Vec<String>,
    pub rate_limit: usize,
    pub trust_forwarded_for: bool,
    pub bcrypt_cost: u32,

    // Rewards
    pub day_offset_minutes: i32,
    pub client_amount_cap: Option<i64>,
    pub rollover_interval_secs: u64,
}

fn var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

/// `CLIENT_AMOUNT_CAP`: unset or blank means uncapped; negatives are refused.
fn parse_amount_cap(raw: Option<&str>) -> Result<Option<i64>, ConfigError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(cap) if cap >= 0 => Ok(Some(cap)),
        _ => Err(ConfigError::Invalid {
            key: "CLIENT_AMOUNT_CAP",
            value: raw.to_string(),
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = var_or("SERVER_PORT", 5000u16)?;

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections = var_or("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        // 7 days by default
        let jwt_expiration = var_or("JWT_EXPIRATION", 7 * 24 * 60 * 60u64)?;

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let rate_limit = var_or("RATE_LIMIT", 30usize)?;
        let trust_forwarded_for = var_or("TRUST_FORWARDED_FOR", false)?;
        let bcrypt_cost = var_or("BCRYPT_COST", 10u32)?;

        let day_offset_minutes = var_or("DAY_BOUNDARY_UTC_OFFSET_MINUTES", 0i32)?;
        if day_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid {
                key: "DAY_BOUNDARY_UTC_OFFSET_MINUTES",
                value: day_offset_minutes.to_string(),
            });
        }

        let client_amount_cap = parse_amount_cap(env::var("CLIENT_AMOUNT_CAP").ok().as_deref())?;

        let rollover_interval_secs = var_or("ROLLOVER_INTERVAL_SECS", 60u64)?;

        Ok(Config {
            server_host,
            server_port,
            database_url,
            database_max_connections,
            jwt_secret,
            jwt_expiration,
            allowed_origins,
            rate_limit,
            trust_forwarded_for,
            bcrypt_cost,
            day_offset_minutes,
            client_amount_cap,
            rollover_interval_secs,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            database_url: MEMORY_DATABASE.to_string(),
            database_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            jwt_expiration: 7 * 24 * 60 * 60,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            rate_limit: 1000,
            trust_forwarded_for: false,
            bcrypt_cost: 4,
            day_offset_minutes: 0,
            client_amount_cap: None,
            rollover_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_cap_must_not_be_negative() {
        assert_eq!(parse_amount_cap(None).unwrap(), None);
        assert_eq!(parse_amount_cap(Some("  ")).unwrap(), None);
        assert_eq!(parse_amount_cap(Some("0")).unwrap(), Some(0));
        assert_eq!(parse_amount_cap(Some(" 500 ")).unwrap(), Some(500));

        let err = parse_amount_cap(Some("-100")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "CLIENT_AMOUNT_CAP",
                ..
            }
        ));
        assert!(parse_amount_cap(Some("lots")).is_err());
    }
}
