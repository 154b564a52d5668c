//! Environment-variable configuration. No TOML: every
//! knob is read directly from the process environment, validated once at
//! startup in a composition root (`main.rs`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub database: DatabaseConfig,
    pub redis_url: String,
    pub opensearch_url: String,
    pub jwt_secret: String,
    pub encryption_key: Vec<u8>,
    pub log_level: String,
    pub http_client_timeout_secs: u64,
    pub upstream_stream_chunk_bytes: usize,
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn env_var_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_parse_or("PORT", 8080u16)?;
        let database_url = env_var("DATABASE_URL")?;
        let redis_url = env_var_or("REDIS_URL", "redis://localhost:6379");
        let opensearch_url = env_var_or("OPENSEARCH_URL", "http://localhost:9200");
        let jwt_secret = env_var("JWT_SECRET")?;
        let encryption_key_raw = env_var("ENCRYPTION_KEY")?;
        let encryption_key = encryption_key_raw.into_bytes();
        if encryption_key.len() < 32 {
            return Err(ConfigError::InvalidValue {
                name: "ENCRYPTION_KEY",
                value: "must be at least 32 bytes".to_string(),
            });
        }
        let log_level = env_var_or("LOG_LEVEL", "info");

        let config = Self {
            port,
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_parse_or("DB_MAX_CONNECTIONS", 25u32)?,
                min_connections: env_parse_or("DB_MIN_CONNECTIONS", 5u32)?,
            },
            redis_url,
            opensearch_url,
            jwt_secret,
            encryption_key,
            log_level,
            http_client_timeout_secs: env_parse_or("HTTP_CLIENT_TIMEOUT_SECS", 120u64)?,
            upstream_stream_chunk_bytes: env_parse_or("UPSTREAM_STREAM_CHUNK_BYTES", 8192usize)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_URL",
                value: "must not be empty".to_string(),
            });
        }
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::InvalidValue {
                name: "JWT_SECRET",
                value: "must be at least 16 bytes".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/lumina");
            std::env::set_var("JWT_SECRET", "a-suitably-long-secret-value");
            std::env::set_var("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef");
        }
    }

    fn clear_vars() {
        for var in [
            "DATABASE_URL", "JWT_SECRET", "ENCRYPTION_KEY", "PORT", "REDIS_URL",
            "OPENSEARCH_URL", "LOG_LEVEL", "DB_MAX_CONNECTIONS", "DB_MIN_CONNECTIONS",
        ] {
            unsafe {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_optional_vars_are_absent() {
        clear_vars();
        set_required_vars();
        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url, "redis://localhost:6379");
        clear_vars();
    }

    #[test]
    #[serial]
    fn missing_database_url_is_an_error() {
        clear_vars();
        unsafe {
            std::env::set_var("JWT_SECRET", "a-suitably-long-secret-value");
            std::env::set_var("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef");
        }
        assert!(matches!(GatewayConfig::from_env(), Err(ConfigError::MissingVar("DATABASE_URL"))));
        clear_vars();
    }

    #[test]
    #[serial]
    fn short_encryption_key_is_rejected() {
        clear_vars();
        set_required_vars();
        unsafe {
            std::env::set_var("ENCRYPTION_KEY", "too-short");
        }
        assert!(matches!(
            GatewayConfig::from_env(),
            Err(ConfigError::InvalidValue { name: "ENCRYPTION_KEY", .. })
        ));
        clear_vars();
    }
}
