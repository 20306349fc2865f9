//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::lineage::source::KNOWN_ENGINES;
use crate::lineage::DEFAULT_MAX_DEPTH;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// Lineage store database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    /// Connect over TLS (managed hosts, `sslmode=require`)
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 10,
            require_tls: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Lineage traversal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LineageConfig {
    /// Engines whose lineage tables are read
    pub engines: Vec<String>,
    /// Depth used when a request does not give one
    pub max_depth: usize,
    /// Deadline of one traversal
    pub query_timeout: Duration,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            engines: KNOWN_ENGINES.iter().map(|e| e.to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub lineage: LineageConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: env_parse("HOST").unwrap_or_else(|| ServerConfig::default().host),
            port: env_parse("PORT").unwrap_or_else(|| ServerConfig::default().port),
        };

        // Try to load DATABASE_URL first, fall back to individual vars
        let database = if let Ok(database_url) = std::env::var("DATABASE_URL") {
            Self::parse_database_url(&database_url)?
        } else {
            let defaults = DatabaseConfig::default();
            DatabaseConfig {
                host: std::env::var("DB_HOST").unwrap_or(defaults.host),
                port: env_parse("DB_PORT").unwrap_or(defaults.port),
                user: std::env::var("DB_USER").unwrap_or(defaults.user),
                password: std::env::var("DB_PASSWORD").unwrap_or_default(),
                database: std::env::var("DB_NAME").unwrap_or(defaults.database),
                max_pool_size: env_parse("DB_MAX_CONNECTIONS").unwrap_or(defaults.max_pool_size),
                require_tls: env_parse("DB_REQUIRE_TLS").unwrap_or(defaults.require_tls),
            }
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| split_csv(&s))
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let lineage = Self::load_lineage()?;

        Ok(Self {
            server,
            database,
            cors,
            lineage,
        })
    }

    fn load_lineage() -> Result<LineageConfig, ConfigError> {
        let defaults = LineageConfig::default();

        let engines = match std::env::var("LINEAGE_ENGINES") {
            Ok(value) => {
                let engines = split_csv(&value);
                if let Some(unknown) = engines.iter().find(|e| !KNOWN_ENGINES.contains(&e.as_str())) {
                    return Err(ConfigError::InvalidValue(format!(
                        "Unknown engine '{}' in LINEAGE_ENGINES (known: {})",
                        unknown,
                        KNOWN_ENGINES.join(", ")
                    )));
                }
                if engines.is_empty() {
                    defaults.engines
                } else {
                    engines
                }
            }
            Err(_) => defaults.engines,
        };

        let max_depth = env_parse::<usize>("LINEAGE_MAX_DEPTH").unwrap_or(defaults.max_depth);
        if max_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "LINEAGE_MAX_DEPTH must be at least 1".to_string(),
            ));
        }

        let query_timeout = env_parse::<u64>("LINEAGE_QUERY_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.query_timeout);

        Ok(LineageConfig {
            engines,
            max_depth,
            query_timeout,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "Missing database name in DATABASE_URL".to_string(),
            ));
        }

        let require_tls = host.contains("neon.tech")
            || parsed
                .query_pairs()
                .any(|(key, value)| key == "sslmode" && value == "require");

        Ok(DatabaseConfig {
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            database,
            max_pool_size: env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
            require_tls,
            host,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
