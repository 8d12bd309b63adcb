/// Configuration management for Lectern
use crate::error::{LmsError, LmsResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Log filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "lectern=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the token issuer
    pub jwt_secret: String,
    /// Subjects treated as admins regardless of their token role
    pub admin_ids: Vec<String>,
}

/// Content access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Allow content when access history cannot be read
    pub fail_open: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, from `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LmsResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LECTERN_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("LECTERN_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| LmsError::Validation("Invalid port number".to_string()))?;
        let version = env::var("LECTERN_VERSION")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("LECTERN_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("LECTERN_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("lectern.sqlite"));
        let max_connections = env::var("LECTERN_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("LECTERN_JWT_SECRET")
            .map_err(|_| LmsError::Validation("JWT secret required".to_string()))?;

        // Parse admin ids from comma-separated list
        let admin_ids = env::var("LECTERN_ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let fail_open = env::var("LECTERN_ACCESS_FAIL_OPEN")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let json = env::var("LECTERN_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                admin_ids,
            },
            access: AccessConfig { fail_open },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> LmsResult<()> {
        if self.service.hostname.is_empty() {
            return Err(LmsError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(LmsError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(LmsError::Validation(format!(
                "Invalid log filter: {}",
                self.logging.level
            )));
        }

        if self.storage.max_connections == 0 {
            return Err(LmsError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }
}
