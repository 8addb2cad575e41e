use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::training::TenantSettings;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::load()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tenant switches and the optional catalog exports to load at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub settings: TenantSettings,
    pub catalog: Option<CatalogPaths>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPaths {
    pub levels: PathBuf,
    pub training_types: PathBuf,
}

impl EngineConfig {
    fn load() -> Result<Self, ConfigError> {
        let settings = TenantSettings {
            auto_billing_enabled: flag("ENGINE_AUTO_BILLING")?,
            auto_progress_enabled: flag("ENGINE_AUTO_PROGRESS")?,
        };

        let levels = env::var("ENGINE_CATALOG_LEVELS").ok().filter(|v| !v.is_empty());
        let training_types = env::var("ENGINE_CATALOG_TRAINING_TYPES")
            .ok()
            .filter(|v| !v.is_empty());
        let catalog = match (levels, training_types) {
            (Some(levels), Some(training_types)) => Some(CatalogPaths {
                levels: PathBuf::from(levels),
                training_types: PathBuf::from(training_types),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteCatalog),
        };

        Ok(Self { settings, catalog })
    }
}

// Unset means enabled.
fn flag(name: &'static str) -> Result<bool, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(true);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag { name, value: raw }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { name: &'static str, value: String },
    IncompleteCatalog,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false, got '{value}'")
            }
            ConfigError::IncompleteCatalog => write!(
                f,
                "ENGINE_CATALOG_LEVELS and ENGINE_CATALOG_TRAINING_TYPES must be set together"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidFlag { .. }
            | ConfigError::IncompleteCatalog => None,
        }
    }
}
