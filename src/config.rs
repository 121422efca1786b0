//! Application configuration, loaded from a TOML file with environment
//! overrides for secrets. Every sub-config named here is referenced by the
//! rest of the crate (the transport layer, the engine, the ingress
//! servers); this module is the single place that defines them, the one
//! place the server, database, and security layers all read from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The OCPP-core-specific knobs: everything the Transaction
/// Engine and Side-Effect Dispatcher need that isn't a business rule owned
/// by an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub heartbeat_interval_ocpp_s_secs: u32,
    pub heartbeat_interval_ocpp_j_secs: u32,
    pub boot_reject_retry_secs: u32,
    pub max_last_seen_interval_secs: u32,
    pub notif_end_of_charge_enabled: bool,
    pub notif_before_end_of_charge_enabled: bool,
    pub notif_before_end_of_charge_percent: u8,
    pub post_boot_config_delay_ms: u64,
    pub smart_charging_delay_ms: u64,
    pub per_call_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ocpp_s_secs: 300,
            heartbeat_interval_ocpp_j_secs: 300,
            boot_reject_retry_secs: 60,
            max_last_seen_interval_secs: 180,
            notif_end_of_charge_enabled: true,
            notif_before_end_of_charge_enabled: true,
            notif_before_end_of_charge_percent: 85,
            post_boot_config_delay_ms: 5_000,
            smart_charging_delay_ms: 2_000,
            per_call_timeout_ms: 5_000,
        }
    }
}

/// Listen addresses for the two ingress surfaces: a
/// WebSocket endpoint for OCPP 1.6 JSON and an HTTP endpoint for OCPP 1.5
/// SOAP, health and `/metrics` mounted alongside the SOAP router since both
/// are plain HTTP (axum multiplexes them on one `Router`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub api_host: String,
    pub api_port: u16,
    pub ws_host: String,
    pub ws_port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 9001,
            ws_host: "0.0.0.0".to_string(),
            ws_port: 9000,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn ws_address(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Database connection settings. The core ships only an in-memory reference
/// store, so this exists for deployments that layer a real persistence
/// adapter on top without needing a second config shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            max_connections: 10,
        }
    }
}

/// Registration-token and admin-façade-adjacent security settings the core
/// consumes; JWT fields are carried for the REST façade that sits above
/// the core, kept here rather than duplicated in a second config shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u32,
    pub require_registration_token: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            jwt_expiration_hours: 24,
            require_registration_token: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub default_email: String,
    pub default_password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            default_email: "admin@example.com".to_string(),
            default_password: "change-me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50,
            burst_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// `~/.config/ocpp-csms-core/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpp-csms-core")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = AppConfig::default();
        let serialized = toml::to_string(&cfg).expect("serialize");
        let parsed: AppConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.core.heartbeat_interval_ocpp_j_secs, cfg.core.heartbeat_interval_ocpp_j_secs);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AppConfig::load(Path::new("/nonexistent/path/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_, _)));
    }
}
