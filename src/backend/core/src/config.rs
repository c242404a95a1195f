//! Configuration management.
//!
//! Values come from an optional file plus `WARDEN__*` environment variables,
//! e.g. `WARDEN__DATABASE__URL` or `WARDEN__AUTHZ__BAN_TTL=12h`.

use serde::Deserialize;
use std::time::Duration;

use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "WARDEN";

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Authorization tuning: cache TTLs and ban thresholds
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix prepended to every cache key
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Timeout for establishing the connection manager
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// TTLs for each cache family plus the escalation thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Full auth context lifetime
    #[serde(default = "default_context_ttl", with = "humantime_serde")]
    pub context_ttl: Duration,

    /// Member record (role + custom roles) lifetime
    #[serde(default = "default_member_data_ttl", with = "humantime_serde")]
    pub member_data_ttl: Duration,

    /// Effective permission set lifetime
    #[serde(default = "default_permission_ttl", with = "humantime_serde")]
    pub permission_ttl: Duration,

    /// Window for counting failed attempts per (member, permission)
    #[serde(default = "default_failed_attempt_ttl", with = "humantime_serde")]
    pub failed_attempt_ttl: Duration,

    /// Cached ban flag lifetime
    #[serde(default = "default_ban_ttl", with = "humantime_serde")]
    pub ban_ttl: Duration,

    /// Denials before the member is banned
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Denial count at which the first warning is issued
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,

    /// Denial count at which the final warning is issued
    #[serde(default = "default_final_warning_threshold")]
    pub final_warning_threshold: u32,

    /// Capacity of the audit channel
    #[serde(default = "default_audit_buffer")]
    pub audit_buffer: usize,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            context_ttl: default_context_ttl(),
            member_data_ttl: default_member_data_ttl(),
            permission_ttl: default_permission_ttl(),
            failed_attempt_ttl: default_failed_attempt_ttl(),
            ban_ttl: default_ban_ttl(),
            max_failed_attempts: default_max_failed_attempts(),
            warning_threshold: default_warning_threshold(),
            final_warning_threshold: default_final_warning_threshold(),
            audit_buffer: default_audit_buffer(),
        }
    }
}

// Default value functions
fn default_environment() -> String { "production".to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_connect_timeout() -> Duration { Duration::from_secs(5) }
fn default_context_ttl() -> Duration { Duration::from_secs(300) }
fn default_member_data_ttl() -> Duration { Duration::from_secs(600) }
fn default_permission_ttl() -> Duration { Duration::from_secs(900) }
fn default_failed_attempt_ttl() -> Duration { Duration::from_secs(3600) }
fn default_ban_ttl() -> Duration { Duration::from_secs(86_400) }
fn default_max_failed_attempts() -> u32 { 5 }
fn default_warning_threshold() -> u32 { 3 }
fn default_final_warning_threshold() -> u32 { 4 }
fn default_audit_buffer() -> usize { 1024 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.authz.validate()
    }
}

impl AuthzConfig {
    /// Thresholds must escalate strictly: warning < final warning < ban.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.warning_threshold == 0
            || self.warning_threshold >= self.final_warning_threshold
            || self.final_warning_threshold >= self.max_failed_attempts
        {
            anyhow::bail!(
                "invalid authz thresholds: warning={} final_warning={} max={}",
                self.warning_threshold,
                self.final_warning_threshold,
                self.max_failed_attempts
            );
        }
        if self.audit_buffer == 0 {
            anyhow::bail!("authz.audit_buffer must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_authz_defaults() {
        let authz = AuthzConfig::default();
        assert_eq!(authz.context_ttl, Duration::from_secs(300));
        assert_eq!(authz.member_data_ttl, Duration::from_secs(600));
        assert_eq!(authz.permission_ttl, Duration::from_secs(900));
        assert_eq!(authz.failed_attempt_ttl, Duration::from_secs(3600));
        assert_eq!(authz.ban_ttl, Duration::from_secs(86_400));
        assert_eq!(authz.max_failed_attempts, 5);
        assert!(authz.validate().is_ok());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let authz = AuthzConfig {
            warning_threshold: 4,
            final_warning_threshold: 4,
            ..AuthzConfig::default()
        };
        assert!(authz.validate().is_err());
    }

    #[test]
    fn test_from_file_with_humantime_ttls() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
environment = "development"

[database]
url = "postgres://localhost/warden"

[redis]
key_prefix = "warden"

[authz]
ban_ttl = "12h"
context_ttl = "1m"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.environment, "development");
        assert_eq!(config.database.url, "postgres://localhost/warden");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.redis.key_prefix.as_deref(), Some("warden"));
        assert_eq!(config.authz.ban_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.authz.context_ttl, Duration::from_secs(60));
        assert_eq!(config.authz.permission_ttl, Duration::from_secs(900));
        assert_eq!(config.server.port, 8080);
    }
}
