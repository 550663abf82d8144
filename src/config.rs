//! Configuration management for the monitoring API

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Path to the alias -> profile JSON document
    pub alias_config_file: PathBuf,

    /// Interval between periodic refreshes of every alias
    pub refresh_interval: Duration,

    /// Maximum number of on-demand refreshes fetching at once
    pub refresh_workers: usize,

    /// Base URL of the metrics time-series service
    pub metrics_url: String,

    /// HTTP timeout for metrics queries
    pub http_timeout: Duration,

    /// Name of the credential table
    pub users_table: String,

    /// Directory holding persisted tables
    pub data_dir: PathBuf,

    /// Secret used to sign session tokens
    pub jwt_secret: String,

    /// Token signing algorithm name
    pub jwt_algorithm: String,

    /// Key material for email encryption
    pub encryption_key: String,

    /// Set the `Secure` attribute on the session cookie
    pub cookie_secure: bool,

    /// Allowed CORS origin, any origin when unset
    pub cors_allowed_origin: Option<String>,

    /// Admin account created at startup when absent
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            alias_config_file: PathBuf::from("config.json"),
            refresh_interval: Duration::from_secs(600),
            refresh_workers: 4,
            metrics_url: "http://prometheus:9090".to_string(),
            http_timeout: Duration::from_secs(10),
            users_table: "heartbeat-users".to_string(),
            data_dir: PathBuf::from("."),
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".to_string(),
            encryption_key: String::new(),
            cookie_secure: true,
            cors_allowed_origin: None,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }

        if let Ok(path) = env::var("ALIAS_CONFIG_FILE") {
            config.alias_config_file = PathBuf::from(path);
        }

        if let Ok(interval) = env::var("REFRESH_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.refresh_interval = Duration::from_secs(seconds);
            }
        }

        if let Ok(workers) = env::var("REFRESH_WORKERS") {
            if let Ok(workers) = workers.parse() {
                config.refresh_workers = workers;
            }
        }

        if let Ok(metrics_url) = env::var("METRICS_URL") {
            config.metrics_url = metrics_url;
        }

        if let Ok(timeout) = env::var("HTTP_TIMEOUT_SECONDS") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.http_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(table) = env::var("USERS_TABLE") {
            config.users_table = table;
        }

        if let Ok(dir) = env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            config.jwt_secret = secret;
        }

        if let Ok(algorithm) = env::var("JWT_ALGORITHM") {
            config.jwt_algorithm = algorithm;
        }

        if let Ok(key) = env::var("ENCRYPTION_KEY") {
            config.encryption_key = key;
        }

        if let Ok(secure) = env::var("COOKIE_SECURE") {
            config.cookie_secure = secure.to_lowercase() != "false";
        }

        if let Ok(origin) = env::var("CORS_ALLOWED_ORIGIN") {
            if !origin.trim().is_empty() {
                config.cors_allowed_origin = Some(origin);
            }
        }

        if let (Ok(username), Ok(password)) = (
            env::var("BOOTSTRAP_ADMIN_USERNAME"),
            env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            config.bootstrap_admin = Some(BootstrapAdmin {
                email: env::var("BOOTSTRAP_ADMIN_EMAIL")
                    .unwrap_or_else(|_| format!("{}@localhost", username)),
                username,
                password,
            });
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }

        if self.refresh_interval.is_zero() {
            return Err("refresh_interval must be greater than 0".to_string());
        }

        if self.refresh_workers == 0 {
            return Err("refresh_workers must be greater than 0".to_string());
        }

        if self.metrics_url.is_empty() {
            return Err("metrics_url cannot be empty".to_string());
        }

        if self.users_table.is_empty() {
            return Err("users_table cannot be empty".to_string());
        }

        if self.jwt_secret.is_empty() {
            return Err("JWT_SECRET must be set".to_string());
        }

        if self.encryption_key.is_empty() {
            return Err("ENCRYPTION_KEY must be set".to_string());
        }

        if let Some(admin) = &self.bootstrap_admin {
            if admin.username.is_empty() || admin.password.is_empty() {
                return Err("bootstrap admin needs a username and a password".to_string());
            }
        }

        Ok(())
    }

    /// Location of the persisted credential table
    pub fn users_table_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.users_table))
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            jwt_secret: "secret".to_string(),
            encryption_key: "key".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.refresh_interval, Duration::from_secs(600));
        assert_eq!(config.jwt_algorithm, "HS256");
        assert!(config.cookie_secure);
    }

    #[test]
    fn test_validate_requires_secrets() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());

        let config = Config {
            encryption_key: String::new(),
            ..valid()
        };
        assert_eq!(config.validate().unwrap_err(), "ENCRYPTION_KEY must be set");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config {
            refresh_interval: Duration::ZERO,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_users_table_path() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/heartbeat"),
            ..valid()
        };
        assert_eq!(
            config.users_table_path(),
            PathBuf::from("/var/lib/heartbeat/heartbeat-users.json")
        );
    }
}
