//! TOML configuration for the logger.
//!
//! Two sections: `[APIServer]` for the HTTP surface and `[Syslog]` for the
//! ingestion side (with `[Syslog.InfluxDB]` nested under it). Keys are the
//! PascalCase names of the original configuration format; snake_case
//! aliases are accepted for every key.
//!
//! # Parsing
//!
//! ```
//! use std::str::FromStr;
//! use coriolis_config::Config;
//!
//! let config = Config::from_str(r#"
//! [APIServer]
//! Bind = "0.0.0.0"
//! Port = 9998
//! AuthMiddleware = "none"
//!
//! [Syslog]
//! Listener = "udp"
//! Address = "0.0.0.0:514"
//! Format = "automatic"
//! DataStore = "influxdb"
//!
//! [Syslog.InfluxDB]
//! URL = "http://127.0.0.1:8086"
//! Database = "coriolis_logs"
//! "#).unwrap();
//! assert_eq!(config.api_server.port, 9998);
//! ```

mod api_server;
mod error;
mod syslog;

pub use api_server::{ApiServerConfig, AuthMiddleware, KeystoneAuthConfig, TlsConfig};
pub use error::{ConfigError, Result};
pub use syslog::{DatastoreKind, InfluxDbConfig, ListenerKind, LogFormat, SyslogConfig};

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

/// Default configuration file location.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/coriolis-logger/coriolis-logger.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "APIServer", alias = "api_server")]
    pub api_server: ApiServerConfig,

    #[serde(rename = "Syslog", alias = "syslog")]
    pub syslog: SyslogConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both sections; any failure aborts startup.
    pub fn validate(&self) -> Result<()> {
        self.api_server.validate()?;
        self.syslog.validate()?;
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"
[APIServer]
Bind = "127.0.0.1"
Port = 9998
AuthMiddleware = "none"

[Syslog]
Listener = "udp"
Address = "0.0.0.0:514"
Format = "automatic"
DataStore = "influxdb"

[Syslog.InfluxDB]
URL = "http://127.0.0.1:8086"
Database = "coriolis_logs"
"#
    }

    #[test]
    fn parses_a_minimal_config() {
        let config = Config::from_str(minimal()).unwrap();
        assert_eq!(config.api_server.bind, "127.0.0.1");
        assert_eq!(config.api_server.port, 9998);
        assert_eq!(config.api_server.auth_middleware, AuthMiddleware::None);
        assert_eq!(config.syslog.listener, ListenerKind::Udp);
        assert_eq!(config.syslog.format, LogFormat::Automatic);
        let influx = config.syslog.influxdb.as_ref().unwrap();
        assert_eq!(influx.database, "coriolis_logs");
        // Defaults.
        assert_eq!(influx.write_interval, 1);
        assert_eq!(influx.log_retention_period, 3);
    }

    #[test]
    fn snake_case_aliases_are_accepted() {
        let toml = r#"
[api_server]
bind = "127.0.0.1"
port = 9998
auth_middleware = "none"

[syslog]
listener = "tcp"
address = "0.0.0.0:601"
format = "rfc6587"
data_store = "influxdb"

[syslog.influxdb]
url = "http://127.0.0.1:8086"
database = "logs"
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.syslog.listener, ListenerKind::Tcp);
        assert_eq!(config.syslog.format, LogFormat::Rfc6587);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(Config::from_str("invalid { toml").is_err());
    }

    #[test]
    fn missing_sections_are_an_error() {
        assert!(Config::from_str("[APIServer]\nBind = \"127.0.0.1\"").is_err());
    }
}
