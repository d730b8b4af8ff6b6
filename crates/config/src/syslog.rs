//! Syslog worker configuration.

use std::path::Path;

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Listener transport for the syslog worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ListenerKind {
    #[serde(rename = "unixgram")]
    Unixgram,
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "udp")]
    Udp,
}

/// Wire format accepted by the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "automatic")]
    Automatic,
    #[serde(rename = "rfc3164")]
    Rfc3164,
    #[serde(rename = "rfc5424")]
    Rfc5424,
    #[serde(rename = "rfc6587")]
    Rfc6587,
}

/// Datastore the syslog worker persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DatastoreKind {
    #[serde(rename = "influxdb")]
    InfluxDb,
    #[serde(rename = "stdout")]
    Stdout,
}

/// `[Syslog]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SyslogConfig {
    #[serde(rename = "Listener", alias = "listener")]
    pub listener: ListenerKind,

    /// Socket path for unixgram, `host:port` for tcp/udp.
    #[serde(rename = "Address", alias = "address")]
    pub address: String,

    #[serde(rename = "Format", alias = "format")]
    pub format: LogFormat,

    /// Echo every message to stdout in addition to the datastore.
    #[serde(rename = "LogToStdout", alias = "log_to_stdout", default)]
    pub log_to_stdout: bool,

    #[serde(rename = "DataStore", alias = "data_store")]
    pub datastore: DatastoreKind,

    #[serde(rename = "InfluxDB", alias = "influxdb", default)]
    pub influxdb: Option<InfluxDbConfig>,
}

impl SyslogConfig {
    pub fn validate(&self) -> Result<()> {
        match self.datastore {
            DatastoreKind::InfluxDb => {
                let Some(influx) = &self.influxdb else {
                    return Err(ConfigError::MissingSection {
                        section: "Syslog",
                        missing: "InfluxDB",
                    });
                };
                influx.validate()?;
            }
            DatastoreKind::Stdout => {}
        }

        if self.listener == ListenerKind::Unixgram {
            self.validate_socket_path()?;
        }
        Ok(())
    }

    /// The unixgram address must live in an existing directory, and any
    /// file already at the path must be a socket (the worker removes
    /// stale sockets, nothing else).
    fn validate_socket_path(&self) -> Result<()> {
        let path = Path::new(&self.address);
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent
            && !parent.exists()
        {
            return Err(ConfigError::invalid_value(
                "Syslog",
                "Address",
                format!("directory {parent:?} does not exist"),
            ));
        }

        #[cfg(unix)]
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            use std::os::unix::fs::FileTypeExt;
            if !meta.file_type().is_socket() {
                return Err(ConfigError::invalid_value(
                    "Syslog",
                    "Address",
                    format!(
                        "cannot use {:?} as address: file already exists and is not a socket",
                        self.address
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// `[Syslog.InfluxDB]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDbConfig {
    #[serde(rename = "URL", alias = "url")]
    pub url: String,

    #[serde(rename = "Username", alias = "username", default)]
    pub username: String,

    #[serde(rename = "Password", alias = "password", default)]
    pub password: String,

    #[serde(rename = "Database", alias = "database")]
    pub database: String,

    #[serde(rename = "VerifyServer", alias = "verify_server", default)]
    pub verify_server: bool,

    #[serde(rename = "CACert", alias = "ca_cert", default)]
    pub ca_cert: Option<String>,

    #[serde(rename = "ClientCRT", alias = "client_crt", default)]
    pub client_crt: Option<String>,

    #[serde(rename = "ClientKey", alias = "client_key", default)]
    pub client_key: Option<String>,

    /// Seconds between datastore flushes.
    #[serde(
        rename = "WriteInterval",
        alias = "write_interval",
        default = "default_write_interval"
    )]
    pub write_interval: u64,

    /// Days of log retention.
    #[serde(
        rename = "LogRetentionPeriod",
        alias = "log_retention_period",
        default = "default_retention_days"
    )]
    pub log_retention_period: u32,
}

fn default_write_interval() -> u64 {
    1
}

fn default_retention_days() -> u32 {
    3
}

impl InfluxDbConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_scheme =
            self.url.starts_with("http://") || self.url.starts_with("https://");
        if !valid_scheme {
            return Err(ConfigError::invalid_value(
                "Syslog.InfluxDB",
                "URL",
                format!("invalid InfluxDB URL: {:?}", self.url),
            ));
        }
        if self.database.is_empty() {
            return Err(ConfigError::invalid_value(
                "Syslog.InfluxDB",
                "Database",
                "invalid database name",
            ));
        }
        Ok(())
    }
}
