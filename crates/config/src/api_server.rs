//! API server configuration.

use std::net::IpAddr;

use serde::Deserialize;
use tracing::warn;

use crate::{ConfigError, Result};

/// Authentication middleware selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AuthMiddleware {
    #[serde(rename = "keystone")]
    Keystone,
    #[serde(rename = "none")]
    None,
}

/// `[APIServer]` section.
///
/// # Example
///
/// ```toml
/// [APIServer]
/// Bind = "0.0.0.0"
/// Port = 9998
/// UseTLS = false
/// AuthMiddleware = "keystone"
/// CORSOrigins = ["https://ops.example.com"]
///
/// [APIServer.KeystoneAuth]
/// AuthURI = "https://keystone.example.com:5000/v3"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ApiServerConfig {
    #[serde(rename = "Bind", alias = "bind")]
    pub bind: String,

    #[serde(rename = "Port", alias = "port")]
    pub port: u16,

    #[serde(rename = "UseTLS", alias = "use_tls", default)]
    pub use_tls: bool,

    #[serde(rename = "AuthMiddleware", alias = "auth_middleware")]
    pub auth_middleware: AuthMiddleware,

    #[serde(rename = "TLS", alias = "tls", default)]
    pub tls: TlsConfig,

    #[serde(rename = "KeystoneAuth", alias = "keystone_auth", default)]
    pub keystone_auth: Option<KeystoneAuthConfig>,

    /// Allowed WebSocket origins; `*` is a wildcard, an empty list
    /// disables the check.
    #[serde(rename = "CORSOrigins", alias = "cors_origins", default)]
    pub cors_origins: Vec<String>,
}

impl ApiServerConfig {
    pub fn validate(&self) -> Result<()> {
        match self.auth_middleware {
            AuthMiddleware::Keystone => {
                let Some(keystone) = &self.keystone_auth else {
                    return Err(ConfigError::MissingSection {
                        section: "APIServer",
                        missing: "KeystoneAuth",
                    });
                };
                keystone.validate()?;
            }
            AuthMiddleware::None => {
                warn!("authentication is disabled. Anyone can view your logs!");
            }
        }

        if self.use_tls {
            self.tls.validate()?;
        }
        if self.port == 0 {
            return Err(ConfigError::invalid_value(
                "APIServer",
                "Port",
                "port must be between 1 and 65535",
            ));
        }
        if self.bind.parse::<IpAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "APIServer",
                "Bind",
                format!("{:?} is not an IP address", self.bind),
            ));
        }
        Ok(())
    }
}

/// `[APIServer.TLS]` section. Termination itself is delegated to the
/// deployment; the material is validated so misconfiguration fails at
/// startup rather than at the proxy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(rename = "CRT", alias = "crt", default)]
    pub crt: String,

    #[serde(rename = "Key", alias = "key", default)]
    pub key: String,

    #[serde(rename = "CACert", alias = "ca_cert", default)]
    pub ca_cert: String,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.crt.is_empty() || self.key.is_empty() {
            return Err(ConfigError::invalid_value(
                "APIServer.TLS",
                "CRT/Key",
                "missing crt or key",
            ));
        }
        for path in [&self.crt, &self.key] {
            if !std::path::Path::new(path).exists() {
                return Err(ConfigError::invalid_value(
                    "APIServer.TLS",
                    "CRT/Key",
                    format!("file {path:?} does not exist"),
                ));
            }
        }
        Ok(())
    }
}

/// `[APIServer.KeystoneAuth]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KeystoneAuthConfig {
    #[serde(rename = "AuthURI", alias = "auth_uri")]
    pub auth_uri: String,
}

impl KeystoneAuthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.auth_uri.is_empty() {
            return Err(ConfigError::invalid_value(
                "APIServer.KeystoneAuth",
                "AuthURI",
                "missing keystone auth_uri",
            ));
        }
        Ok(())
    }
}
