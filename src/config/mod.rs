//! Configuration for the bridge.
//!
//! The file is RON and mirrors the two sides of the relay:
//!
//! ```ron
//! (
//!     local: (host: "127.0.0.1", port: 2525),
//!     remote: (
//!         host: "smtp.example.com",
//!         port: 587,
//!         starttls: true,
//!         smtp_auth: true,
//!         smtp_auth_user: Some("user"),
//!         smtp_auth_password: Some("secret"),
//!     ),
//! )
//! ```
//!
//! `remote` is validated into an [`UpstreamTarget`] before the listener starts.

pub mod timeouts;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use timeouts::{ClientTimeouts, ServerTimeouts};

use crate::relay::{TlsMode, UpstreamTarget};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SMTP_BRIDGE_CONFIG";

const DEFAULT_PATHS: [&str; 2] = [
    "./smtp-bridge.config.ron",
    "/etc/smtp-bridge/smtp-bridge.config.ron",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration file found. Tried:\n{0}")]
    NotFound(String),

    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("remote.host must be set")]
    MissingHost,

    #[error("{side}.port must be between 1 and 65535")]
    InvalidPort { side: &'static str },

    #[error("remote.use_ssl and remote.starttls are mutually exclusive")]
    ConflictingTls,

    #[error("remote.smtp_auth requires both smtp_auth_user and smtp_auth_password")]
    MissingCredentials,

    #[error("CA certificate {0} does not exist")]
    CaCertificateNotFound(PathBuf),

    #[error("{side}.timeouts.{field} must be greater than zero")]
    ZeroTimeout {
        side: &'static str,
        field: &'static str,
    },
}

/// Where the inbound side listens, and how it treats its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "defaults::local_host")]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// Text following `220` in the greeting.
    #[serde(default = "defaults::banner")]
    pub banner: String,
    /// Largest message accepted, in bytes. Advertised with `SIZE`.
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
    #[serde(default)]
    pub timeouts: ServerTimeouts,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: defaults::local_host(),
            port: defaults::port(),
            banner: defaults::banner(),
            max_message_size: defaults::max_message_size(),
            timeouts: ServerTimeouts::default(),
        }
    }
}

/// The upstream server, as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    /// TLS on connect.
    #[serde(default)]
    pub use_ssl: bool,
    /// Upgrade with STARTTLS after EHLO.
    #[serde(default)]
    pub starttls: bool,
    #[serde(default)]
    pub smtp_auth: bool,
    #[serde(default)]
    pub smtp_auth_user: Option<String>,
    #[serde(default)]
    pub smtp_auth_password: Option<String>,
    #[serde(default = "defaults::helo_name")]
    pub helo_name: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub ca_certificate: Option<PathBuf>,
    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl TryFrom<RemoteConfig> for UpstreamTarget {
    type Error = ConfigError;

    fn try_from(remote: RemoteConfig) -> Result<Self, Self::Error> {
        if remote.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }

        if remote.port == 0 {
            return Err(ConfigError::InvalidPort { side: "remote" });
        }

        if let Some(field) = remote.timeouts.first_zero() {
            return Err(ConfigError::ZeroTimeout {
                side: "remote",
                field,
            });
        }

        let tls = match (remote.use_ssl, remote.starttls) {
            (true, true) => return Err(ConfigError::ConflictingTls),
            (true, false) => TlsMode::Implicit,
            (false, true) => TlsMode::StartTls,
            (false, false) => TlsMode::None,
        };

        if let Some(ca) = remote.ca_certificate.as_ref()
            && !ca.exists()
        {
            return Err(ConfigError::CaCertificateNotFound(ca.clone()));
        }

        let mut target = Self::new(remote.host.trim(), remote.port)
            .with_tls(tls)
            .with_helo_name(remote.helo_name)
            .accept_invalid_certs(remote.accept_invalid_certs)
            .with_timeouts(remote.timeouts);
        target.ca_certificate = remote.ca_certificate;

        if remote.smtp_auth {
            match (remote.smtp_auth_user, remote.smtp_auth_password) {
                (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                    target = target.with_credentials(user, password);
                }
                _ => return Err(ConfigError::MissingCredentials),
            }
        }

        Ok(target)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,
    pub remote: RemoteConfig,
}

impl Config {
    /// Parse a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse the configuration, locating it with [`find`] when no
    /// explicit path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if no file can be found, read, or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => find()?,
        };

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        Self::parse(&text)
    }

    /// Validate the `remote` section into the relay target.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure of the `local` or `remote` section.
    pub fn upstream(&self) -> Result<UpstreamTarget, ConfigError> {
        if self.local.port == 0 {
            return Err(ConfigError::InvalidPort { side: "local" });
        }

        if let Some(field) = self.local.timeouts.first_zero() {
            return Err(ConfigError::ZeroTimeout {
                side: "local",
                field,
            });
        }

        UpstreamTarget::try_from(self.remote.clone())
    }
}

/// Find the configuration file using the following precedence:
/// 1. `SMTP_BRIDGE_CONFIG` environment variable
/// 2. ./smtp-bridge.config.ron (current working directory)
/// 3. /etc/smtp-bridge/smtp-bridge.config.ron (system-wide config)
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if none of the candidates exist.
pub fn find() -> Result<PathBuf, ConfigError> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::NotFound(format!(
            "  - {CONFIG_ENV}={} (does not exist)",
            path.display()
        )));
    }

    if let Some(path) = DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
    {
        return Ok(path);
    }

    let tried = std::iter::once(format!("  - {CONFIG_ENV} environment variable"))
        .chain(DEFAULT_PATHS.iter().map(|p| format!("  - {p}")))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound(tried))
}

mod defaults {
    pub fn local_host() -> String {
        String::from("127.0.0.1")
    }

    pub const fn port() -> u16 {
        25
    }

    pub fn banner() -> String {
        String::from("localhost")
    }

    pub fn helo_name() -> String {
        String::from("localhost")
    }

    pub const fn max_message_size() -> usize {
        32 * 1024 * 1024
    }
}
