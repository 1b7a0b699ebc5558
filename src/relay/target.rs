use core::fmt::{self, Debug, Display, Formatter};
use std::path::PathBuf;

use crate::config::ClientTimeouts;

/// How the outbound connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plaintext for the whole session.
    #[default]
    None,
    /// TLS negotiated on connect, before the greeting is read.
    Implicit,
    /// Plaintext greeting and EHLO, then upgraded with `STARTTLS`.
    StartTls,
}

impl Display for TlsMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Self::None => "none",
            Self::Implicit => "implicit",
            Self::StartTls => "starttls",
        })
    }
}

/// Login for the upstream server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The single upstream every message is relayed to.
///
/// Built once at startup and shared read-only between all relay attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub credentials: Option<Credentials>,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Skip certificate verification. Only meant for testing.
    pub accept_invalid_certs: bool,
    /// Extra PEM bundle trusted in addition to the system roots.
    pub ca_certificate: Option<PathBuf>,
    pub timeouts: ClientTimeouts,
}

impl UpstreamTarget {
    /// A plaintext, unauthenticated target with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: TlsMode::None,
            credentials: None,
            helo_name: String::from("localhost"),
            accept_invalid_certs: false,
            ca_certificate: None,
            timeouts: ClientTimeouts::default(),
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// `host:port`, as used in log fields and error messages.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
