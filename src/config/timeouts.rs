//! Timeout configuration for both sides of the bridge.
//!
//! - **Server-side**: how long an inbound client may sit idle between commands
//!   and while transferring message data.
//! - **Client-side**: how long each step of an upstream relay attempt may take
//!   before the attempt is abandoned as a transport failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Inbound SMTP timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Maximum wait for the next command line.
    ///
    /// Default: 300 seconds (5 minutes, per RFC 5321)
    #[serde(default = "defaults::server_command_secs")]
    pub command_secs: u64,

    /// Maximum wait for each chunk of message data after `354`.
    ///
    /// Default: 180 seconds (3 minutes, per RFC 5321)
    #[serde(default = "defaults::server_data_block_secs")]
    pub data_block_secs: u64,
}

impl ServerTimeouts {
    /// Name of the first field set to zero, if any.
    #[must_use]
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("command_secs", self.command_secs),
            ("data_block_secs", self.data_block_secs),
        ]
        .into_iter()
        .find_map(|(name, secs)| (secs == 0).then_some(name))
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data_block(&self) -> Duration {
        Duration::from_secs(self.data_block_secs)
    }
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: defaults::server_command_secs(),
            data_block_secs: defaults::server_data_block_secs(),
        }
    }
}

/// Upstream (relay) timeouts.
///
/// Every network operation of a relay attempt is bounded by one of these;
/// exceeding it fails the attempt with a transport error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Timeout for DNS resolution plus the TCP connect, including the TLS
    /// handshake when TLS starts on connect.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::client_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for each command round-trip (EHLO, AUTH, MAIL, RCPT, DATA).
    ///
    /// STARTTLS is bounded by this as well, its handshake included.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::client_command_secs")]
    pub command_secs: u64,

    /// Timeout for transmitting the message body and reading the final reply.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::client_data_secs")]
    pub data_secs: u64,

    /// Timeout for QUIT.
    ///
    /// Default: 10 seconds (never changes the outcome of an attempt)
    #[serde(default = "defaults::client_quit_secs")]
    pub quit_secs: u64,
}

impl ClientTimeouts {
    /// All operations share the same bound, QUIT included.
    #[must_use]
    pub const fn uniform(secs: u64) -> Self {
        Self {
            connect_secs: secs,
            command_secs: secs,
            data_secs: secs,
            quit_secs: secs,
        }
    }

    /// Name of the first field set to zero, if any.
    #[must_use]
    pub fn first_zero(&self) -> Option<&'static str> {
        [
            ("connect_secs", self.connect_secs),
            ("command_secs", self.command_secs),
            ("data_secs", self.data_secs),
            ("quit_secs", self.quit_secs),
        ]
        .into_iter()
        .find_map(|(name, secs)| (secs == 0).then_some(name))
    }

    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::client_connect_secs(),
            command_secs: defaults::client_command_secs(),
            data_secs: defaults::client_data_secs(),
            quit_secs: defaults::client_quit_secs(),
        }
    }
}

mod defaults {
    pub const fn server_command_secs() -> u64 {
        300
    }
    pub const fn server_data_block_secs() -> u64 {
        180
    }

    pub const fn client_connect_secs() -> u64 {
        60
    }
    pub const fn client_command_secs() -> u64 {
        60
    }
    pub const fn client_data_secs() -> u64 {
        60
    }
    pub const fn client_quit_secs() -> u64 {
        10
    }
}
