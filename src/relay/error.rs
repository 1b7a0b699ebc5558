//! Why a delivery attempt was aborted.

use thiserror::Error;

use crate::client::ClientError;

use super::outcome::RefusedRecipient;

/// Failures that abort a delivery attempt.
///
/// The `Display` text is what the inbound client is told, so variants
/// carrying an upstream reply display that reply's text verbatim.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The upstream could not be reached or the connection was lost:
    /// resolution, connect, timeout, unexpected close, malformed reply.
    #[error("{0}")]
    Transport(String),

    /// The upstream rejected the session before a transaction could start
    /// (greeting or HELO).
    #[error("{message}")]
    Rejected { code: u16, message: String },

    /// TLS could not be established, either by handshake failure or because
    /// the server refused or does not offer `STARTTLS`.
    #[error("{message}")]
    Tls { code: Option<u16>, message: String },

    /// Authentication was refused or could not be attempted.
    #[error("{message}")]
    Auth { code: Option<u16>, message: String },

    /// `MAIL FROM` was rejected.
    #[error("{message}")]
    Sender { code: u16, message: String },

    /// Every recipient was refused; the message was never sent.
    #[error("All recipients refused: {}", addresses(.recipients))]
    RecipientsRefused {
        code: Option<u16>,
        recipients: Vec<RefusedRecipient>,
    },

    /// `DATA`, or the message itself, was rejected.
    #[error("{message}")]
    Submission { code: u16, message: String },
}

fn addresses(recipients: &[RefusedRecipient]) -> String {
    recipients
        .iter()
        .map(|recipient| recipient.address.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

impl DeliveryError {
    /// The upstream reply code behind this failure, if one was received.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Transport(_) => None,
            Self::Tls { code, .. }
            | Self::Auth { code, .. }
            | Self::RecipientsRefused { code, .. } => *code,
            Self::Rejected { code, .. }
            | Self::Sender { code, .. }
            | Self::Submission { code, .. } => Some(*code),
        }
    }

    /// The code a failed stage falls back to when the upstream supplied none.
    #[must_use]
    pub const fn default_code(&self) -> u16 {
        match self {
            Self::Auth { .. } => 535,
            _ => 554,
        }
    }

    /// All refusals sharing one code keep that code, anything else has none.
    #[must_use]
    pub fn all_refused(recipients: Vec<RefusedRecipient>) -> Self {
        let code = recipients.first().map(|first| first.code).filter(|code| {
            recipients
                .iter()
                .all(|recipient| recipient.code == *code)
        });

        Self::RecipientsRefused { code, recipients }
    }
}

impl From<ClientError> for DeliveryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TlsError(message) => Self::Tls {
                code: None,
                message: format!("TLS negotiation failed: {message}"),
            },
            ClientError::ConnectionClosed => {
                Self::Transport(String::from("Upstream closed the connection unexpectedly"))
            }
            ClientError::ParseError(message) => {
                Self::Transport(format!("Malformed reply from upstream: {message}"))
            }
            ClientError::Io(err) => Self::Transport(format!("Upstream connection error: {err}")),
        }
    }
}
