use core::fmt::{self, Display, Formatter};

use super::outcome::DeliveryOutcome;

/// Used when an attempt fails without any usable description.
const GENERIC_FAILURE: &str = "Transaction failed";

/// The single line returned to the inbound client for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    /// Builds a reply, folding any line breaks in `text` into single spaces.
    /// Spacing within a line is kept as sent.
    #[must_use]
    pub fn new(code: u16, text: &str) -> Self {
        let text = text
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            code,
            text: if text.is_empty() {
                String::from(GENERIC_FAILURE)
            } else {
                text
            },
        }
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.code, self.text)
    }
}

/// Only codes a server may end a failed transaction with are passed through.
const fn is_failure_code(code: u16) -> bool {
    code >= 400 && code <= 599
}

/// Maps a delivery outcome onto the reply for the inbound client.
///
/// | Outcome | Reply |
/// |---|---|
/// | `Delivered` | `250 OK` |
/// | `PartiallyRefused` | `553 Recipients refused: <addresses>` |
/// | `Failed` with an upstream code | that code and the upstream text |
/// | `Failed` without one | `554` (`535` for authentication) and a local description |
#[must_use]
pub fn translate(outcome: &DeliveryOutcome) -> Reply {
    match outcome {
        DeliveryOutcome::Delivered => Reply::new(250, "OK"),
        DeliveryOutcome::PartiallyRefused(refused) => {
            let addresses = refused
                .iter()
                .map(|recipient| recipient.address.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            Reply::new(553, &format!("Recipients refused: {addresses}"))
        }
        DeliveryOutcome::Failed(err) => {
            let code = err
                .code()
                .filter(|code| is_failure_code(*code))
                .unwrap_or_else(|| err.default_code());

            Reply::new(code, &err.to_string())
        }
    }
}
