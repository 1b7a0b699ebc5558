use core::fmt::{self, Display, Formatter};

use super::error::DeliveryError;

/// A recipient the upstream refused at `RCPT TO`, with its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefusedRecipient {
    pub address: String,
    pub code: u16,
    pub message: String,
}

impl Display for RefusedRecipient {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} ({} {})", self.address, self.code, self.message)
    }
}

/// The result of one delivery attempt. Exactly one is produced per envelope.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Every recipient was accepted and the message was taken.
    Delivered,
    /// The message was taken for some recipients. Holds the refused ones, in
    /// envelope order.
    PartiallyRefused(Vec<RefusedRecipient>),
    /// The attempt was aborted.
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<Result<Vec<RefusedRecipient>, DeliveryError>> for DeliveryOutcome {
    fn from(result: Result<Vec<RefusedRecipient>, DeliveryError>) -> Self {
        match result {
            Ok(refused) if refused.is_empty() => Self::Delivered,
            Ok(refused) => Self::PartiallyRefused(refused),
            Err(err) => Self::Failed(err),
        }
    }
}
