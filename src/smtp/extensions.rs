use core::fmt::{self, Display};

/// Service extensions advertised to inbound clients in the EHLO reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// SIZE (RFC 1870). Zero advertises the keyword without a limit.
    Size(usize),
    /// 8BITMIME (RFC 6152). Content is relayed as received either way.
    EightBitMime,
}

impl Display for Extension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Size(0) => fmt.write_str("SIZE"),
            Self::Size(max) => write!(fmt, "SIZE {max}"),
            Self::EightBitMime => fmt.write_str("8BITMIME"),
        }
    }
}
