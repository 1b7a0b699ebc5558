//! SASL mechanisms used to log in to the upstream (RFC 4954).

use base64::{Engine, engine::general_purpose::STANDARD};

/// Mechanisms this client can perform, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl Mechanism {
    const PREFERENCE: [Self; 2] = [Self::Plain, Self::Login];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }

    /// Pick the most preferred mechanism among those the server advertised.
    #[must_use]
    pub fn negotiate<S: AsRef<str>>(advertised: &[S]) -> Option<Self> {
        Self::PREFERENCE.into_iter().find(|mechanism| {
            advertised
                .iter()
                .any(|name| name.as_ref().eq_ignore_ascii_case(mechanism.name()))
        })
    }
}

/// `AUTH PLAIN` initial response: `base64("\0" username "\0" password)`.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let mut payload = Vec::with_capacity(username.len() + password.len() + 2);
    payload.push(0);
    payload.extend_from_slice(username.as_bytes());
    payload.push(0);
    payload.extend_from_slice(password.as_bytes());

    STANDARD.encode(payload)
}

/// One `AUTH LOGIN` step: the base64 encoding of a username or password.
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}
