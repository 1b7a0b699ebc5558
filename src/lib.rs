//! A local SMTP relay bridge.
//!
//! Plaintext, unauthenticated SMTP clients on the local network submit to
//! the [`smtp`] server; every completed transaction is relayed by the
//! [`relay`] engine to a single upstream that requires TLS and/or
//! authentication, and the upstream's verdict is translated back into the
//! reply the local client sees.

pub mod client;
pub mod config;
pub mod controller;
pub mod listener;
pub mod logging;
pub mod relay;
pub mod smtp;
pub mod traits;

pub use tracing;
