//! Test support utilities
//!
//! A mock upstream SMTP server to relay to, and a harness that runs the whole
//! bridge in front of it.
#![allow(dead_code)]

pub mod harness;
pub mod mock_server;

pub use harness::BridgeHarness;
pub use mock_server::{MockSmtpServer, SmtpCommand};
