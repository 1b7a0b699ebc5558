//! SMTP client used to talk to the upstream server.
//!
//! This module provides the protocol primitives for a single outbound
//! session:
//! - Reply parsing, including multi-line replies
//! - EHLO capability discovery
//! - Implicit TLS and STARTTLS upgrades
//! - SASL `PLAIN` and `LOGIN` authentication
//! - Dot-stuffed message transfer
//!
//! The transaction logic (what to send, and what a reply means for the
//! delivery) lives in [`crate::relay`].
//!
//! # Example
//!
//! ```no_run
//! use smtp_bridge::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com", 25).await?;
//!
//! let greeting = client.read_greeting().await?;
//! println!("Server: {greeting}");
//!
//! let response = client.ehlo("bridge.local").await?;
//! println!("EHLO response: {response}");
//!
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod capabilities;
mod connection;
mod error;
mod response;
mod smtp_client;

pub use auth::Mechanism;
pub use capabilities::Capabilities;
pub use connection::tls_connector;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, encode_data};
