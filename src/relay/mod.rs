//! The relay engine: deliver one inbound transaction to the upstream and turn
//! the result into the reply the inbound client sees.

mod delivery;
mod error;
mod handler;
mod outcome;
mod target;
mod translate;

pub use delivery::{connector_for, deliver, deliver_with};
pub use error::DeliveryError;
pub use handler::RelayHandler;
pub use outcome::{DeliveryOutcome, RefusedRecipient};
pub use target::{Credentials, TlsMode, UpstreamTarget};
pub use translate::{Reply, translate};
