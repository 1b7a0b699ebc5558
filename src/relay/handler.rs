use std::sync::Arc;

use tokio_rustls::TlsConnector;

use crate::{smtp::envelope::Envelope, traits::protocol::DataHandler};

use super::{
    delivery::{connector_for, deliver_with},
    error::DeliveryError,
    outcome::DeliveryOutcome,
    target::UpstreamTarget,
    translate::{Reply, translate},
};

/// Relays every completed inbound transaction to the configured upstream.
///
/// Holds nothing but the immutable target (and the TLS connector derived from
/// it), so one handler is shared by all sessions.
#[derive(Clone)]
pub struct RelayHandler {
    target: Arc<UpstreamTarget>,
    connector: Option<TlsConnector>,
}

impl RelayHandler {
    /// # Errors
    ///
    /// Returns [`DeliveryError::Tls`] if the target needs TLS and the
    /// connector cannot be built.
    pub fn new(target: UpstreamTarget) -> Result<Self, DeliveryError> {
        let connector = connector_for(&target)?;

        Ok(Self {
            target: Arc::new(target),
            connector,
        })
    }

    #[must_use]
    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Deliver `envelope` and translate the outcome.
    ///
    /// The attempt runs in its own task, so a panic inside it still ends in a
    /// `554` reply instead of tearing down the inbound session.
    pub async fn relay(&self, envelope: Envelope) -> Reply {
        let target = Arc::clone(&self.target);
        let connector = self.connector.clone();

        let attempt =
            tokio::spawn(async move { deliver_with(&target, connector, &envelope).await });

        let outcome = attempt.await.unwrap_or_else(|err| {
            tracing::error!("Relay attempt did not complete: {err}");
            DeliveryOutcome::Failed(DeliveryError::Transport(String::from(
                "Internal error while relaying message",
            )))
        });

        translate(&outcome)
    }
}

impl DataHandler for RelayHandler {
    async fn handle(&self, envelope: Envelope) -> String {
        self.relay(envelope).await.to_string()
    }
}
