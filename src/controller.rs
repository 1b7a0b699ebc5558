use std::future::Future;

use tokio::sync::broadcast;

use crate::{
    config::Config,
    internal,
    listener::Listener,
    logging,
    relay::RelayHandler,
    smtp::{Smtp, session::SessionConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

/// Owns the configuration and runs the bridge until asked to stop.
pub struct Controller {
    config: Config,
    relay: RelayHandler,
}

impl Controller {
    /// Validate the configuration and prepare the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the upstream's TLS
    /// settings cannot be used.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let target = config.upstream()?;
        let relay = RelayHandler::new(target)?;

        Ok(Self { config, relay })
    }

    /// Run until CTRL+C is pressed.
    ///
    /// # Errors
    ///
    /// This function will return an error if the listening socket cannot be
    /// bound or accepting connections fails.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            internal!(level = INFO, "CTRL+C entered, shutting down");
        })
        .await
    }

    /// Run until `stop` resolves, then let open sessions finish.
    ///
    /// # Errors
    ///
    /// This function will return an error if the listening socket cannot be
    /// bound or accepting connections fails.
    pub async fn run_until(self, stop: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let local = &self.config.local;
        let target = self.relay.target();

        internal!(
            level = INFO,
            "Relaying {}:{} to {} (tls: {}, auth: {})",
            local.host,
            local.port,
            target.address(),
            target.tls,
            target.credentials.is_some()
        );

        let smtp = Smtp::new(self.relay, SessionConfig::from(local));
        let listener = Listener::bind((local.host.as_str(), local.port), smtp)
            .await
            .map_err(|err| {
                anyhow::anyhow!("Failed to bind {}:{}: {err}", local.host, local.port)
            })?;

        let (sender, receiver) = broadcast::channel(16);
        let serving = listener.serve(receiver);
        tokio::pin!(serving);

        tokio::select! {
            result = &mut serving => return result,
            () = stop => {}
        }

        // Fails only if the listener has already stopped
        let _ = sender.send(Signal::Shutdown);
        serving.await?;

        internal!(level = INFO, "Shut down");
        Ok(())
    }
}
