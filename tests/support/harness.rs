//! End-to-end test harness for the bridge
//!
//! Starts a [`MockSmtpServer`] as the upstream and a bridge listener relaying
//! to it, both on random local ports.
//!
//! # Example
//!
//! ```no_run
//! use support::{BridgeHarness, MockSmtpServer};
//!
//! #[tokio::test]
//! async fn test_relay() {
//!     let harness = BridgeHarness::builder()
//!         .with_upstream(MockSmtpServer::builder())
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let reply = harness
//!         .send_email("a@example.org", &["b@example.com"], "Subject: Hi\r\n\r\nHello\r\n")
//!         .await
//!         .unwrap();
//!     assert_eq!(reply.code, 250);
//!
//!     harness.shutdown().await;
//! }
//! ```

use std::time::Duration;

use smtp_bridge::{
    client::{Response, SmtpClient},
    config::{ClientTimeouts, ServerTimeouts},
    controller::Signal,
    listener::Listener,
    relay::{RelayHandler, TlsMode, UpstreamTarget},
    smtp::{Smtp, session::SessionConfig},
};
use tokio::{sync::broadcast, task::JoinHandle, time::timeout};

use super::mock_server::{MockSmtpServer, MockSmtpServerBuilder, SmtpCommand};

pub struct BridgeHarness {
    /// Port the bridge is listening on
    port: u16,

    /// Mock upstream SMTP server
    mock_server: MockSmtpServer,

    listener_handle: JoinHandle<anyhow::Result<()>>,

    shutdown_tx: broadcast::Sender<Signal>,
}

impl BridgeHarness {
    #[must_use]
    pub fn builder() -> BridgeHarnessBuilder {
        BridgeHarnessBuilder::new()
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn mock_server(&self) -> &MockSmtpServer {
        &self.mock_server
    }

    /// Get all commands received by the upstream
    pub async fn upstream_commands(&self) -> Vec<SmtpCommand> {
        self.mock_server.commands().await
    }

    /// Open a plain connection to the bridge and read its greeting
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge cannot be reached or does not greet with 220.
    pub async fn connect(&self) -> anyhow::Result<SmtpClient> {
        let mut client = SmtpClient::connect("127.0.0.1", self.port).await?;
        let greeting = client.read_greeting().await?;
        anyhow::ensure!(greeting.code == 220, "Unexpected greeting: {greeting:?}");
        Ok(client)
    }

    /// Submit one message through the bridge and return the reply to the end of `DATA`
    ///
    /// # Errors
    ///
    /// Returns an error if any step before the end of `DATA` is refused.
    pub async fn send_email(
        &self,
        from: &str,
        to: &[&str],
        message: &str,
    ) -> anyhow::Result<Response> {
        let mut client = self.connect().await?;

        let response = client.ehlo("test-client").await?;
        anyhow::ensure!(response.is_success(), "EHLO refused: {response:?}");

        let response = client.mail_from(from, None).await?;
        anyhow::ensure!(response.is_success(), "MAIL FROM refused: {response:?}");

        for recipient in to {
            let response = client.rcpt_to(recipient).await?;
            anyhow::ensure!(response.is_success(), "RCPT TO refused: {response:?}");
        }

        let response = client.data().await?;
        anyhow::ensure!(response.code == 354, "DATA refused: {response:?}");

        let reply = client.send_data(message.as_bytes()).await?;

        client.quit().await?;
        client.close().await?;

        Ok(reply)
    }

    /// Shutdown the bridge and the upstream
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
        self.mock_server.shutdown();

        let _ = timeout(Duration::from_secs(5), self.listener_handle).await;
    }
}

/// Builder for configuring a bridge test harness
pub struct BridgeHarnessBuilder {
    upstream: MockSmtpServerBuilder,
    tls: TlsMode,
    credentials: Option<(String, String)>,
    client_timeouts: ClientTimeouts,
    session: SessionConfig,
}

impl BridgeHarnessBuilder {
    fn new() -> Self {
        Self {
            upstream: MockSmtpServer::builder(),
            tls: TlsMode::None,
            credentials: None,
            client_timeouts: ClientTimeouts::uniform(5),
            session: SessionConfig {
                banner: String::from("bridge.test"),
                max_message_size: 10_000,
                timeouts: ServerTimeouts::default(),
            },
        }
    }

    /// Configure the mock upstream
    #[must_use]
    pub fn with_upstream(mut self, upstream: MockSmtpServerBuilder) -> Self {
        self.upstream = upstream;
        self
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    #[must_use]
    pub const fn with_client_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.client_timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.session.max_message_size = size;
        self
    }

    /// Build and start the harness
    ///
    /// # Errors
    ///
    /// Returns an error if either side fails to start.
    pub async fn build(self) -> anyhow::Result<BridgeHarness> {
        let mock_server = self.upstream.build().await?;

        let mut target = UpstreamTarget::new("127.0.0.1", mock_server.port())
            .with_tls(self.tls)
            .accept_invalid_certs(true)
            .with_helo_name("bridge.test")
            .with_timeouts(self.client_timeouts);
        if let Some((username, password)) = self.credentials {
            target = target.with_credentials(username, password);
        }

        let smtp = Smtp::new(RelayHandler::new(target)?, self.session);
        let listener = Listener::bind("127.0.0.1:0", smtp).await?;
        let port = listener.local_addr().port();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
        let listener_handle = tokio::spawn(listener.serve(shutdown_rx));

        Ok(BridgeHarness {
            port,
            mock_server,
            listener_handle,
            shutdown_tx,
        })
    }
}
