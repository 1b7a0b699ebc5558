//! One relay attempt against the upstream.
//!
//! The attempt runs strictly in order: connect (with TLS when implicit),
//! greeting, EHLO, optional STARTTLS and a second EHLO, optional AUTH,
//! `MAIL FROM`, `RCPT TO` for every recipient, `DATA`, and finally `QUIT`.
//! Every network step is bounded by the target's [`ClientTimeouts`](crate::config::ClientTimeouts).

use std::{future::Future, time::Duration};

use tokio_rustls::TlsConnector;

use crate::{
    client::{self, Capabilities, ClientError, Mechanism, Response, SmtpClient, tls_connector},
    internal,
    smtp::envelope::Envelope,
};

use super::{
    error::DeliveryError,
    outcome::{DeliveryOutcome, RefusedRecipient},
    target::{TlsMode, UpstreamTarget},
};

/// Relays `envelope` to `target` and reports what happened.
///
/// Never fails: every error is folded into [`DeliveryOutcome::Failed`].
/// The envelope is passed through untouched.
pub async fn deliver(target: &UpstreamTarget, envelope: &Envelope) -> DeliveryOutcome {
    let connector = match connector_for(target) {
        Ok(connector) => connector,
        Err(err) => return DeliveryOutcome::Failed(err),
    };

    deliver_with(target, connector, envelope).await
}

/// Builds the TLS connector a target needs, if any.
///
/// # Errors
///
/// Returns [`DeliveryError::Tls`] when the configured CA bundle is unusable.
pub fn connector_for(target: &UpstreamTarget) -> Result<Option<TlsConnector>, DeliveryError> {
    if target.tls == TlsMode::None {
        return Ok(None);
    }

    tls_connector(target.accept_invalid_certs, target.ca_certificate.as_deref())
        .map(Some)
        .map_err(DeliveryError::from)
}

/// As [`deliver`], reusing a connector built once with [`connector_for`].
#[tracing::instrument(
    level = "info",
    skip_all,
    fields(
        upstream = %target.address(),
        tls = %target.tls,
        sender = envelope.sender(),
        recipients = envelope.recipients().len(),
    )
)]
pub async fn deliver_with(
    target: &UpstreamTarget,
    connector: Option<TlsConnector>,
    envelope: &Envelope,
) -> DeliveryOutcome {
    if target.accept_invalid_certs && target.tls != TlsMode::None {
        tracing::warn!(
            upstream = %target.address(),
            "TLS certificate validation is disabled for this connection"
        );
    }

    let transaction = RelayTransaction {
        target,
        envelope,
        connector,
    };

    let mut client = match transaction.connect().await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!("Unable to reach upstream: {err}");
            return DeliveryOutcome::Failed(err);
        }
    };

    let result = transaction.submit(&mut client).await;
    transaction.quit(&mut client).await;

    let outcome = DeliveryOutcome::from(result);
    match &outcome {
        DeliveryOutcome::Delivered => tracing::info!("Message delivered"),
        DeliveryOutcome::PartiallyRefused(refused) => tracing::info!(
            refused = refused.len(),
            "Message delivered, some recipients were refused"
        ),
        DeliveryOutcome::Failed(err) => tracing::warn!(code = ?err.code(), "Delivery failed: {err}"),
    }

    outcome
}

struct RelayTransaction<'a> {
    target: &'a UpstreamTarget,
    envelope: &'a Envelope,
    connector: Option<TlsConnector>,
}

impl RelayTransaction<'_> {
    async fn connect(&self) -> Result<SmtpClient, DeliveryError> {
        let (host, port) = (self.target.host.as_str(), self.target.port);
        let limit = self.target.timeouts.connect();

        let connecting = async {
            match (self.target.tls, self.connector.as_ref()) {
                (TlsMode::Implicit, Some(connector)) => {
                    SmtpClient::connect_tls(host, port, connector).await
                }
                (TlsMode::Implicit, None) => Err(ClientError::TlsError(String::from(
                    "No TLS connector available",
                ))),
                _ => SmtpClient::connect(host, port).await,
            }
        };

        match tokio::time::timeout(limit, connecting).await {
            Err(_) => Err(DeliveryError::Transport(format!(
                "Timed out after {limit:?} connecting to {}",
                self.target.address()
            ))),
            Ok(Err(ClientError::Io(err))) => Err(DeliveryError::Transport(format!(
                "Could not connect to {}: {err}",
                self.target.address()
            ))),
            Ok(result) => Ok(result?),
        }
    }

    /// Everything between the connect and the `QUIT`. Returns the recipients
    /// the upstream refused while accepting the message for the rest.
    async fn submit(&self, client: &mut SmtpClient) -> Result<Vec<RefusedRecipient>, DeliveryError> {
        let command = self.target.timeouts.command();

        let greeting = timed(command, "the greeting", client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(DeliveryError::Rejected {
                code: greeting.code,
                message: greeting.text(),
            });
        }

        let mut capabilities = self.hello(client).await?;

        if self.target.tls == TlsMode::StartTls {
            self.starttls(client, &capabilities).await?;
            capabilities = self.hello(client).await?;
        }

        if let Some(credentials) = self.target.credentials.as_ref() {
            self.authenticate(client, &capabilities, &credentials.username, &credentials.password)
                .await?;
        }

        let size = capabilities.size().map(|_| self.envelope.content().len());
        let response = timed(
            command,
            "MAIL FROM",
            client.mail_from(self.envelope.sender(), size),
        )
        .await?;
        if !response.is_success() {
            return Err(DeliveryError::Sender {
                code: response.code,
                message: response.text(),
            });
        }

        let refused = self.recipients(client).await?;

        let response = timed(command, "DATA", client.data()).await?;
        if response.code != 354 {
            return Err(submission(&response));
        }

        let response = timed(
            self.target.timeouts.data(),
            "the end of data",
            client.send_data(self.envelope.content()),
        )
        .await?;
        if !response.is_success() {
            return Err(submission(&response));
        }

        Ok(refused)
    }

    /// EHLO, falling back to HELO when the server does not speak ESMTP.
    async fn hello(&self, client: &mut SmtpClient) -> Result<Capabilities, DeliveryError> {
        let command = self.target.timeouts.command();
        let name = self.target.helo_name.as_str();

        let response = timed(command, "EHLO", client.ehlo(name)).await?;
        if response.is_success() {
            return Ok(Capabilities::from_ehlo(&response));
        }

        internal!(
            level = DEBUG,
            "EHLO rejected with {}, falling back to HELO",
            response.code
        );

        let response = timed(command, "HELO", client.helo(name)).await?;
        if response.is_success() {
            Ok(Capabilities::default())
        } else {
            Err(DeliveryError::Rejected {
                code: response.code,
                message: response.text(),
            })
        }
    }

    async fn starttls(
        &self,
        client: &mut SmtpClient,
        capabilities: &Capabilities,
    ) -> Result<(), DeliveryError> {
        if !capabilities.starttls() {
            return Err(DeliveryError::Tls {
                code: None,
                message: format!("{} does not offer STARTTLS", self.target.address()),
            });
        }

        let connector = self.connector.as_ref().ok_or_else(|| DeliveryError::Tls {
            code: None,
            message: String::from("No TLS connector available"),
        })?;

        let response = timed(
            self.target.timeouts.command(),
            "STARTTLS",
            client.starttls(connector),
        )
        .await?;

        if !response.is_success() {
            return Err(DeliveryError::Tls {
                code: Some(response.code),
                message: response.text(),
            });
        }

        internal!(level = DEBUG, "Connection upgraded with STARTTLS");
        Ok(())
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        capabilities: &Capabilities,
        username: &str,
        password: &str,
    ) -> Result<(), DeliveryError> {
        let offered = capabilities.auth_mechanisms();
        if offered.is_empty() {
            return Err(DeliveryError::Auth {
                code: None,
                message: format!("{} does not offer AUTH", self.target.address()),
            });
        }

        let mechanism = Mechanism::negotiate(&offered).ok_or_else(|| DeliveryError::Auth {
            code: None,
            message: format!("No supported AUTH mechanism, server offers {}", offered.join(" ")),
        })?;

        let response = timed(
            self.target.timeouts.command(),
            "AUTH",
            client.authenticate(mechanism, username, password),
        )
        .await?;

        if response.is_success() {
            internal!(level = DEBUG, "Authenticated with {}", mechanism.name());
            Ok(())
        } else {
            Err(DeliveryError::Auth {
                code: Some(response.code),
                message: response.text(),
            })
        }
    }

    async fn recipients(
        &self,
        client: &mut SmtpClient,
    ) -> Result<Vec<RefusedRecipient>, DeliveryError> {
        let command = self.target.timeouts.command();
        let mut refused = Vec::new();

        for recipient in self.envelope.recipients() {
            let response = timed(command, "RCPT TO", client.rcpt_to(recipient)).await?;
            if !response.is_success() {
                refused.push(RefusedRecipient {
                    address: recipient.clone(),
                    code: response.code,
                    message: response.text(),
                });
            }
        }

        if refused.len() == self.envelope.recipients().len() {
            return Err(DeliveryError::all_refused(refused));
        }

        Ok(refused)
    }

    /// Best-effort `QUIT` and close. Failures are logged and otherwise ignored.
    async fn quit(&self, client: &mut SmtpClient) {
        match tokio::time::timeout(self.target.timeouts.quit(), client.quit()).await {
            Ok(Ok(response)) if response.is_success() => {}
            Ok(Ok(response)) => tracing::debug!("Upstream answered QUIT with {response}"),
            Ok(Err(err)) => tracing::warn!("QUIT failed: {err}"),
            Err(_) => tracing::warn!(
                timeout = ?self.target.timeouts.quit(),
                "QUIT timed out"
            ),
        }

        if let Err(err) = client.close().await {
            tracing::debug!("Error closing upstream connection: {err}");
        }
    }
}

fn submission(response: &Response) -> DeliveryError {
    DeliveryError::Submission {
        code: response.code,
        message: response.text(),
    }
}

/// Bound one exchange with the upstream, treating an overrun as a transport failure.
async fn timed<T>(
    limit: Duration,
    step: &str,
    exchange: impl Future<Output = client::Result<T>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| DeliveryError::Transport(format!("Timed out after {limit:?} waiting for {step}")))?
        .map_err(DeliveryError::from)
}
