//! SMTP client implementation with support for implicit TLS and STARTTLS.

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::{incoming, outgoing};

use super::{
    auth::{self, Mechanism},
    connection::ClientConnection,
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client for sending commands and receiving responses.
///
/// The client only frames commands and replies. Deciding what a reply code
/// means for the transaction is left to the caller.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_name: String,
}

impl SmtpClient {
    /// Opens a plain TCP connection to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution or the connection fails.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ClientError::Io)?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_name: host.to_string(),
        })
    }

    /// Opens a connection to `host:port` and negotiates TLS before anything
    /// else is exchanged (implicit TLS, "SMTPS").
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the TLS handshake fails.
    pub async fn connect_tls(host: &str, port: u16, connector: &TlsConnector) -> Result<Self> {
        let mut client = Self::connect(host, port).await?;
        client.upgrade(connector).await?;
        Ok(client)
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        self.send_line(command).await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Like [`command`](Self::command), but `shown` is logged in place of
    /// the line actually sent.
    async fn secret_command(&mut self, command: &str, shown: &str) -> Result<Response> {
        outgoing!("{shown}");
        self.send_line(command).await?;
        self.read_response().await
    }

    /// Sends EHLO with the specified domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// Sends HELO with the specified domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Sends MAIL FROM command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str, size: Option<usize>) -> Result<Response> {
        let cmd = if let Some(sz) = size {
            format!("MAIL FROM:<{from}> SIZE={sz}")
        } else {
            format!("MAIL FROM:<{from}>")
        };
        self.command(&cmd).await
    }

    /// Sends RCPT TO command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Sends DATA command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content, dot-stuffed and terminated with `<CRLF>.<CRLF>`,
    /// and reads the final response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, content: &[u8]) -> Result<Response> {
        let encoded = encode_data(content);
        outgoing!("<{} bytes of message data>", encoded.len());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(&encoded)
            .await?;

        self.read_response().await
    }

    /// Sends QUIT command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and, if the server agrees, upgrades the connection.
    ///
    /// The server's reply is returned either way; a refusal leaves the
    /// connection in plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self, connector: &TlsConnector) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            self.upgrade(connector).await?;
        }

        Ok(response)
    }

    async fn upgrade(&mut self, connector: &TlsConnector) -> Result<()> {
        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;

        // Anything buffered before the handshake was sent in plaintext
        self.buffer_pos = 0;

        self.connection = Some(
            connection
                .upgrade_to_tls(&self.server_name, connector)
                .await?,
        );

        Ok(())
    }

    /// Runs an AUTH exchange and returns the final response (235 on success).
    ///
    /// Credentials never reach the log.
    ///
    /// # Errors
    ///
    /// Returns an error if any exchange fails at the transport level.
    pub async fn authenticate(
        &mut self,
        mechanism: Mechanism,
        username: &str,
        password: &str,
    ) -> Result<Response> {
        match mechanism {
            Mechanism::Plain => {
                self.secret_command(
                    &format!("AUTH PLAIN {}", auth::plain_response(username, password)),
                    "AUTH PLAIN <redacted>",
                )
                .await
            }
            Mechanism::Login => {
                let response = self.command("AUTH LOGIN").await?;
                if response.code != 334 {
                    return Ok(response);
                }

                let response = self
                    .secret_command(&auth::login_response(username), "<redacted username>")
                    .await?;
                if response.code != 334 {
                    return Ok(response);
                }

                self.secret_command(&auth::login_response(password), "<redacted password>")
                    .await
            }
        }
    }

    /// Shuts the connection down. Further commands fail with
    /// `ClientError::ConnectionClosed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown itself fails; the socket is released regardless.
    pub async fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(mut connection) => connection.shutdown().await,
            None => Ok(()),
        }
    }

    /// Reads a complete SMTP response from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the response is malformed.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            // Try to parse a complete response from the buffer
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                // Remove consumed bytes from buffer
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{response}");

                return Ok(response);
            }

            // Need more data - read from connection
            if self.buffer_pos >= self.buffer.len() {
                // Buffer is full but no complete response - expand buffer
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

/// Applies SMTP transparency to message content (RFC 5321 4.5.2).
///
/// Line endings are normalised to CRLF, a leading `.` on any line is
/// doubled, a final CRLF is added if missing, and the `.<CRLF>` terminator
/// is appended.
#[must_use]
pub fn encode_data(content: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(content.len() + content.len() / 64 + 5);
    let mut line_start = true;
    let mut bytes = content.iter().copied().peekable();

    while let Some(byte) = bytes.next() {
        if line_start && byte == b'.' {
            encoded.push(b'.');
        }

        match byte {
            b'\r' => {
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
                encoded.extend_from_slice(b"\r\n");
                line_start = true;
            }
            b'\n' => {
                encoded.extend_from_slice(b"\r\n");
                line_start = true;
            }
            _ => {
                encoded.push(byte);
                line_start = false;
            }
        }
    }

    if !encoded.ends_with(b"\r\n") {
        encoded.extend_from_slice(b"\r\n");
    }
    encoded.extend_from_slice(b".\r\n");

    encoded
}
