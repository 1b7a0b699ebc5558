//! Mock upstream SMTP server for relay tests
//!
//! This module provides a configurable mock SMTP server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each command with a configured reply, per recipient for `RCPT TO`
//! - Speak STARTTLS or implicit TLS with a freshly generated self-signed certificate
//! - Record every command, credential and message body it receives
//! - Stop answering at a chosen point to exercise client timeouts
//! - Count connections the client has closed
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_response_for("nobody@example.com", 550, "User unknown")
//!     .with_starttls()
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// HELO command with hostname
    Helo(String),
    /// STARTTLS command
    StartTls,
    /// `AUTH PLAIN` with its base64 payload
    AuthPlain(String),
    /// `AUTH LOGIN` with the base64 username and password
    AuthLogin(String, String),
    /// MAIL FROM command, everything after the verb
    MailFrom(String),
    /// RCPT TO command, everything after the verb
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content (after DATA), dot-unstuffed
    MessageContent(Vec<u8>),
    /// QUIT command
    Quit,
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// Where the server stops answering.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stall {
    Greeting,
    Command(String),
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_code: u16,
    capabilities: Vec<String>,
    helo_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rcpt_responses: HashMap<String, SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    implicit_tls: bool,
    stall: Option<Stall>,
}

impl MockServerConfig {
    fn ehlo_bytes(&self, tls_active: bool) -> Vec<u8> {
        let capabilities: Vec<&String> = self
            .capabilities
            .iter()
            .filter(|cap| !(tls_active && cap.eq_ignore_ascii_case("STARTTLS")))
            .collect();

        let mut response = String::new();
        let last = capabilities.len().saturating_sub(1);

        for (i, cap) in capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.ehlo_code);
        }

        response.into_bytes()
    }

    fn rcpt_bytes(&self, argument: &str) -> Vec<u8> {
        let address = argument
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .map_or(argument, |(address, _)| address)
            .to_ascii_lowercase();

        self.rcpt_responses
            .get(&address)
            .unwrap_or(&self.rcpt_to_response)
            .to_bytes()
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_code: 250,
            capabilities: vec!["localhost".to_string(), "SIZE 10000".to_string()],
            helo_response: SmtpResponse::new(250, "Hello"),
            starttls_response: None,
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rcpt_responses: HashMap::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            implicit_tls: false,
            stall: None,
        }
    }
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Stream = BufReader<Box<dyn Io>>;

#[derive(Clone)]
struct Shared {
    config: Arc<MockServerConfig>,
    acceptor: Option<TlsAcceptor>,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    shared: Shared,
    certificate_pem: Option<String>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// PEM of the server certificate, when TLS is enabled
    #[must_use]
    pub fn certificate_pem(&self) -> Option<&str> {
        self.certificate_pem.as_deref()
    }

    /// Get all commands received by the server, across every connection
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.shared.commands.read().await.clone()
    }

    /// Message bodies received so far
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Connections accepted so far
    #[must_use]
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::Relaxed)
    }

    /// Connections the client has closed so far
    #[must_use]
    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::Relaxed)
    }

    /// Wait until at least `count` connections have been closed by the client.
    pub async fn wait_for_closed(&self, count: usize, limit: Duration) -> bool {
        timeout(limit, async {
            while self.closed() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        stream: Box<dyn Io>,
        shared: &Shared,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let config = &shared.config;

        let (stream, tls_active) = match (&shared.acceptor, config.implicit_tls) {
            (Some(acceptor), true) => {
                let tls: Box<dyn Io> = Box::new(acceptor.accept(stream).await?);
                (tls, true)
            }
            _ => (stream, false),
        };

        let mut stream: Stream = BufReader::new(stream);
        let mut tls_active = tls_active;

        if config.stall == Some(Stall::Greeting) {
            return drain(&mut stream).await;
        }

        reply(&mut stream, &config.greeting.to_bytes()).await?;

        let mut line = String::new();
        loop {
            line.clear();
            if stream.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let cmd_line = line.trim_end();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));
            let verb = verb.to_ascii_uppercase();

            let smtp_cmd = match verb.as_str() {
                "EHLO" => SmtpCommand::Ehlo(argument.to_string()),
                "HELO" => SmtpCommand::Helo(argument.to_string()),
                "STARTTLS" => SmtpCommand::StartTls,
                "MAIL" => SmtpCommand::MailFrom(argument.to_string()),
                "RCPT" => SmtpCommand::RcptTo(argument.to_string()),
                "DATA" => SmtpCommand::Data,
                "QUIT" => SmtpCommand::Quit,
                "AUTH" => {
                    let command = authenticate(&mut stream, argument).await?;
                    shared.commands.write().await.push(command);
                    reply(&mut stream, &config.auth_response.to_bytes()).await?;
                    continue;
                }
                _ => SmtpCommand::Other(cmd_line.to_string()),
            };

            shared.commands.write().await.push(smtp_cmd.clone());

            if matches!(&config.stall, Some(Stall::Command(stall)) if *stall == verb) {
                return drain(&mut stream).await;
            }

            match smtp_cmd {
                SmtpCommand::Ehlo(_) => {
                    reply(&mut stream, &config.ehlo_bytes(tls_active)).await?;
                }
                SmtpCommand::Helo(_) => {
                    reply(&mut stream, &config.helo_response.to_bytes()).await?;
                }
                SmtpCommand::StartTls => {
                    let (Some(response), Some(acceptor)) =
                        (&config.starttls_response, &shared.acceptor)
                    else {
                        reply(&mut stream, b"502 Command not implemented\r\n").await?;
                        continue;
                    };

                    reply(&mut stream, &response.to_bytes()).await?;
                    if response.code == 220 {
                        let plain = stream.into_inner();
                        let tls: Box<dyn Io> = Box::new(acceptor.accept(plain).await?);
                        stream = BufReader::new(tls);
                        tls_active = true;
                    }
                }
                SmtpCommand::MailFrom(_) => {
                    reply(&mut stream, &config.mail_from_response.to_bytes()).await?;
                }
                SmtpCommand::RcptTo(ref argument) => {
                    reply(&mut stream, &config.rcpt_bytes(argument)).await?;
                }
                SmtpCommand::Data => {
                    reply(&mut stream, &config.data_response.to_bytes()).await?;
                    if config.data_response.code != 354 {
                        continue;
                    }

                    let Some(content) = read_message(&mut stream).await? else {
                        return Ok(());
                    };
                    shared
                        .commands
                        .write()
                        .await
                        .push(SmtpCommand::MessageContent(content));

                    if config.stall == Some(Stall::Command(String::from("."))) {
                        return drain(&mut stream).await;
                    }

                    reply(&mut stream, &config.data_end_response.to_bytes()).await?;
                }
                SmtpCommand::Quit => {
                    reply(&mut stream, &config.quit_response.to_bytes()).await?;
                    return drain(&mut stream).await;
                }
                SmtpCommand::Other(_) => {
                    reply(&mut stream, b"500 Unknown command\r\n").await?;
                }
                SmtpCommand::AuthPlain(_)
                | SmtpCommand::AuthLogin(..)
                | SmtpCommand::MessageContent(_) => unreachable!(),
            }
        }
    }
}

async fn reply(stream: &mut Stream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Read and discard everything until the client closes the connection.
async fn drain(stream: &mut Stream) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = [0u8; 1024];
    while stream.read(&mut buf).await? > 0 {}
    Ok(())
}

async fn read_line(stream: &mut Stream) -> std::io::Result<String> {
    let mut line = String::new();
    stream.read_line(&mut line).await?;
    Ok(line.trim_end().to_string())
}

async fn authenticate(stream: &mut Stream, argument: &str) -> std::io::Result<SmtpCommand> {
    let (mechanism, initial) = argument.split_once(' ').unwrap_or((argument, ""));

    if mechanism.eq_ignore_ascii_case("PLAIN") {
        let payload = if initial.is_empty() {
            reply(stream, b"334 \r\n").await?;
            read_line(stream).await?
        } else {
            initial.to_string()
        };
        return Ok(SmtpCommand::AuthPlain(payload));
    }

    reply(stream, b"334 VXNlcm5hbWU6\r\n").await?;
    let username = read_line(stream).await?;
    reply(stream, b"334 UGFzc3dvcmQ6\r\n").await?;
    let password = read_line(stream).await?;

    Ok(SmtpCommand::AuthLogin(username, password))
}

/// Read message content until `<CRLF>.<CRLF>`, undoing dot-stuffing.
async fn read_message(stream: &mut Stream) -> std::io::Result<Option<Vec<u8>>> {
    let mut content = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if stream.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }

        if line == b".\r\n" {
            return Ok(Some(content));
        }

        let unstuffed = if line.starts_with(b".") { &line[1..] } else { &line[..] };
        content.extend_from_slice(unstuffed);
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
    tls: bool,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
            tls: false,
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set the EHLO response; the first capability is the greeting line
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_code = code;
        self.config.capabilities = capabilities;
        self
    }

    /// Append a capability to the EHLO response
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.config.capabilities.push(capability.into());
        self
    }

    /// Set the HELO response
    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = SmtpResponse::new(code, message);
        self
    }

    /// Advertise STARTTLS and upgrade the connection when asked
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.tls = true;
        self.config.starttls_response = Some(SmtpResponse::new(220, "Ready to start TLS"));
        self.with_capability("STARTTLS")
    }

    /// Advertise STARTTLS but answer it with `code`
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.tls = true;
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self.with_capability("STARTTLS")
    }

    /// Negotiate TLS as soon as a connection is accepted
    #[must_use]
    pub const fn with_implicit_tls(mut self) -> Self {
        self.tls = true;
        self.config.implicit_tls = true;
        self
    }

    /// Set the final AUTH response
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response for every recipient without a specific one
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response for one recipient
    #[must_use]
    pub fn with_rcpt_response_for(
        mut self,
        address: &str,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.config
            .rcpt_responses
            .insert(address.to_ascii_lowercase(), SmtpResponse::new(code, message));
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Never send the greeting
    #[must_use]
    pub fn with_stalled_greeting(mut self) -> Self {
        self.config.stall = Some(Stall::Greeting);
        self
    }

    /// Stop answering once `verb` is received; `"."` stalls after the message content
    #[must_use]
    pub fn with_stall_on(mut self, verb: &str) -> Self {
        self.config.stall = Some(Stall::Command(verb.to_ascii_uppercase()));
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        // Bind to a random available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (acceptor, certificate_pem) = if self.tls {
            let (acceptor, pem) = self_signed_acceptor()?;
            (Some(acceptor), Some(pem))
        } else {
            (None, None)
        };

        let shared = Shared {
            config: Arc::new(self.config),
            acceptor,
            commands: Arc::new(RwLock::new(Vec::new())),
            connections: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        };
        let shutdown = Arc::new(AtomicBool::new(false));

        let accepting = shared.clone();
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    accepting.connections.fetch_add(1, Ordering::Relaxed);
                    let shared = accepting.clone();

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(Box::new(stream), &shared).await {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                        shared.closed.fetch_add(1, Ordering::Relaxed);
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            shared,
            certificate_pem,
            shutdown,
        })
    }
}

fn self_signed_acceptor() -> Result<(TlsAcceptor, String), std::io::Error> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(std::io::Error::other)?;

    let cert = CertificateDer::from(certified.cert.der().to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .map_err(std::io::Error::other)?;

    Ok((TlsAcceptor::from(Arc::new(config)), certified.cert.pem()))
}
