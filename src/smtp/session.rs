use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::broadcast,
};

use crate::{
    config::{LocalConfig, ServerTimeouts},
    controller::Signal,
    incoming, internal, outgoing,
    traits::{fsm::FiniteStateMachine, protocol::DataHandler},
};

use super::{
    State, command::Command, context::Context, error::SessionError, status::Status,
};

/// Longest command line read in one go (RFC 5321 allows 512, clients exceed it).
const MAX_COMMAND_LINE: u64 = 4096;

/// Longest text line read in one go during `DATA`. Longer lines are read in pieces.
const MAX_DATA_LINE: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub banner: String,
    /// Zero means unlimited.
    pub max_message_size: usize,
    pub timeouts: ServerTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&LocalConfig::default())
    }
}

impl From<&LocalConfig> for SessionConfig {
    fn from(local: &LocalConfig) -> Self {
        Self {
            banner: local.banner.clone(),
            max_message_size: local.max_message_size,
            timeouts: local.timeouts.clone(),
        }
    }
}

pub struct Session<Stream, Handler>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync,
    Handler: DataHandler,
{
    peer: SocketAddr,
    stream: BufReader<Stream>,
    state: State,
    context: Context,
    handler: Arc<Handler>,
    timeouts: ServerTimeouts,
}

impl<Stream, Handler> Session<Stream, Handler>
where
    Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync,
    Handler: DataHandler,
{
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        handler: Arc<Handler>,
        config: &SessionConfig,
    ) -> Self {
        let banner = if config.banner.is_empty() {
            Arc::from("localhost")
        } else {
            Arc::from(config.banner.as_str())
        };

        Self {
            peer,
            stream: BufReader::new(stream),
            state: State::default(),
            context: Context::new(banner, config.max_message_size),
            handler,
            timeouts: config.timeouts.clone(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(peer = %self.peer))]
    pub async fn run(mut self, mut signal: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        internal!("Connected");

        let result = self.serve(&mut signal).await;

        if let Err(err) = self.stream.shutdown().await {
            internal!(level = DEBUG, "Error closing connection: {err}");
        }
        internal!("Connection closed");

        result
    }

    async fn serve(&mut self, signal: &mut broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        let greeting = format!("{} {} ESMTP ready", Status::ServiceReady, self.context.banner);
        self.send(&[greeting]).await?;

        loop {
            let command_timeout = self.timeouts.command();

            let line = tokio::select! {
                _ = signal.recv() => return Err(self.shutting_down().await),
                line = tokio::time::timeout(command_timeout, self.read_command()) => line,
            };

            let Ok(line) = line else {
                return Err(self.timed_out(command_timeout).await);
            };

            // Reading 0 bytes means the other side has closed the
            // connection or is done writing, then so are we.
            let Some(line) = line? else {
                return Ok(());
            };

            let command = Command::try_from(line.as_slice()).unwrap_or_else(|e| e);
            incoming!("{command}");

            self.state = self.state.transition(command, &mut self.context);
            tracing::debug!("Transitioned to {}", self.state);

            let response = std::mem::take(&mut self.context.response);
            self.send(&response).await?;

            if self.context.close {
                return Ok(());
            }

            if self.state == State::Data {
                let reply = self.receive_data(signal).await?;
                self.send(&[reply]).await?;
            }
        }
    }

    /// Reads one command line. Over-long lines are discarded and reported as unknown.
    async fn read_command(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(MAX_COMMAND_LINE)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if !line.ends_with(b"\n") && read as u64 == MAX_COMMAND_LINE {
            let mut rest = Vec::new();
            while !rest.ends_with(b"\n") {
                rest.clear();
                if (&mut self.stream)
                    .take(MAX_COMMAND_LINE)
                    .read_until(b'\n', &mut rest)
                    .await?
                    == 0
                {
                    return Ok(None);
                }
            }
            return Ok(Some(b"line too long".to_vec()));
        }

        Ok(Some(line))
    }

    /// Reads the message up to the terminating `.` line, undoing dot-stuffing,
    /// and returns the reply for the end of `DATA`.
    ///
    /// A shutdown signal abandons the partial message.
    async fn receive_data(
        &mut self,
        signal: &mut broadcast::Receiver<Signal>,
    ) -> Result<String, SessionError> {
        let data_timeout = self.timeouts.data_block();
        let mut content = Vec::new();
        let mut line = Vec::new();
        let mut line_start = true;
        let mut exceeded = false;

        loop {
            line.clear();
            let mut limited = (&mut self.stream).take(MAX_DATA_LINE);
            let read = tokio::select! {
                _ = signal.recv() => None,
                read = tokio::time::timeout(
                    data_timeout,
                    limited.read_until(b'\n', &mut line),
                ) => Some(read),
            };
            let Some(read) = read else {
                return Err(self.shutting_down().await);
            };

            let Ok(read) = read else {
                return Err(self.timed_out(data_timeout).await);
            };

            if read? == 0 {
                return Err(SessionError::Connection(std::io::ErrorKind::UnexpectedEof.into()));
            }

            if line_start && (line == b".\r\n" || line == b".\n") {
                break;
            }

            let payload = if line_start && line.first() == Some(&b'.') {
                &line[1..]
            } else {
                &line[..]
            };
            line_start = line.ends_with(b"\n");

            if !exceeded {
                if self.context.exceeds_limit(content.len() + payload.len()) {
                    exceeded = true;
                    content = Vec::new();
                } else {
                    content.extend_from_slice(payload);
                }
            }
        }

        let mut envelope = std::mem::take(&mut self.context.envelope);
        self.state = State::Greeted;

        if exceeded {
            internal!(
                level = INFO,
                "Rejected message from <{}>: larger than {} bytes",
                envelope.sender(),
                self.context.max_message_size
            );
            return Ok(format!(
                "{} Message exceeds fixed maximum message size",
                Status::ExceededStorage
            ));
        }

        envelope.set_content(content);
        internal!(
            level = INFO,
            "Received message from <{}> for {} recipient(s), {} bytes",
            envelope.sender(),
            envelope.recipients().len(),
            envelope.content().len()
        );

        Ok(self.handler.handle(envelope).await)
    }

    async fn shutting_down(&mut self) -> SessionError {
        let reply = format!(
            "{} {} Service shutting down",
            Status::Unavailable,
            self.context.banner
        );
        if let Err(err) = self.send(&[reply]).await {
            internal!(level = DEBUG, "Unable to send shutdown reply: {err}");
        }

        SessionError::Shutdown
    }

    async fn timed_out(&mut self, after: Duration) -> SessionError {
        tracing::warn!(
            peer = %self.peer,
            state = %self.state,
            timeout = ?after,
            "Client connection timed out"
        );

        let reply = format!(
            "{} {} Timeout, closing connection",
            Status::Unavailable,
            self.context.banner
        );
        if let Err(err) = self.send(&[reply]).await {
            internal!(level = DEBUG, "Unable to send timeout reply: {err}");
        }

        SessionError::Timeout(after.as_secs())
    }

    async fn send(&mut self, lines: &[String]) -> Result<(), SessionError> {
        for line in lines {
            outgoing!("{line}");
            self.stream.write_all(format!("{line}\r\n").as_bytes()).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }
}
