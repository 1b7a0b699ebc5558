use std::{future::Future, io, net::SocketAddr, time::Duration};

use futures_util::future::join_all;
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::broadcast,
};

use crate::{
    controller::Signal,
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

/// Pause after a failed `accept` (EMFILE, ECONNABORTED, ...) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound connections.
pub trait Accept: Send + Sync {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        Self::accept(self).await
    }
}

pub struct Listener<Proto: Protocol, Acceptor: Accept = TcpListener> {
    handler: Proto,
    listener: Acceptor,
    socket: SocketAddr,
}

impl<Proto: Protocol> Listener<Proto> {
    /// Bind the listening socket. Nothing is accepted until [`serve`](Self::serve).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be resolved or bound.
    pub async fn bind(address: impl ToSocketAddrs, handler: Proto) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let socket = listener.local_addr()?;

        Ok(Self {
            handler,
            listener,
            socket,
        })
    }
}

impl<Proto: Protocol, Acceptor: Accept> Listener<Proto, Acceptor> {
    /// Serve connections from an already listening `acceptor` reachable at `socket`.
    pub const fn with_acceptor(acceptor: Acceptor, socket: SocketAddr, handler: Proto) -> Self {
        Self {
            handler,
            listener: acceptor,
            socket,
        }
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.socket
    }

    /// Accept connections until `shutdown` delivers [`Signal::Shutdown`], then
    /// wait for every open session to finish.
    ///
    /// A failed `accept` is logged and retried after a short pause.
    ///
    /// # Errors
    ///
    /// Accept failures are retried, so this does not currently fail.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        internal!(level = INFO, "Listening on {}", self.socket);
        let mut sessions = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)) {
                        internal!(level = INFO, "SMTP Listener {} Received Shutdown signal, finishing sessions ...", self.socket);
                        join_all(sessions).await;
                        break;
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, address) = match connection {
                        Ok(connection) => connection,
                        Err(err) => {
                            internal!(level = WARN, "Failed to accept connection on {}: {err}", self.socket);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    tracing::debug!("Connection received from {address}");

                    // Finished sessions are dropped so long-running listeners don't accumulate handles
                    sessions.retain(|session: &tokio::task::JoinHandle<()>| !session.is_finished());

                    let handler = self.handler.handle(stream, address);
                    let signal = shutdown.resubscribe();
                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = handler.run(signal).await
                            && !err.is_shutdown()
                        {
                            internal!(level = ERROR, "Session with {address} ended: {err}");
                        }
                    }));
                }
            }
        }

        Ok(())
    }
}
