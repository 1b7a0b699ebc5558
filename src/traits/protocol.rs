use std::{future::Future, net::SocketAddr};

use tokio::{net::TcpStream, sync::broadcast};

use crate::{controller::Signal, smtp::envelope::Envelope, smtp::error::SessionError};

pub trait SessionHandler {
    fn run(
        self,
        signal: broadcast::Receiver<Signal>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;
}

pub trait Protocol: Send + Sync {
    type Session: SessionHandler + Send + 'static;

    fn handle(&self, stream: TcpStream, address: SocketAddr) -> Self::Session;
}

/// Called once per completed inbound transaction.
///
/// The returned string is the complete reply line (`"<code> <text>"`) for
/// the end of `DATA`. Implementations must always produce one; there is no
/// error path back into the session.
pub trait DataHandler: Send + Sync + 'static {
    fn handle(&self, envelope: Envelope) -> impl Future<Output = String> + Send;
}
