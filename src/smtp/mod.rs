//! The inbound side: a plaintext, unauthenticated SMTP server that assembles
//! one [`Envelope`](envelope::Envelope) per transaction and hands it to a
//! [`DataHandler`].

pub mod command;
pub mod context;
pub mod envelope;
pub mod error;
pub mod extensions;
pub mod session;
pub mod status;

use core::fmt::{self, Display, Formatter};
use std::{net::SocketAddr, sync::Arc};

use tokio::{net::TcpStream, sync::broadcast};

use crate::{
    controller::Signal,
    traits::{
        fsm::FiniteStateMachine,
        protocol::{DataHandler, Protocol, SessionHandler},
    },
};

use self::{
    command::{Command, HeloVariant},
    context::Context,
    error::SessionError,
    session::{Session, SessionConfig},
    status::Status,
};

pub struct Smtp<Handler: DataHandler> {
    handler: Arc<Handler>,
    config: SessionConfig,
}

impl<Handler: DataHandler> Smtp<Handler> {
    pub fn new(handler: Handler, config: SessionConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
        }
    }
}

impl<Handler: DataHandler> Protocol for Smtp<Handler> {
    type Session = Session<TcpStream, Handler>;

    fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Self::Session {
        Session::create(stream, peer, Arc::clone(&self.handler), &self.config)
    }
}

impl<Handler: DataHandler> SessionHandler for Session<TcpStream, Handler> {
    async fn run(self, signal: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        Self::run(self, signal).await
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default)]
pub enum State {
    /// Waiting for HELO/EHLO.
    #[default]
    Connect,
    /// Greeted, no transaction in progress.
    Greeted,
    /// Sender accepted.
    Mail,
    /// At least one recipient accepted.
    Rcpt,
    /// Reading message content.
    Data,
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Connect => "Connect",
            Self::Greeted => "Greeted",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
        })
    }
}

impl FiniteStateMachine for State {
    type Input = Command;
    type Context = Context;

    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self {
        match (self, input) {
            (state, Command::Quit) => {
                context.respond(Status::GoodBye, "Bye");
                context.close = true;
                state
            }
            (state, Command::Noop) => {
                context.respond(Status::Ok, "OK");
                state
            }
            (state, Command::Vrfy(_)) => {
                context.respond(
                    Status::CannotVerify,
                    "Cannot VRFY user, but will accept message and attempt delivery",
                );
                state
            }
            (state, Command::NotImplemented(verb)) => {
                context.respond(Status::NotImplemented, format!("{verb} not implemented"));
                state
            }
            (state, Command::Invalid(reason)) => {
                context.respond(Status::InvalidParameters, reason);
                state
            }
            (state, Command::Unknown(_)) => {
                context.respond(Status::SyntaxError, "Command unrecognized");
                state
            }
            (Self::Connect, Command::Rset) => {
                context.respond(Status::Ok, "OK");
                Self::Connect
            }
            (_, Command::Rset) => {
                context.reset();
                context.respond(Status::Ok, "OK");
                Self::Greeted
            }
            (_, Command::Helo(HeloVariant::Ehlo(id))) => {
                context.reset();
                context.ehlo(&id);
                Self::Greeted
            }
            (_, Command::Helo(HeloVariant::Helo(id))) => {
                context.reset();
                context.respond(Status::Ok, format!("{} Hello {id}", context.banner));
                Self::Greeted
            }
            (Self::Greeted, Command::MailFrom { sender, size }) => {
                if let Some(size) = size
                    && context.exceeds_limit(size)
                {
                    context.respond(
                        Status::ExceededStorage,
                        "Message size exceeds fixed maximum message size",
                    );
                    return Self::Greeted;
                }

                *context.envelope.sender_mut() = sender.unwrap_or_default();
                context.respond(Status::Ok, "OK");
                Self::Mail
            }
            (Self::Mail | Self::Rcpt, Command::RcptTo(recipient)) => {
                context.envelope.recipients_mut().push(recipient);
                context.respond(Status::Ok, "OK");
                Self::Rcpt
            }
            (Self::Rcpt, Command::Data) => {
                context.respond(Status::StartMailInput, "End data with <CR><LF>.<CR><LF>");
                Self::Data
            }
            (Self::Connect, _) => {
                context.respond(Status::InvalidCommandSequence, "Send HELO/EHLO first");
                Self::Connect
            }
            (Self::Mail | Self::Rcpt, Command::MailFrom { .. }) => {
                context.respond(Status::InvalidCommandSequence, "Sender already specified");
                self
            }
            (Self::Greeted, Command::RcptTo(_) | Command::Data) => {
                context.respond(Status::InvalidCommandSequence, "Need MAIL command");
                Self::Greeted
            }
            (Self::Mail, Command::Data) => {
                context.respond(Status::InvalidCommandSequence, "Need RCPT command");
                Self::Mail
            }
            (state, _) => {
                context.respond(Status::InvalidCommandSequence, "Bad sequence of commands");
                state
            }
        }
    }
}
