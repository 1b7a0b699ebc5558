use std::sync::Arc;

use super::{envelope::Envelope, extensions::Extension, status::Status};

/// Per-session state the command state machine reads and writes.
#[derive(Debug)]
pub struct Context {
    pub banner: Arc<str>,
    pub extensions: Arc<[Extension]>,
    /// Zero means unlimited.
    pub max_message_size: usize,
    /// The transaction being assembled.
    pub envelope: Envelope,
    /// Reply lines queued for the client.
    pub response: Vec<String>,
    /// Close the connection once the queued reply has been sent.
    pub close: bool,
}

impl Context {
    #[must_use]
    pub fn new(banner: Arc<str>, max_message_size: usize) -> Self {
        Self {
            banner,
            extensions: Arc::new([Extension::Size(max_message_size), Extension::EightBitMime]),
            max_message_size,
            envelope: Envelope::default(),
            response: Vec::new(),
            close: false,
        }
    }

    pub fn respond<S: core::fmt::Display>(&mut self, status: Status, text: S) {
        self.response.push(format!("{status} {text}"));
    }

    /// Queue the (possibly multi-line) EHLO reply.
    pub fn ehlo(&mut self, id: &str) {
        let last = self.extensions.len();
        let greeting = format!("{} Hello {id}", self.banner);

        self.response.push(format!(
            "{}{}{greeting}",
            Status::Ok,
            if last == 0 { ' ' } else { '-' }
        ));

        for (idx, extension) in self.extensions.iter().enumerate() {
            self.response.push(format!(
                "{}{}{extension}",
                Status::Ok,
                if idx + 1 == last { ' ' } else { '-' }
            ));
        }
    }

    /// Abandon the transaction in progress.
    pub fn reset(&mut self) {
        self.envelope = Envelope::default();
    }

    /// Whether a declared or actual size is over the limit.
    #[must_use]
    pub const fn exceeds_limit(&self, size: usize) -> bool {
        self.max_message_size > 0 && size > self.max_message_size
    }
}
