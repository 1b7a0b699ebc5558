/// One inbound mail transaction, as handed to the relay.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: String,
    recipients: Vec<String>,
    content: Vec<u8>,
}

impl Envelope {
    /// An empty `sender` is the null reverse-path (`<>`).
    #[must_use]
    pub fn new(sender: impl Into<String>, recipients: Vec<String>, content: Vec<u8>) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            content,
        }
    }

    /// Returns the [`Envelope`] sender for this message
    #[inline]
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Returns a mutable reference to the [`Envelope`] sender for this message
    #[inline]
    pub const fn sender_mut(&mut self) -> &mut String {
        &mut self.sender
    }

    /// Returns the [`Envelope`] recipients for this message, in the order given
    #[inline]
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Returns a mutable reference to the [`Envelope`] recipients for this message
    #[inline]
    pub const fn recipients_mut(&mut self) -> &mut Vec<String> {
        &mut self.recipients
    }

    /// The raw message, headers and body, exactly as received
    #[inline]
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    #[inline]
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }
}
