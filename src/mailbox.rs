use crate::addressing::Tag;
use crate::error::ChannelError;
use std::fmt::Debug;
use std::sync::Arc;

/// Size of the text area of a message, terminator included.
///
/// Large enough for two ingredient numbers, the `:` delimiter and a NUL.
pub const PAYLOAD_SIZE: usize = 20;

/// Fixed-size, NUL-terminated text carried by every message.
///
/// Delivery messages carry `"<n>:<n>"`; all other phases carry an empty
/// text.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Payload {
    bytes: [u8; PAYLOAD_SIZE],
}

impl Payload {
    pub const fn empty() -> Self {
        Self {
            bytes: [0u8; PAYLOAD_SIZE],
        }
    }

    /// Builds a payload from raw wire bytes, truncating to `PAYLOAD_SIZE - 1`
    /// so the text stays terminated.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut payload = Self::empty();
        let n = raw.len().min(PAYLOAD_SIZE - 1);
        payload.bytes[..n].copy_from_slice(&raw[..n]);
        payload
    }

    /// Replaces the text, truncating it to fit.
    pub fn write_text(&mut self, text: &str) {
        *self = Self::from_bytes(text.as_bytes());
    }

    /// The text up to (not including) the first NUL.
    pub fn text(&self) -> &[u8] {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(PAYLOAD_SIZE);
        &self.bytes[..end]
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Number of bytes that go on the wire: the text plus its terminator.
    pub fn wire_len(&self) -> usize {
        (self.text().len() + 1).min(PAYLOAD_SIZE)
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.bytes
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Payload({:?})", String::from_utf8_lossy(self.text()))
    }
}

/// A tagged message as stored in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub tag: Tag,
    pub payload: Payload,
}

/// The shared mailbox every participant talks through.
///
/// A `Mailbox` is a multi-producer, multi-consumer queue of tagged messages
/// with **selective receive**: a receiver names the exact tag it wants and
/// blocks until such a message exists. Messages with other tags stay queued
/// for whoever asks for them later.
///
/// # Ordering
///
/// Messages sharing a tag are delivered in FIFO order. Nothing is promised
/// across different tags.
///
/// # Failure
///
/// Any error is fatal to the caller. Once the mailbox is destroyed, pending
/// and future operations fail with [`ChannelError::TornDown`] (or an
/// equivalent OS error on the System V backend).
///
/// Implemented by [`LocalMailbox`](crate::LocalMailbox) for threads inside
/// one process and by [`SysvMailbox`](crate::SysvMailbox) for separate
/// processes.
pub trait Mailbox {
    /// Enqueues `payload` under `tag`. Never blocks.
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError>;

    /// Blocks until a message tagged `tag` is available, then removes and
    /// returns it.
    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError>;

    /// Destroys the mailbox for every participant.
    fn destroy(&self) -> Result<(), ChannelError>;
}

impl<M: Mailbox + ?Sized> Mailbox for &M {
    #[inline(always)]
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError> {
        (**self).send(tag, payload)
    }

    #[inline(always)]
    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError> {
        (**self).recv_matching(tag)
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        (**self).destroy()
    }
}

impl<M: Mailbox + ?Sized> Mailbox for Arc<M> {
    #[inline(always)]
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError> {
        (**self).send(tag, payload)
    }

    #[inline(always)]
    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError> {
        (**self).recv_matching(tag)
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        (**self).destroy()
    }
}
