//! Test support: a mailbox wrapper that journals every operation.

use crate::addressing::{Phase, Tag};
use crate::error::ChannelError;
use crate::ingredient::SmokerId;
use crate::local::LocalMailbox;
use crate::mailbox::{Mailbox, Message, Payload};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Event {
    pub op: Op,
    pub tag: Tag,
}

impl Event {
    pub fn is(&self, op: Op, phase: Phase) -> bool {
        self.op == op && self.tag.phase() == phase
    }

    pub fn smoker(&self) -> SmokerId {
        self.tag.smoker()
    }
}

/// Journals sends while holding the journal lock across the send, and
/// receives after they return, so a receive is always journaled after the
/// send it consumed.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingMailbox {
    inner: Arc<LocalMailbox>,
    journal: Arc<Mutex<Vec<Event>>>,
}

impl RecordingMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> Vec<Event> {
        self.journal.lock().clone()
    }
}

impl Mailbox for RecordingMailbox {
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError> {
        let mut journal = self.journal.lock();
        self.inner.send(tag, payload)?;
        journal.push(Event { op: Op::Sent, tag });
        Ok(())
    }

    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError> {
        let msg = self.inner.recv_matching(tag)?;
        self.journal.lock().push(Event {
            op: Op::Received,
            tag,
        });
        Ok(msg)
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        self.inner.destroy()
    }
}
