use crate::addressing::{TAG_SPACE, Tag};
use crate::error::ChannelError;
use crate::mailbox::{Mailbox, Message, Payload};
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Creates an in-process mailbox shared by threads.
///
/// This is the threaded counterpart of
/// [`SysvMailbox::create_or_attach`](crate::SysvMailbox::create_or_attach):
/// same selective-receive semantics, but the queues live on the heap and
/// every participant holds a clone of the returned [`Arc`].
pub fn local_mailbox() -> Arc<LocalMailbox> {
    Arc::new(LocalMailbox::new())
}

/// Per-tag FIFO plus the condition variable its receivers park on.
#[derive(Debug, Default)]
struct TagQueue {
    messages: Mutex<VecDeque<Payload>>,
    ready: Condvar,
}

/// A heap-allocated mailbox with one queue per tag.
///
/// Tags map one-to-one onto slots (`tag.index()`), so a receiver blocked on
/// one tag never observes or reorders messages of another tag. Each slot is
/// cache padded because different smokers park on different slots.
///
/// [`Mailbox::destroy`] closes every slot at once: queued messages are
/// dropped, blocked receivers wake up with [`ChannelError::TornDown`], and
/// any later call fails the same way.
#[derive(Debug)]
pub struct LocalMailbox {
    queues: Box<[CachePadded<TagQueue>]>,
    closed: AtomicBool,
}

impl LocalMailbox {
    pub fn new() -> Self {
        let mut queues = Vec::with_capacity(TAG_SPACE);
        queues.resize_with(TAG_SPACE, CachePadded::default);
        Self {
            queues: queues.into_boxed_slice(),
            closed: AtomicBool::new(false),
        }
    }

    #[inline(always)]
    fn queue(&self, tag: Tag) -> &TagQueue {
        &self.queues[tag.index()]
    }

    /// Number of messages currently queued under `tag`.
    pub fn pending(&self, tag: Tag) -> usize {
        self.queue(tag).messages.lock().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for LocalMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox for LocalMailbox {
    fn send(&self, tag: Tag, payload: &Payload) -> Result<(), ChannelError> {
        let queue = self.queue(tag);
        let mut messages = queue.messages.lock();
        // Checked under the slot lock so a concurrent destroy cannot slip in
        // between the check and the push.
        if self.is_destroyed() {
            return Err(ChannelError::TornDown { tag });
        }
        messages.push_back(*payload);
        queue.ready.notify_one();
        Ok(())
    }

    fn recv_matching(&self, tag: Tag) -> Result<Message, ChannelError> {
        let queue = self.queue(tag);
        let mut messages = queue.messages.lock();
        loop {
            if self.is_destroyed() {
                return Err(ChannelError::TornDown { tag });
            }
            if let Some(payload) = messages.pop_front() {
                return Ok(Message { tag, payload });
            }
            queue.ready.wait(&mut messages);
        }
    }

    fn destroy(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        for queue in self.queues.iter() {
            let mut messages = queue.messages.lock();
            messages.clear();
            queue.ready.notify_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::{Phase, tag};
    use crate::ingredient::{Ingredient, IngredientPair, SmokerId};
    use std::thread;
    use std::time::Duration;

    fn smoker(id: u8) -> SmokerId {
        SmokerId::new(id).unwrap()
    }

    fn text(s: &str) -> Payload {
        Payload::from_bytes(s.as_bytes())
    }

    #[test]
    fn send_then_recv_matching_roundtrip() {
        let mailbox = LocalMailbox::new();
        let t = tag(smoker(3), Phase::Deliver);
        let pair = IngredientPair::new(Ingredient::Paper, Ingredient::Tobacco);

        mailbox.send(t, &pair.to_payload()).unwrap();
        let msg = mailbox.recv_matching(t).unwrap();
        assert_eq!(msg.tag, t);
        assert_eq!(IngredientPair::from_payload(&msg.payload), Ok(pair));
    }

    #[test]
    fn non_matching_messages_stay_queued() {
        let mailbox = LocalMailbox::new();
        let request = tag(smoker(1), Phase::Request);
        let other = tag(smoker(2), Phase::Request);

        mailbox.send(other, &text("other")).unwrap();
        mailbox.send(request, &text("mine")).unwrap();

        let msg = mailbox.recv_matching(request).unwrap();
        assert_eq!(msg.payload.text(), b"mine");
        assert_eq!(mailbox.pending(other), 1, "other tag must be untouched");
        assert_eq!(mailbox.recv_matching(other).unwrap().payload.text(), b"other");
    }

    #[test]
    fn same_tag_messages_are_fifo() {
        let mailbox = LocalMailbox::new();
        let t = tag(smoker(2), Phase::Done);
        let interleaved = tag(smoker(2), Phase::Grant);

        for i in 0..5 {
            mailbox.send(t, &text(&i.to_string())).unwrap();
            mailbox.send(interleaved, &text("x")).unwrap();
        }
        for i in 0..5 {
            let msg = mailbox.recv_matching(t).unwrap();
            assert_eq!(msg.payload.text(), i.to_string().as_bytes());
        }
        assert_eq!(mailbox.pending(interleaved), 5);
    }


    #[test]
    fn recv_matching_blocks_until_matching_send() {
        let mailbox = local_mailbox();
        let t = tag(smoker(1), Phase::Grant);

        let rx = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.recv_matching(t))
        };

        thread::sleep(Duration::from_millis(20));
        // A message on a different tag must not wake the receiver.
        mailbox.send(tag(smoker(2), Phase::Grant), &Payload::empty()).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!rx.is_finished(), "receiver woke up on a foreign tag");

        mailbox.send(t, &text("go")).unwrap();
        let msg = rx.join().unwrap().unwrap();
        assert_eq!(msg.payload.text(), b"go");
    }

    #[test]
    fn destroy_wakes_blocked_receivers() {
        let mailbox = local_mailbox();
        let receivers: Vec<_> = SmokerId::ALL
            .into_iter()
            .map(|s| {
                let mailbox = mailbox.clone();
                thread::spawn(move || mailbox.recv_matching(tag(s, Phase::Grant)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        mailbox.destroy().unwrap();

        for rx in receivers {
            let err = rx.join().unwrap().unwrap_err();
            assert!(err.is_teardown(), "unexpected error: {err}");
        }
    }

    #[test]
    fn operations_fail_after_destroy() {
        let mailbox = LocalMailbox::new();
        let t = tag(smoker(3), Phase::Request);
        mailbox.send(t, &Payload::empty()).unwrap();
        mailbox.destroy().unwrap();

        assert!(mailbox.is_destroyed());
        assert!(mailbox.send(t, &Payload::empty()).unwrap_err().is_teardown());
        assert!(mailbox.recv_matching(t).unwrap_err().is_teardown());
        assert_eq!(mailbox.pending(t), 0, "destroy drops queued messages");
    }
}
