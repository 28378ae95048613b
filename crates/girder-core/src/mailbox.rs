//! Double-buffered per-interpreter message queue.
//!
//! A mailbox is split in two halves:
//!
//! - [`Mailbox`] is the sending side. It is cheap to clone and may be used
//!   from any thread; sends append to the "incoming" buffer under a lock.
//! - [`Inbox`] is the consuming side. It owns the "fetched" buffer and is
//!   held by exactly one thread (the interpreter's run loop), so reading
//!   fetched messages needs no lock.
//!
//! [`Inbox::fetch_messages`] swaps the two buffers under the lock, which
//! keeps the critical section O(1) apart from releasing the previous batch.
//!
//! Dropping the [`Inbox`] closes the mailbox: pending messages are released
//! and later sends are refused, so nothing accumulates for a consumer that
//! is gone.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::message::Message;

#[derive(Default)]
struct Queue {
    messages: Vec<Message>,
    closed: bool,
}

type Incoming = Arc<Mutex<Queue>>;

fn lock(incoming: &Incoming) -> MutexGuard<'_, Queue> {
    // A panicking sender cannot leave the queue half-updated.
    incoming.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Create a connected sender/consumer pair.
pub fn mailbox() -> (Mailbox, Inbox) {
    let incoming: Incoming = Arc::new(Mutex::new(Queue::default()));
    (
        Mailbox {
            incoming: incoming.clone(),
        },
        Inbox {
            incoming,
            fetched: Vec::new(),
        },
    )
}

/// Sending half of a mailbox.
#[derive(Clone)]
pub struct Mailbox {
    incoming: Incoming,
}

impl Mailbox {
    /// Acquire a reference to `message` and queue it.
    ///
    /// Returns false, keeping no reference, once the inbox has been dropped.
    pub fn send(&self, message: &Message) -> bool {
        let mut queue = lock(&self.incoming);
        if queue.closed {
            return false;
        }
        queue.messages.push(message.clone());
        true
    }

    /// Messages waiting for the next fetch.
    pub fn pending(&self) -> usize {
        lock(&self.incoming).messages.len()
    }

    /// Whether the consuming half is gone.
    pub fn is_closed(&self) -> bool {
        lock(&self.incoming).closed
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue = lock(&self.incoming);
        f.debug_struct("Mailbox")
            .field("pending", &queue.messages.len())
            .field("closed", &queue.closed)
            .finish()
    }
}

/// Consuming half of a mailbox.
pub struct Inbox {
    incoming: Incoming,
    fetched: Vec<Message>,
}

impl Inbox {
    /// Swap the incoming and fetched buffers, releasing the previous batch.
    ///
    /// Returns the number of newly fetched messages.
    pub fn fetch_messages(&mut self) -> usize {
        let mut queue = lock(&self.incoming);
        std::mem::swap(&mut queue.messages, &mut self.fetched);
        // The old fetched batch now sits in the queue; drop our references
        // and keep the allocation for the next round of sends.
        queue.messages.clear();
        self.fetched.len()
    }

    /// Message `index` of the current fetched batch.
    pub fn get_message(&self, index: usize) -> Result<&Message> {
        self.fetched.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.fetched.len(),
        })
    }

    /// The current fetched batch, in send order.
    pub fn fetched(&self) -> &[Message] {
        &self.fetched
    }

    /// Size of the current fetched batch.
    pub fn len(&self) -> usize {
        self.fetched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetched.is_empty()
    }

    /// A new sending handle for this inbox.
    pub fn sender(&self) -> Mailbox {
        Mailbox {
            incoming: self.incoming.clone(),
        }
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        let pending = {
            let mut queue = lock(&self.incoming);
            queue.closed = true;
            std::mem::take(&mut queue.messages)
        };
        // Released outside the lock.
        drop(pending);
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("fetched", &self.fetched.len())
            .finish_non_exhaustive()
    }
}
