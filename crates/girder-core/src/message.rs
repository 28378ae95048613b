//! Reference-counted message buffers.
//!
//! A [`Message`] is an immutable-length byte buffer tagged with a small
//! integer type. It is the unit of cross-interpreter communication and the
//! result type of every file load. Handles are cheap to clone: cloning is
//! *acquire*, dropping is *release*, and the buffer is freed when the last
//! handle goes away.
//!
//! Buffers are handed out by a [`MessageAllocator`], which keeps counters of
//! live messages and bytes so leaks are observable.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Default)]
struct AllocStats {
    live_messages: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocated: AtomicU64,
}

struct Buffer {
    message_type: u32,
    data: Box<[u8]>,
    stats: Arc<AllocStats>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.stats.live_messages.fetch_sub(1, Ordering::AcqRel);
        self.stats.live_bytes.fetch_sub(self.data.len(), Ordering::AcqRel);
    }
}

/// A shared, reference-counted byte buffer with a type tag.
#[derive(Clone)]
pub struct Message {
    inner: Arc<Buffer>,
}

impl Message {
    /// Caller-defined type tag.
    pub fn message_type(&self) -> u32 {
        self.inner.message_type
    }

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.inner.data
    }

    /// Payload length in bytes. Fixed at allocation.
    pub fn len(&self) -> usize {
        self.inner.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.is_empty()
    }

    /// Number of live handles to this buffer.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Mutable access to the payload, only while this is the sole handle.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.inner).map(|b| &mut b.data[..])
    }

    /// Retag the message. Fails (returns `false`) when the buffer is shared.
    pub fn set_message_type(&mut self, message_type: u32) -> bool {
        match Arc::get_mut(&mut self.inner) {
            Some(buffer) => {
                buffer.message_type = message_type;
                true
            }
            None => false,
        }
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.inner.data).into_owned()
    }

    /// Whether two handles point at the same buffer.
    pub fn ptr_eq(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.message_type())
            .field("len", &self.len())
            .field("refcount", &self.refcount())
            .finish_non_exhaustive()
    }
}

/// Hands out message buffers and tracks how many are alive.
///
/// Cloning the allocator shares the same counters.
#[derive(Clone, Default)]
pub struct MessageAllocator {
    stats: Arc<AllocStats>,
}

impl MessageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer of `length` bytes with type 0 and refcount 1.
    pub fn allocate(&self, length: usize) -> Result<Message> {
        self.allocate_typed(0, length)
    }

    /// Allocate a zeroed, typed buffer.
    pub fn allocate_typed(&self, message_type: u32, length: usize) -> Result<Message> {
        let mut data = Vec::new();
        data.try_reserve_exact(length).map_err(|_| {
            log::error!("[alloc] failed to reserve {} bytes", length);
            Error::OutOfMemory { requested: length }
        })?;
        data.resize(length, 0);
        Ok(self.wrap(message_type, data))
    }

    /// Allocate a buffer holding a copy of `bytes`.
    pub fn allocate_from(&self, message_type: u32, bytes: &[u8]) -> Result<Message> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())
            .map_err(|_| Error::OutOfMemory { requested: bytes.len() })?;
        data.extend_from_slice(bytes);
        Ok(self.wrap(message_type, data))
    }

    /// Allocate a buffer holding the UTF-8 bytes of `text`.
    pub fn allocate_text(&self, message_type: u32, text: &str) -> Result<Message> {
        self.allocate_from(message_type, text.as_bytes())
    }

    /// Take ownership of an existing byte vector without copying.
    pub fn adopt(&self, message_type: u32, data: Vec<u8>) -> Message {
        self.wrap(message_type, data)
    }

    /// Duplicate tag and bytes into a new buffer with its own refcount.
    pub fn copy(&self, source: &Message) -> Result<Message> {
        self.allocate_from(source.message_type(), source.data())
    }

    /// Messages allocated by this allocator that have not been freed yet.
    pub fn live_messages(&self) -> usize {
        self.stats.live_messages.load(Ordering::Acquire)
    }

    /// Payload bytes held by live messages.
    pub fn live_bytes(&self) -> usize {
        self.stats.live_bytes.load(Ordering::Acquire)
    }

    /// Messages allocated over the allocator's lifetime.
    pub fn total_allocated(&self) -> u64 {
        self.stats.total_allocated.load(Ordering::Acquire)
    }

    fn wrap(&self, message_type: u32, data: Vec<u8>) -> Message {
        self.stats.live_messages.fetch_add(1, Ordering::AcqRel);
        self.stats.live_bytes.fetch_add(data.len(), Ordering::AcqRel);
        self.stats.total_allocated.fetch_add(1, Ordering::AcqRel);
        Message {
            inner: Arc::new(Buffer {
                message_type,
                data: data.into_boxed_slice(),
                stats: self.stats.clone(),
            }),
        }
    }
}

impl fmt::Debug for MessageAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageAllocator")
            .field("live_messages", &self.live_messages())
            .field("live_bytes", &self.live_bytes())
            .finish()
    }
}
