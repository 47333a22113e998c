//! Control-plane message queues.
//!
//! Every cross-context stream in the crate (button commands, clock ticks,
//! transport events, display updates) is an `rtrb` ring — the same
//! wait-free SPSC the audio path uses for its monitor ring — behind a
//! thin wrapper that makes the producer policy explicit: a push against a
//! full queue drops the item and bumps a shared counter, it never blocks.
//! Dropping is safe by design; the worst cost is a late visual update or
//! a missed clock tick the EMA smooths over.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rtrb::{PopError, PushError, RingBuffer};

/// Producer half. Push is O(1) and never blocks.
pub struct Producer<T> {
    inner: rtrb::Producer<T>,
    dropped: Arc<AtomicU32>,
}

/// Consumer half. Pop is O(1) and never blocks.
pub struct Consumer<T> {
    inner: rtrb::Consumer<T>,
    dropped: Arc<AtomicU32>,
}

/// Create a queue holding up to `capacity` items.
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = RingBuffer::new(capacity);
    let dropped = Arc::new(AtomicU32::new(0));

    (
        Producer { inner: tx, dropped: dropped.clone() },
        Consumer { inner: rx, dropped },
    )
}

impl<T> Producer<T> {
    /// Push an item. Returns false (and drops the item) if the queue is
    /// full.
    pub fn push(&mut self, item: T) -> bool {
        match self.inner.push(item) {
            Ok(()) => true,
            Err(PushError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Items dropped on full (shared counter)
    #[allow(dead_code)]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Consumer<T> {
    /// Pop the oldest item, or None if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        match self.inner.pop() {
            Ok(item) => Some(item),
            Err(PopError::Empty) => None,
        }
    }

    /// Approximate number of queued items.
    ///
    /// The snapshot may be stale by the time it is used; monitoring only,
    /// never control flow.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.inner.slots()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.inner.slots() == 0
    }

    /// Items the producer dropped on full (shared counter)
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}
