//! Bounded byte ring for the audio notification stream.
//!
//! Notification callbacks push raw packet bytes; the capture loop drains
//! them on its own schedule. The ring never blocks and never grows: when
//! full, the overflow is counted and discarded so the BLE event path stays
//! bounded regardless of how slowly the consumer drains.

use std::sync::Mutex;
use std::time::Instant;

/// Ring capacity in bytes. One slot is kept empty to distinguish full
/// from empty, so at most `CAPACITY - 1` bytes are buffered.
pub const RING_CAPACITY: usize = 16 * 1024;

#[derive(Debug)]
struct RingInner {
    buf: Box<[u8; RING_CAPACITY]>,
    head: usize,
    tail: usize,
    received: u64,
    dropped: u64,
    last_packet: Option<Instant>,
    active: bool,
}

impl RingInner {
    fn len(&self) -> usize {
        (self.head + RING_CAPACITY - self.tail) % RING_CAPACITY
    }

    fn free(&self) -> usize {
        RING_CAPACITY - 1 - self.len()
    }
}

/// Counter snapshot taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    /// Total payload bytes seen by `push`, including dropped ones.
    pub received: u64,
    /// Bytes discarded because the ring was full.
    pub dropped: u64,
    /// Bytes currently buffered.
    pub buffered: usize,
}

/// Shared byte ring. Cheap to clone a reference to via `Arc`.
#[derive(Debug)]
pub struct AudioRing {
    inner: Mutex<RingInner>,
}

impl Default for AudioRing {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRing {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RingInner {
                buf: Box::new([0; RING_CAPACITY]),
                head: 0,
                tail: 0,
                received: 0,
                dropped: 0,
                last_packet: None,
                active: false,
            }),
        }
    }

    /// Mark the stream active and reset counters for a fresh capture.
    pub fn activate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.head = 0;
        inner.tail = 0;
        inner.received = 0;
        inner.dropped = 0;
        inner.last_packet = None;
        inner.active = true;
    }

    /// Mark the stream inactive; subsequent pushes are ignored.
    pub fn deactivate(&self) {
        self.inner.lock().unwrap().active = false;
    }

    /// Append packet bytes. Stores as much as fits; the rest is counted
    /// as dropped. Ignored entirely while inactive.
    pub fn push(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.active {
            return;
        }
        inner.received += data.len() as u64;
        inner.last_packet = Some(Instant::now());

        let stored = data.len().min(inner.free());
        inner.dropped += (data.len() - stored) as u64;
        for &b in &data[..stored] {
            let head = inner.head;
            inner.buf[head] = b;
            inner.head = (head + 1) % RING_CAPACITY;
        }
    }

    /// Drain up to `out.len()` buffered bytes, returning the count moved.
    pub fn drain(&self, out: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let n = out.len().min(inner.len());
        for slot in out[..n].iter_mut() {
            let tail = inner.tail;
            *slot = inner.buf[tail];
            inner.tail = (tail + 1) % RING_CAPACITY;
        }
        n
    }

    pub fn stats(&self) -> RingStats {
        let inner = self.inner.lock().unwrap();
        RingStats {
            received: inner.received,
            dropped: inner.dropped,
            buffered: inner.len(),
        }
    }

    /// Instant of the most recent accepted packet, if any.
    pub fn last_packet(&self) -> Option<Instant> {
        self.inner.lock().unwrap().last_packet
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }
}
