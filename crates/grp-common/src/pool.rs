//! Free-list object pools for the datagram hot path.
//!
//! One [`Packet`] and up to one [`ByteReader`] are needed per inbound
//! datagram; pooling them keeps steady-state processing allocation-free.
//! Renting moves the object out of the pool, so an object can never be held
//! by two owners at once; releasing clears it before it becomes rentable
//! again.

use std::sync::Mutex;

use crate::packet::Packet;
use crate::reader::ByteReader;

/// Upper bound on idle objects kept per pool.
const DEFAULT_MAX_IDLE: usize = 256;

/// An object that can live in a [`Pool`].
pub trait Poolable: Default {
    /// Resets internal state before the object returns to the free list.
    fn clear(&mut self);

    /// Loads the object with a fresh source buffer.
    fn set_source(&mut self, source: &[u8]);
}

impl Poolable for Packet {
    fn clear(&mut self) {
        Packet::clear(self);
    }

    fn set_source(&mut self, source: &[u8]) {
        Packet::set_source(self, source);
    }
}

impl Poolable for ByteReader {
    fn clear(&mut self) {
        ByteReader::clear(self);
    }

    fn set_source(&mut self, source: &[u8]) {
        ByteReader::set_source(self, source);
    }
}

/// A bounded free-list of reusable objects.
///
/// The lock is uncontended in practice — datagrams are processed one at a
/// time — but keeps the pool sound if tasks ever hop threads.
#[derive(Debug)]
pub struct Pool<T: Poolable> {
    items: Mutex<Vec<T>>,
    max_idle: usize,
}

/// Pool of [`Packet`]s.
pub type PacketPool = Pool<Packet>;

/// Pool of [`ByteReader`]s.
pub type ReaderPool = Pool<ByteReader>;

impl<T: Poolable> Pool<T> {
    /// Creates an empty pool retaining at most `max_idle` idle objects.
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Takes an object from the pool, or creates a fresh one if it is empty.
    #[must_use]
    pub fn rent(&self) -> T {
        match self.items.lock() {
            Ok(mut items) => items.pop().unwrap_or_default(),
            Err(_) => T::default(),
        }
    }

    /// Takes an object and loads it with `source` in one step.
    #[must_use]
    pub fn rent_from(&self, source: &[u8]) -> T {
        let mut item = self.rent();
        item.set_source(source);
        item
    }

    /// Clears an object and returns it to the free list.
    ///
    /// Objects beyond the idle cap are simply dropped.
    pub fn release(&self, mut item: T) {
        item.clear();
        if let Ok(mut items) = self.items.lock() {
            if items.len() < self.max_idle {
                items.push(item);
            }
        }
    }

    /// Number of idle objects currently in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}
