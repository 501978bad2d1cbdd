//! Pooled serialization buffers
//!
//! The worker serializes every record into a [`SerializationBuffer`] before
//! the bytes reach a file stream. Buffers come from a [`BufferPool`] owned by
//! the provider, so steady-state logging does not allocate per record.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of pooled buffers.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default initial capacity of each buffer (16KB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Buffers grown beyond this are released instead of pooled (1MB).
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// Growable byte buffer a serializer writes one record into.
#[derive(Debug, Default)]
pub struct SerializationBuffer {
    bytes: BytesMut,
}

impl SerializationBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Drop the contents, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[inline]
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }
}

impl io::Write for SerializationBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Pool counters
#[derive(Debug, Default)]
pub struct BufferPoolMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub returns: AtomicU64,
    pub drops: AtomicU64,
}

/// Point-in-time copy of [`BufferPoolMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub drops: u64,
}

impl BufferPoolMetrics {
    pub fn snapshot(&self) -> BufferPoolSnapshot {
        BufferPoolSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

/// Lock-free pool of [`SerializationBuffer`]s.
///
/// An empty pool hands out a fresh buffer rather than blocking. Returned
/// buffers are cleared; buffers that grew past `max_retained_capacity`
/// (one oversized record) are dropped so they do not pin memory.
pub struct BufferPool {
    queue: ArrayQueue<SerializationBuffer>,
    buffer_capacity: usize,
    max_retained_capacity: usize,
    metrics: BufferPoolMetrics,
}

impl BufferPool {
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        Self::with_retention(pool_size, buffer_capacity, DEFAULT_MAX_RETAINED_CAPACITY)
    }

    pub fn with_retention(
        pool_size: usize,
        buffer_capacity: usize,
        max_retained_capacity: usize,
    ) -> Self {
        let queue = ArrayQueue::new(pool_size.max(1));
        while !queue.is_full() {
            if queue
                .push(SerializationBuffer::with_capacity(buffer_capacity))
                .is_err()
            {
                break;
            }
        }

        Self {
            queue,
            buffer_capacity,
            max_retained_capacity: max_retained_capacity.max(buffer_capacity),
            metrics: BufferPoolMetrics::default(),
        }
    }

    /// Rent a buffer; allocates when the pool is empty.
    #[inline]
    pub fn get(&self) -> SerializationBuffer {
        match self.queue.pop() {
            Some(buf) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                SerializationBuffer::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Return a rented buffer.
    #[inline]
    pub fn put(&self, mut buf: SerializationBuffer) {
        if buf.capacity() > self.max_retained_capacity {
            self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buf.clear();
        match self.queue.push(buf) {
            Ok(()) => {
                self.metrics.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn metrics(&self) -> &BufferPoolMetrics {
        &self.metrics
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE, DEFAULT_BUFFER_CAPACITY)
    }
}
