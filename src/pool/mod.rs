//! Relay buffer pool
//!
//! Every relay direction checks out one fixed-size buffer for its whole
//! lifetime. Buffers go back to a bounded lock-free free list when the
//! [`PooledBuffer`] guard is dropped, on every exit path.

mod guard;

pub use guard::PooledBuffer;

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default relay buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Default number of idle buffers kept for reuse
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

pub(crate) struct PoolInner {
    free: ArrayQueue<Vec<u8>>,
    buf_size: usize,
    in_use: AtomicUsize,
}

impl PoolInner {
    pub(crate) fn give_back(&self, buf: Vec<u8>) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
        // Shrunk buffers are not recycled; a full free list drops the buffer.
        if buf.len() == self.buf_size {
            let _ = self.free.push(buf);
        }
    }
}

/// Concurrent free list of relay buffers
///
/// Cloning is cheap and every clone shares the same free list.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool keeping at most `capacity` idle buffers of `buf_size` bytes
    pub fn new(capacity: usize, buf_size: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                free: ArrayQueue::new(capacity.max(1)),
                buf_size: buf_size.max(1),
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a buffer, allocating when the free list is empty
    pub fn get(&self) -> PooledBuffer {
        let buf = self
            .inner
            .free
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buf_size]);
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);
        PooledBuffer::new(buf, Arc::clone(&self.inner))
    }

    /// Size of each buffer
    pub fn buf_size(&self) -> usize {
        self.inner.buf_size
    }

    /// Number of idle buffers ready for reuse
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Number of buffers currently checked out
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        BufferPool::new(DEFAULT_POOL_CAPACITY, DEFAULT_BUFFER_SIZE)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buf_size", &self.buf_size())
            .field("available", &self.available())
            .field("in_use", &self.in_use())
            .finish()
    }
}
