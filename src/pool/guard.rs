//! RAII guard for pooled buffers
//!
//! Returns the buffer to its pool when dropped.

use super::PoolInner;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A buffer checked out of a [`BufferPool`](super::BufferPool)
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub(super) fn new(buf: Vec<u8>, pool: Arc<PoolInner>) -> Self {
        PooledBuffer { buf, pool }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::super::BufferPool;

    #[test]
    fn test_guard_deref() {
        let pool = BufferPool::new(1, 8);
        let buf = pool.get();
        assert_eq!(&*buf, &[0u8; 8]);
    }

    #[test]
    fn test_guard_deref_mut() {
        let pool = BufferPool::new(1, 4);
        let mut buf = pool.get();
        buf.copy_from_slice(b"abcd");
        assert_eq!(&buf[..], b"abcd");
    }

    #[test]
    fn test_guard_drop_returns_to_pool() {
        let pool = BufferPool::new(1, 4);
        {
            let _buf = pool.get();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_guard_returned_on_panic_unwind() {
        let pool = BufferPool::new(1, 4);
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _buf = cloned.get();
            panic!("pump failed");
        }));
        assert!(result.is_err());
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 1);
    }
}
