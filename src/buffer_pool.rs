//! Reusable byte-buffer pool (C1).
//!
//! The dispatcher formats a record into a pooled buffer, hands the bytes to
//! each sink's writer, then releases the buffer back to the pool — avoiding
//! a per-record allocation on the hot path.

use parking_lot::Mutex;

/// Buffers whose capacity exceeds this are dropped on release rather than
/// retained, to cap the pool's worst-case memory footprint.
const MAX_RETAINED_CAPACITY: usize = 32 * 1024;

/// A pooled, growable byte buffer. Released buffers come back zero-length
/// with their capacity intact.
pub type Buffer = Vec<u8>;

/// Thread-safe pool of reusable [`Buffer`]s.
pub struct BufferPool {
    free: Mutex<Vec<Buffer>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    /// Returns a zero-length buffer, reused from the pool when available.
    pub fn acquire(&self) -> Buffer {
        match self.free.lock().pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }

    /// Returns a buffer to the pool. Buffers larger than
    /// [`MAX_RETAINED_CAPACITY`] are dropped instead, to avoid unbounded
    /// retention from a rare oversized record.
    pub fn release(&self, buf: Buffer) {
        if buf.capacity() <= MAX_RETAINED_CAPACITY {
            self.free.lock().push(buf);
        }
    }

    /// Number of buffers currently idle in the pool. Test/diagnostic use.
    pub fn idle_count(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_reuses_capacity() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire();
        buf.extend_from_slice(b"hello world");
        let cap = buf.capacity();
        pool.release(buf);
        assert_eq!(pool.idle_count(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.len(), 0);
        assert_eq!(reused.capacity(), cap);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn oversized_buffer_is_not_retained() {
        let pool = BufferPool::new();
        let big = Vec::with_capacity(MAX_RETAINED_CAPACITY + 1);
        pool.release(big);
        assert_eq!(pool.idle_count(), 0);
    }
}
