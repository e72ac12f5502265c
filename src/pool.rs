//! Process-wide byte-buffer pool.
//!
//! Column files borrow scratch buffers for compression and full-file slurp
//! reads from here instead of allocating fresh `Vec<u8>`s per block. Buffers
//! are returned on file close.

use std::sync::{Mutex, OnceLock};

/// A pool of reusable byte buffers. Safe for concurrent `get`/`put`.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool { free: Mutex::new(Vec::new()) }
    }

    /// Borrow a buffer with at least `min_capacity` bytes of capacity,
    /// cleared of any previous contents.
    pub fn get(&self, min_capacity: usize) -> Vec<u8> {
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        let mut buf = match free.pop() {
            Some(buf) => buf,
            None => Vec::new(),
        };
        buf.clear();
        if buf.capacity() < min_capacity {
            buf.reserve(min_capacity - buf.capacity());
        }
        buf
    }

    /// Return a buffer to the pool for reuse.
    pub fn put(&self, buf: Vec<u8>) {
        self.free.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

static SHARED: OnceLock<BufferPool> = OnceLock::new();

/// The default process-wide pool, created once on first use.
pub fn shared() -> &'static BufferPool {
    SHARED.get_or_init(BufferPool::new)
}
