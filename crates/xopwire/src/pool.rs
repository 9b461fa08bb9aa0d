//! Reusable read buffers.
//!
//! A [`PooledBuffer`] returns its storage to the pool when dropped, so a
//! decode that fails halfway still gives its buffer back. Buffers are
//! cleared on release; nothing read for one message is visible to the next.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;

/// Pool of read buffers shared by the decodes of one codec.
#[derive(Debug, Clone)]
pub struct BufferPool {
    idle: Arc<Mutex<Vec<BytesMut>>>,
    buffer_capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    /// Creates a pool whose buffers start at `buffer_capacity` bytes and that
    /// keeps at most `max_idle` released buffers.
    #[must_use]
    pub fn new(buffer_capacity: usize, max_idle: usize) -> Self {
        Self {
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_idle))),
            buffer_capacity,
            max_idle,
        }
    }

    /// Takes a buffer from the pool, allocating one if none is idle.
    #[must_use]
    pub fn acquire(&self) -> PooledBuffer {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let buf = reused.unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));

        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    /// Number of idle buffers.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
