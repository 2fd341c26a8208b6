use crate::shutdown::ShutdownSignal;
use anyhow::{Result, bail};
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Fixed pool of pre-allocated frame buffers.
///
/// Buffers never grow or shrink after construction: the capture path must
/// not allocate per frame. A buffer leaves the pool as a uniquely-owned
/// [`FrameBuf`], is sealed into a shared [`FrameHandle`] for the consumer
/// stages, and returns to the pool when the last handle drops.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
    frame_bytes: usize,
    capacity: usize,
}

struct PoolState {
    buffers: Vec<Box<[u8]>>,
    closed: bool,
}

impl FramePool {
    pub fn new(frame_bytes: usize, capacity: usize, shutdown: &ShutdownSignal) -> Result<Self> {
        if frame_bytes == 0 {
            bail!("frame size must be non-zero before allocating the pool");
        }
        if capacity == 0 {
            bail!("frame pool capacity must be non-zero");
        }

        let buffers = (0..capacity)
            .map(|_| vec![0u8; frame_bytes].into_boxed_slice())
            .collect();

        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                buffers,
                closed: false,
            }),
            available: Condvar::new(),
            frame_bytes,
            capacity,
        });

        let weak = Arc::downgrade(&inner);
        shutdown.on_trigger(move || {
            if let Some(pool) = weak.upgrade() {
                pool.lock_state().closed = true;
                pool.available.notify_all();
            }
        });

        Ok(Self { inner })
    }

    /// Take a free buffer, blocking while the pool is exhausted. Returns
    /// `None` once shutdown has been signaled. The wait is logged once per
    /// episode, since an exhausted pool means imminent frame drops.
    pub fn acquire_blocking(&self) -> Option<FrameBuf> {
        let mut state = self.inner.lock_state();
        let mut warned = false;
        loop {
            if state.closed {
                return None;
            }
            if let Some(data) = state.buffers.pop() {
                return Some(FrameBuf {
                    data,
                    pool: Arc::clone(&self.inner),
                });
            }
            if !warned {
                tracing::warn!("Frame pool exhausted; frames will likely be dropped");
                warned = true;
            }
            state = self
                .inner
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock_state().buffers.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn frame_bytes(&self) -> usize {
        self.inner.frame_bytes
    }
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, data: Box<[u8]>) {
        self.lock_state().buffers.push(data);
        self.available.notify_one();
    }
}

/// A frame buffer owned exclusively by the producer while it is being
/// filled. Dropping it without sharing returns the buffer to the pool.
pub struct FrameBuf {
    data: Box<[u8]>,
    pool: Arc<PoolInner>,
}

impl FrameBuf {
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Seal the frame for the consumer stages. The returned handle is
    /// reference-counted; each consumer holds a clone and the buffer
    /// recycles when the last clone drops.
    pub fn share(mut self, sequence: u64) -> FrameHandle {
        let data = mem::take(&mut self.data);
        let pool = Arc::clone(&self.pool);
        FrameHandle {
            shared: Arc::new(FrameShared {
                data,
                sequence,
                pool,
            }),
        }
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        let data = mem::take(&mut self.data);
        if !data.is_empty() {
            self.pool.release(data);
        }
    }
}

/// Shared, immutable view of a captured frame.
#[derive(Clone)]
pub struct FrameHandle {
    shared: Arc<FrameShared>,
}

struct FrameShared {
    data: Box<[u8]>,
    sequence: u64,
    pool: Arc<PoolInner>,
}

impl FrameHandle {
    pub fn data(&self) -> &[u8] {
        &self.shared.data
    }

    pub fn sequence(&self) -> u64 {
        self.shared.sequence
    }
}

impl Drop for FrameShared {
    fn drop(&mut self) {
        let data = mem::take(&mut self.data);
        if !data.is_empty() {
            self.pool.release(data);
        }
    }
}
