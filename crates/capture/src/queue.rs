use crate::frame::FrameHandle;
use crate::shutdown::ShutdownSignal;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Thread-safe handoff queue between the acquisition loop and a consumer
/// thread.
///
/// Consumption is LIFO: under overload the consumer services the freshest
/// frame first. The lock is held only across the Vec mutation, never
/// across a wait or any I/O.
///
/// Shutdown has priority over queued frames: once closed, `pop_blocking`
/// returns `None` immediately and anything still queued is abandoned.
/// Abandoned handles release their buffers when the queue drops.
#[derive(Clone)]
pub struct FrameQueue {
    shared: Arc<QueueShared>,
}

struct QueueShared {
    state: Mutex<QueueState>,
    ready: Condvar,
}

struct QueueState {
    frames: Vec<FrameHandle>,
    closed: bool,
}

impl FrameQueue {
    pub fn new(shutdown: &ShutdownSignal) -> Self {
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                frames: Vec::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        });

        let weak = Arc::downgrade(&shared);
        shutdown.on_trigger(move || {
            if let Some(queue) = weak.upgrade() {
                queue.close();
            }
        });

        Self { shared }
    }

    /// Insert a frame and wake one waiting consumer. Never blocks beyond
    /// the queue's own critical section, never fails. Safe from any thread.
    pub fn push(&self, frame: FrameHandle) {
        self.shared.lock_state().frames.push(frame);
        self.shared.ready.notify_one();
    }

    /// Block until a frame is available or shutdown is observed.
    ///
    /// Returns the most recently pushed frame, or `None` on shutdown —
    /// even if frames remain queued.
    pub fn pop_blocking(&self) -> Option<FrameHandle> {
        let mut state = self.shared.lock_state();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.frames.pop() {
                return Some(frame);
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Drop every queued frame (their references release) and return how
    /// many were discarded. Used by consumers that only care about the
    /// freshest frame.
    pub fn drain(&self) -> usize {
        let mut state = self.shared.lock_state();
        let discarded = state.frames.len();
        state.frames.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.shared.lock_state().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue and wake every blocked consumer (broadcast).
    /// Normally invoked through the shutdown signal's wake hook.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl QueueShared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        self.lock_state().closed = true;
        self.ready.notify_all();
    }
}
