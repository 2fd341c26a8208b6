use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type WakeHook = Box<dyn Fn() + Send + Sync>;

/// Process-wide shutdown flag, set at most once.
///
/// Blocking primitives (queues, the frame pool) register a wake hook at
/// construction; `trigger` sets the flag and then runs every hook, so a
/// thread parked on a condvar observes shutdown without a timeout. Handed to
/// components by constructor injection rather than living in a global.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    triggered: AtomicBool,
    wake_hooks: Mutex<Vec<WakeHook>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                triggered: AtomicBool::new(false),
                wake_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Set the flag and wake every registered waiter. Only the first call
    /// runs the hooks; later calls are no-ops.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = self
            .inner
            .wake_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks.iter() {
            hook();
        }
    }

    /// Register a hook to run on `trigger`. A hook registered after the
    /// signal fired runs immediately, so late-constructed components cannot
    /// miss shutdown.
    pub fn on_trigger(&self, hook: impl Fn() + Send + Sync + 'static) {
        let mut hooks = self
            .inner
            .wake_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.triggered.load(Ordering::Acquire) {
            drop(hooks);
            hook();
            return;
        }
        hooks.push(Box::new(hook));
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
