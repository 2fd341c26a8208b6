use std::time::{Duration, Instant};

/// Paces the acquisition loop to a fixed frame rate by sleeping out the
/// remainder of each frame budget.
pub struct FramePacer {
    frame_budget: Duration,
    last: Instant,
}

impl FramePacer {
    pub fn new(fps: f64) -> Self {
        let fps = fps.max(0.001);
        Self {
            frame_budget: Duration::from_secs_f64(1.0 / fps),
            last: Instant::now(),
        }
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Call once per loop iteration. Sleeps until the current frame budget
    /// is used up; if processing already overran it, returns immediately.
    pub fn pace(&mut self) {
        let elapsed = self.last.elapsed();
        if elapsed < self.frame_budget {
            std::thread::sleep(self.frame_budget - elapsed);
        } else {
            tracing::trace!("Processing took longer than frame budget: {:?}", elapsed);
        }
        self.last = Instant::now();
    }
}
