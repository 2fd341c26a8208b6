use crate::queue::FrameQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

pub const GAIN_MIN: i32 = 0;
/// Maximum gain value accepted by the ASI178 class of cameras.
pub const GAIN_MAX: i32 = 510;
/// Minimum exposure supported by the camera.
pub const EXPOSURE_MIN_US: i32 = 32;
/// Maximum exposure that still sustains ~60 FPS.
pub const EXPOSURE_MAX_US: i32 = 16_667;

/// Pixel-value percentile the servo regulates on.
const TARGET_PERCENTILE: f64 = 0.999;
/// Servo step per analyzed frame.
const AGC_STEP: f64 = 0.01;

/// Gain/exposure values published by the AGC thread for the acquisition
/// loop to apply. Each control carries an `updated` latch so the camera is
/// only touched when a value actually changed.
pub struct CameraCommands {
    gain: AtomicI32,
    gain_updated: AtomicBool,
    exposure_us: AtomicI32,
    exposure_updated: AtomicBool,
}

impl CameraCommands {
    pub fn new() -> Self {
        Self {
            gain: AtomicI32::new(0),
            gain_updated: AtomicBool::new(false),
            exposure_us: AtomicI32::new(0),
            exposure_updated: AtomicBool::new(false),
        }
    }

    pub fn publish_gain(&self, gain: i32) {
        self.gain.store(gain, Ordering::Release);
        self.gain_updated.store(true, Ordering::Release);
    }

    pub fn publish_exposure(&self, exposure_us: i32) {
        self.exposure_us.store(exposure_us, Ordering::Release);
        self.exposure_updated.store(true, Ordering::Release);
    }

    /// Consume a pending gain update, clearing the latch.
    pub fn take_gain(&self) -> Option<i32> {
        if self.gain_updated.swap(false, Ordering::AcqRel) {
            Some(self.gain.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Consume a pending exposure update, clearing the latch.
    pub fn take_exposure(&self) -> Option<i32> {
        if self.exposure_updated.swap(false, Ordering::AcqRel) {
            Some(self.exposure_us.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

impl Default for CameraCommands {
    fn default() -> Self {
        Self::new()
    }
}

/// Single control value in [0.0, 1.0] that both gain and exposure are
/// derived from. Exposure ramps first (first 3/4 of the range), gain only
/// kicks in over the last quarter.
pub struct AgcServo {
    value: f64,
}

impl AgcServo {
    pub fn new() -> Self {
        Self { value: 0.0 }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Step the servo toward the target exposure band and derive camera
    /// settings. `upper_tail` is the pixel value at the target percentile.
    pub fn update(&mut self, upper_tail: u8) -> (i32, i32) {
        if upper_tail >= 250 {
            self.value -= AGC_STEP;
        } else if upper_tail < 230 {
            self.value += AGC_STEP;
        }
        self.value = self.value.clamp(0.0, 1.0);

        let gain = (4.0 * GAIN_MAX as f64 * self.value - 3.0 * GAIN_MAX as f64) as i32;
        let gain = gain.clamp(GAIN_MIN, GAIN_MAX);

        let exposure_us = (4.0 / 3.0 * EXPOSURE_MAX_US as f64 * self.value) as i32;
        let exposure_us = exposure_us.clamp(EXPOSURE_MIN_US, EXPOSURE_MAX_US);

        (gain, exposure_us)
    }
}

impl Default for AgcServo {
    fn default() -> Self {
        Self::new()
    }
}

pub fn histogram(data: &[u8]) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &pixel in data {
        hist[pixel as usize] += 1;
    }
    hist
}

/// Pixel value at the tail of the histogram: walks down from 255 until the
/// accumulated count reaches `threshold`.
pub fn upper_tail_value(hist: &[u32; 256], threshold: u32) -> u8 {
    let mut value = 255u8;
    let mut integral = hist[255];
    while integral < threshold && value > 0 {
        value -= 1;
        integral += hist[value as usize];
    }
    value
}

/// Automatic gain control thread.
///
/// Consumes a dedicated queue fed with a subsample of captured frames,
/// always analyzing the newest frame and discarding any stale backlog.
/// Terminates when its queue shuts down.
pub struct AgcWorker {
    handle: JoinHandle<u64>,
}

impl AgcWorker {
    pub fn spawn(queue: FrameQueue, commands: Arc<CameraCommands>) -> Self {
        let handle = thread::spawn(move || run(queue, commands));
        Self { handle }
    }

    /// Wait for the AGC thread to finish; returns frames analyzed.
    pub fn join(self) -> u64 {
        match self.handle.join() {
            Ok(analyzed) => analyzed,
            Err(_) => {
                tracing::error!("AGC thread panicked");
                0
            }
        }
    }
}

fn run(queue: FrameQueue, commands: Arc<CameraCommands>) -> u64 {
    let mut servo = AgcServo::new();
    let mut last_gain = 0i32;
    let mut last_exposure = 0i32;
    let mut analyzed = 0u64;

    while let Some(frame) = queue.pop_blocking() {
        let stale = queue.drain();
        if stale > 0 {
            tracing::debug!("Discarded {} stale AGC frames", stale);
        }

        let data = frame.data();
        let hist = histogram(data);
        let threshold = ((1.0 - TARGET_PERCENTILE) * data.len() as f64) as u32;
        let upper_tail = upper_tail_value(&hist, threshold);
        let (gain, exposure_us) = servo.update(upper_tail);

        tracing::debug!(
            "AGC value {:.3}, upper tail {:03}, gain {:03}, exposure {:.2} ms",
            servo.value(),
            upper_tail,
            gain,
            exposure_us as f64 / 1.0e3
        );

        if gain != last_gain {
            last_gain = gain;
            commands.publish_gain(gain);
        }
        if exposure_us != last_exposure {
            last_exposure = exposure_us;
            commands.publish_exposure(exposure_us);
        }
        analyzed += 1;
    }

    tracing::info!("AGC thread ending after {} frames", analyzed);
    analyzed
}
