use crate::agc::{EXPOSURE_MAX_US, GAIN_MAX};
use anyhow::Result;

/// Camera seam: fills pre-allocated frame buffers and accepts the control
/// values the AGC thread derives.
pub trait FrameSource: Send {
    /// Populate one frame of pixel data. The buffer is pool-owned and
    /// already sized to the configured frame geometry.
    fn fill(&mut self, buffer: &mut [u8]) -> Result<()>;

    fn set_gain(&mut self, gain: i32);

    fn set_exposure_us(&mut self, exposure_us: i32);
}

/// Synthetic source producing a drifting diagonal gradient whose brightness
/// tracks the applied gain and exposure, so the AGC feedback loop behaves
/// like it would against a real sensor.
pub struct TestPatternSource {
    width: usize,
    gain: i32,
    exposure_us: i32,
    frame_index: u64,
}

impl TestPatternSource {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            gain: 0,
            exposure_us: EXPOSURE_MAX_US,
            frame_index: 0,
        }
    }

    fn sensitivity(&self) -> f64 {
        let exposure = self.exposure_us as f64 / EXPOSURE_MAX_US as f64;
        let gain = 1.0 + self.gain as f64 / GAIN_MAX as f64;
        (exposure * gain).clamp(0.0, 2.0)
    }
}

impl FrameSource for TestPatternSource {
    fn fill(&mut self, buffer: &mut [u8]) -> Result<()> {
        let sensitivity = self.sensitivity();
        let drift = self.frame_index as usize;
        for (i, pixel) in buffer.iter_mut().enumerate() {
            let x = i % self.width;
            let y = i / self.width;
            let base = ((x + y + drift) % 256) as f64;
            *pixel = (base * sensitivity).clamp(0.0, 255.0) as u8;
        }
        self.frame_index += 1;
        Ok(())
    }

    fn set_gain(&mut self, gain: i32) {
        self.gain = gain;
    }

    fn set_exposure_us(&mut self, exposure_us: i32) {
        self.exposure_us = exposure_us;
    }
}
