use anyhow::{Result, bail};
use ser::{ColorId, SerConfig};
use std::env;
use std::path::PathBuf;

pub use common::Environment;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub environment: Environment,
    /// Absent means discard mode: frames are captured and released but
    /// never written.
    pub output_path: Option<PathBuf>,
    pub image_width: u32,
    pub image_height: u32,
    /// Color sensor (Bayer RGGB mosaic) vs monochrome.
    pub color: bool,
    pub bit_depth: i32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub pool_capacity: usize,
    pub target_fps: f64,
    pub timestamp_trailer: bool,
}

impl CaptureConfig {
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();

        let output_path = env::var("OUTPUT_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let image_width = env::var("IMAGE_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3096);

        let image_height = env::var("IMAGE_HEIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2080);

        let color = env::var("COLOR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let bit_depth = env::var("BIT_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8);

        let observer = env::var("OBSERVER").unwrap_or_default();
        let instrument = env::var("INSTRUMENT").unwrap_or_else(|_| "ZWO ASI178MC".to_string());
        let telescope = env::var("TELESCOPE").unwrap_or_default();

        let pool_capacity = env::var("FRAME_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64);

        let target_fps = env::var("TARGET_FPS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60.0);

        let timestamp_trailer = env::var("TIMESTAMP_TRAILER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        if image_width == 0 || image_height == 0 {
            bail!("IMAGE_WIDTH and IMAGE_HEIGHT must be non-zero");
        }
        if !(1..=16).contains(&bit_depth) {
            bail!("BIT_DEPTH must be between 1 and 16");
        }
        if pool_capacity == 0 {
            bail!("FRAME_POOL_SIZE must be non-zero");
        }
        if target_fps <= 0.0 {
            bail!("TARGET_FPS must be positive");
        }

        Ok(Self {
            environment,
            output_path,
            image_width,
            image_height,
            color,
            bit_depth,
            observer,
            instrument,
            telescope,
            pool_capacity,
            target_fps,
            timestamp_trailer,
        })
    }

    pub fn color_id(&self) -> ColorId {
        if self.color {
            ColorId::BayerRggb
        } else {
            ColorId::Mono
        }
    }

    /// Bytes per captured frame: single-plane sensor data.
    pub fn frame_bytes(&self) -> usize {
        let bytes_per_plane = ((self.bit_depth - 1) / 8 + 1) as usize;
        self.image_width as usize * self.image_height as usize * bytes_per_plane
    }

    pub fn ser_config(&self) -> SerConfig {
        SerConfig {
            width: self.image_width as i32,
            height: self.image_height as i32,
            color_id: self.color_id(),
            bit_depth: self.bit_depth,
            observer: self.observer.clone(),
            instrument: self.instrument.clone(),
            telescope: self.telescope.clone(),
            timestamp_trailer: self.timestamp_trailer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "ENVIRONMENT",
        "OUTPUT_PATH",
        "IMAGE_WIDTH",
        "IMAGE_HEIGHT",
        "COLOR",
        "BIT_DEPTH",
        "OBSERVER",
        "INSTRUMENT",
        "TELESCOPE",
        "FRAME_POOL_SIZE",
        "TARGET_FPS",
        "TIMESTAMP_TRAILER",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.output_path, None);
        assert_eq!(config.image_width, 3096);
        assert_eq!(config.image_height, 2080);
        assert!(config.color);
        assert_eq!(config.bit_depth, 8);
        assert_eq!(config.instrument, "ZWO ASI178MC");
        assert_eq!(config.pool_capacity, 64);
        assert_eq!(config.target_fps, 60.0);
        assert!(config.timestamp_trailer);
        assert_eq!(config.color_id(), ColorId::BayerRggb);
        assert_eq!(config.frame_bytes(), 3096 * 2080);
    }

    #[test]
    #[serial]
    fn test_explicit_values() {
        clear_env();
        unsafe {
            env::set_var("OUTPUT_PATH", "/data/m42.ser");
            env::set_var("IMAGE_WIDTH", "640");
            env::set_var("IMAGE_HEIGHT", "480");
            env::set_var("COLOR", "false");
            env::set_var("BIT_DEPTH", "16");
            env::set_var("OBSERVER", "someone");
            env::set_var("FRAME_POOL_SIZE", "8");
            env::set_var("TARGET_FPS", "30");
        }
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.output_path, Some(PathBuf::from("/data/m42.ser")));
        assert_eq!(config.image_width, 640);
        assert!(!config.color);
        assert_eq!(config.color_id(), ColorId::Mono);
        assert_eq!(config.frame_bytes(), 640 * 480 * 2);
        assert_eq!(config.observer, "someone");
        assert_eq!(config.pool_capacity, 8);
        assert_eq!(config.target_fps, 30.0);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back_to_defaults() {
        clear_env();
        unsafe {
            env::set_var("IMAGE_WIDTH", "not-a-number");
            env::set_var("TARGET_FPS", "fast");
        }
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.image_width, 3096);
        assert_eq!(config.target_fps, 60.0);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_output_path_means_discard_mode() {
        clear_env();
        unsafe { env::set_var("OUTPUT_PATH", "") };
        let config = CaptureConfig::from_env().unwrap();
        assert_eq!(config.output_path, None);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_geometry_is_rejected() {
        clear_env();
        unsafe { env::set_var("IMAGE_WIDTH", "0") };
        assert!(CaptureConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_bit_depth_is_rejected() {
        clear_env();
        unsafe { env::set_var("BIT_DEPTH", "32") };
        assert!(CaptureConfig::from_env().is_err());
        clear_env();
    }
}
