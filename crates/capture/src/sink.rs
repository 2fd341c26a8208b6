use crate::frame::FrameHandle;
use anyhow::{Context, Result};
use ser::{SerConfig, SerFile};
use std::path::Path;

/// Append-only destination for captured frames.
///
/// Each call either lands the whole frame in the stream or reports failure;
/// the disk writer never retries a failed append.
pub trait FrameSink: Send {
    fn append(&mut self, frame: &FrameHandle) -> Result<()>;
}

/// SER-stream sink.
pub struct SerSink {
    file: SerFile,
}

impl SerSink {
    pub fn create(path: &Path, config: &SerConfig) -> Result<Self> {
        let file = SerFile::create(path, config)
            .with_context(|| format!("Failed to create SER stream at {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn frame_count(&self) -> i32 {
        self.file.frame_count()
    }
}

impl FrameSink for SerSink {
    fn append(&mut self, frame: &FrameHandle) -> Result<()> {
        self.file.add_frame(frame.data())?;
        Ok(())
    }
}
