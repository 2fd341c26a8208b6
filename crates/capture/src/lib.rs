pub mod acquisition;
pub mod admission;
pub mod agc;
pub mod config;
pub mod disk;
pub mod frame;
pub mod pacing;
pub mod queue;
pub mod shutdown;
pub mod sink;
pub mod source;

pub use acquisition::Acquisition;
pub use admission::{CapacityProbe, FreeSpaceGate, StatvfsProbe};
pub use agc::{AgcWorker, CameraCommands};
pub use config::CaptureConfig;
pub use disk::{DiskStats, DiskWriter};
pub use frame::{FrameBuf, FrameHandle, FramePool};
pub use pacing::FramePacer;
pub use queue::FrameQueue;
pub use shutdown::ShutdownSignal;
pub use sink::{FrameSink, SerSink};
pub use source::{FrameSource, TestPatternSource};
