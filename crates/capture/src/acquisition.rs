use crate::agc::CameraCommands;
use crate::frame::FramePool;
use crate::pacing::FramePacer;
use crate::queue::FrameQueue;
use crate::shutdown::ShutdownSignal;
use crate::source::FrameSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Only a subsample of frames goes to the AGC thread; exposure does not
/// need re-evaluating at full frame rate.
const AGC_DISPATCH_PERIOD: Duration = Duration::from_millis(100);

const STATUS_LOG_INTERVAL_FRAMES: u64 = 60;

/// The producer stage: fills pool buffers from the camera source and fans
/// the sealed frames out to the consumer queues.
///
/// Runs on the calling thread until the shutdown signal fires. A fill
/// failure drops that frame (its buffer recycles) and the loop continues.
pub struct Acquisition {
    source: Box<dyn FrameSource>,
    pool: FramePool,
    disk_queue: FrameQueue,
    agc_queue: FrameQueue,
    commands: Arc<CameraCommands>,
    pacer: FramePacer,
}

impl Acquisition {
    pub fn new(
        source: Box<dyn FrameSource>,
        pool: FramePool,
        disk_queue: FrameQueue,
        agc_queue: FrameQueue,
        commands: Arc<CameraCommands>,
        pacer: FramePacer,
    ) -> Self {
        Self {
            source,
            pool,
            disk_queue,
            agc_queue,
            commands,
            pacer,
        }
    }

    /// Returns the number of frames captured.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> u64 {
        let mut frame_count: u64 = 0;
        let mut dropped_frames: u64 = 0;
        let mut last_agc_dispatch = Instant::now();

        while !shutdown.is_triggered() {
            if let Some(gain) = self.commands.take_gain() {
                self.source.set_gain(gain);
            }
            if let Some(exposure_us) = self.commands.take_exposure() {
                self.source.set_exposure_us(exposure_us);
            }

            let Some(mut buf) = self.pool.acquire_blocking() else {
                break;
            };

            if let Err(e) = self.source.fill(buf.data_mut()) {
                dropped_frames += 1;
                tracing::warn!("Frame #{} capture error: {}", frame_count, e);
                continue;
            }

            let frame = buf.share(frame_count);
            frame_count += 1;

            if last_agc_dispatch.elapsed() >= AGC_DISPATCH_PERIOD {
                last_agc_dispatch = Instant::now();
                self.agc_queue.push(frame.clone());
            }

            self.disk_queue.push(frame);

            if frame_count.is_multiple_of(STATUS_LOG_INTERVAL_FRAMES) {
                tracing::debug!(
                    "Status: [Frames: {}] [Dropped: {}] [Disk queue: {}] [AGC queue: {}] [Pool free: {}]",
                    frame_count,
                    dropped_frames,
                    self.disk_queue.len(),
                    self.agc_queue.len(),
                    self.pool.free_count()
                );
            }

            self.pacer.pace();
        }

        tracing::info!(
            "Acquisition stopped: {} frames captured, {} dropped",
            frame_count,
            dropped_frames
        );
        frame_count
    }
}
