use anyhow::Context;
use capture::{
    Acquisition, AgcWorker, CameraCommands, CaptureConfig, DiskWriter, FramePacer, FramePool,
    FrameQueue, FrameSink, FreeSpaceGate, SerSink, ShutdownSignal, TestPatternSource,
};
use common::setup_logging;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let config = CaptureConfig::from_env()?;
    setup_logging(config.environment);

    let shutdown = ShutdownSignal::new();

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    {
        let shutdown = shutdown.clone();
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
        });
    }
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");

    let pool = FramePool::new(config.frame_bytes(), config.pool_capacity, &shutdown)
        .context("Failed to allocate frame pool")?;
    let disk_queue = FrameQueue::new(&shutdown);
    let agc_queue = FrameQueue::new(&shutdown);

    let sink: Option<Box<dyn FrameSink>> = match &config.output_path {
        Some(path) => {
            let sink = SerSink::create(path, &config.ser_config())?;
            tracing::info!("Recording to {}", path.display());
            Some(Box::new(sink))
        }
        None => None,
    };
    let gate_path = config
        .output_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let writer = DiskWriter::spawn(disk_queue.clone(), sink, FreeSpaceGate::new(gate_path));

    let commands = Arc::new(CameraCommands::new());
    let agc = AgcWorker::spawn(agc_queue.clone(), Arc::clone(&commands));

    let source = Box::new(TestPatternSource::new(config.image_width as usize));
    tracing::info!(
        "Starting capture at {}x{}, {:.1} fps target",
        config.image_width,
        config.image_height,
        config.target_fps
    );

    let mut acquisition = Acquisition::new(
        source,
        pool,
        disk_queue,
        agc_queue,
        commands,
        FramePacer::new(config.target_fps),
    );
    let captured = acquisition.run(&shutdown);

    // Idempotent; covers exits that were not signal-driven.
    shutdown.trigger();
    let stats = writer.join();
    let analyzed = agc.join();

    tracing::info!(
        "Capture stopped gracefully: {} frames captured, {} written, {} write failures, {} analyzed by AGC",
        captured,
        stats.frames_written,
        stats.write_failures,
        analyzed
    );
    Ok(())
}
