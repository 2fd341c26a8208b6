use crate::admission::FreeSpaceGate;
use crate::queue::FrameQueue;
use crate::sink::FrameSink;
use std::thread::{self, JoinHandle};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskStats {
    pub frames_seen: u64,
    pub frames_written: u64,
    pub write_failures: u64,
}

/// Dedicated thread that drains the disk queue and appends frames to the
/// sink.
///
/// Every popped frame is released exactly once per iteration regardless of
/// outcome: written, refused by the admission gate, failed append, or
/// discard mode. A failed append is logged and the loop moves on to the
/// next frame. The only exit is queue shutdown.
pub struct DiskWriter {
    handle: JoinHandle<DiskStats>,
}

impl DiskWriter {
    pub fn spawn(
        queue: FrameQueue,
        sink: Option<Box<dyn FrameSink>>,
        gate: FreeSpaceGate,
    ) -> Self {
        let handle = thread::spawn(move || run(queue, sink, gate));
        Self { handle }
    }

    /// Wait for the writer thread to finish and collect its counters.
    pub fn join(self) -> DiskStats {
        match self.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                tracing::error!("Disk writer thread panicked");
                DiskStats::default()
            }
        }
    }
}

fn run(queue: FrameQueue, mut sink: Option<Box<dyn FrameSink>>, mut gate: FreeSpaceGate) -> DiskStats {
    if sink.is_none() {
        tracing::warn!("No output file configured; frames will not be written to disk");
    }

    let mut stats = DiskStats::default();
    let mut frame_count: u64 = 0;

    while let Some(frame) = queue.pop_blocking() {
        if let Some(sink) = sink.as_mut()
            && gate.permit(frame_count)
        {
            match sink.append(&frame) {
                Ok(()) => stats.frames_written += 1,
                Err(e) => {
                    stats.write_failures += 1;
                    tracing::warn!("Frame #{} write error: {}", frame.sequence(), e);
                }
            }
        }

        frame_count += 1;
        stats.frames_seen += 1;
    }

    tracing::info!(
        "Disk thread ending: {} frames seen, {} written, {} write failures",
        stats.frames_seen,
        stats.frames_written,
        stats.write_failures
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::CapacityProbe;
    use crate::frame::{FrameHandle, FramePool};
    use crate::shutdown::ShutdownSignal;
    use anyhow::bail;
    use std::collections::VecDeque;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Sink that records appended sequence numbers and fails on request.
    struct RecordingSink {
        appended: Arc<Mutex<Vec<u64>>>,
        fail_on: Vec<u64>,
    }

    impl RecordingSink {
        fn new(appended: Arc<Mutex<Vec<u64>>>) -> Self {
            Self {
                appended,
                fail_on: Vec::new(),
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn append(&mut self, frame: &FrameHandle) -> anyhow::Result<()> {
            if self.fail_on.contains(&frame.sequence()) {
                bail!("injected write failure");
            }
            self.appended.lock().unwrap().push(frame.sequence());
            Ok(())
        }
    }

    struct FakeProbe {
        results: VecDeque<io::Result<u64>>,
        calls: Arc<AtomicUsize>,
    }

    impl CapacityProbe for FakeProbe {
        fn free_bytes(&mut self, _path: &Path) -> io::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.pop_front().unwrap_or(Ok(u64::MAX))
        }
    }

    fn ample_gate() -> FreeSpaceGate {
        let probe = FakeProbe {
            results: VecDeque::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        FreeSpaceGate::with_probe("/tmp/out.ser", Box::new(probe))
    }

    fn pool_and_queue(capacity: usize) -> (FramePool, FrameQueue, ShutdownSignal) {
        let shutdown = ShutdownSignal::new();
        let pool = FramePool::new(8, capacity, &shutdown).unwrap();
        let queue = FrameQueue::new(&shutdown);
        (pool, queue, shutdown)
    }

    fn push_frame(pool: &FramePool, queue: &FrameQueue, sequence: u64) {
        queue.push(pool.acquire_blocking().unwrap().share(sequence));
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(start.elapsed() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_writes_queued_frames_newest_first() {
        let (pool, queue, shutdown) = pool_and_queue(4);
        let appended = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink::new(Arc::clone(&appended)));

        for seq in 0..4 {
            push_frame(&pool, &queue, seq);
        }
        let writer = DiskWriter::spawn(queue.clone(), Some(sink), ample_gate());

        wait_until(Duration::from_secs(5), || pool.free_count() == 4);
        shutdown.trigger();
        let stats = writer.join();

        assert_eq!(stats.frames_seen, 4);
        assert_eq!(stats.frames_written, 4);
        assert_eq!(*appended.lock().unwrap(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_write_failure_does_not_stop_the_loop() {
        let (pool, queue, shutdown) = pool_and_queue(4);
        let appended = Arc::new(Mutex::new(Vec::new()));
        let mut sink = RecordingSink::new(Arc::clone(&appended));
        sink.fail_on = vec![2];

        for seq in 0..4 {
            push_frame(&pool, &queue, seq);
        }
        let writer = DiskWriter::spawn(queue.clone(), Some(Box::new(sink)), ample_gate());

        // Frame 2 fails but its buffer is still released with the rest.
        wait_until(Duration::from_secs(5), || pool.free_count() == 4);
        shutdown.trigger();
        let stats = writer.join();

        assert_eq!(stats.frames_seen, 4);
        assert_eq!(stats.frames_written, 3);
        assert_eq!(stats.write_failures, 1);
        assert_eq!(*appended.lock().unwrap(), vec![3, 1, 0]);
    }

    #[test]
    fn test_discard_mode_releases_without_writing() {
        let (pool, queue, shutdown) = pool_and_queue(3);

        for seq in 0..3 {
            push_frame(&pool, &queue, seq);
        }
        let writer = DiskWriter::spawn(queue.clone(), None, ample_gate());

        wait_until(Duration::from_secs(5), || pool.free_count() == 3);
        shutdown.trigger();
        let stats = writer.join();

        assert_eq!(stats.frames_seen, 3);
        assert_eq!(stats.frames_written, 0);
        assert_eq!(stats.write_failures, 0);
    }

    #[test]
    fn test_shutdown_while_blocked_terminates_promptly() {
        let (_pool, queue, shutdown) = pool_and_queue(1);
        let appended = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink::new(appended));

        let writer = DiskWriter::spawn(queue.clone(), Some(sink), ample_gate());
        std::thread::sleep(Duration::from_millis(50));
        shutdown.trigger();

        let stats = writer.join();
        assert_eq!(stats.frames_seen, 0);
    }

    #[test]
    fn test_shutdown_abandons_queued_frames() {
        let (pool, queue, shutdown) = pool_and_queue(2);

        push_frame(&pool, &queue, 0);
        push_frame(&pool, &queue, 1);
        shutdown.trigger();

        let appended = Arc::new(Mutex::new(Vec::new()));
        let writer = DiskWriter::spawn(
            queue.clone(),
            Some(Box::new(RecordingSink::new(Arc::clone(&appended)))),
            ample_gate(),
        );
        let stats = writer.join();

        assert_eq!(stats.frames_seen, 0, "queued frames are abandoned at shutdown");
        assert!(appended.lock().unwrap().is_empty());

        // Abandoned handles still recycle once the queue goes away.
        drop(queue);
        assert_eq!(pool.free_count(), 2);
    }

    /// The 250-frame capacity scenario: ample space at probes 0 and 100,
    /// exhaustion at probe 200. Exactly 200 frames reach the sink; the rest
    /// are released unwritten.
    #[test]
    fn test_capacity_exhaustion_scenario() {
        let shutdown = ShutdownSignal::new();
        let pool = FramePool::new(8, 250, &shutdown).unwrap();
        let queue = FrameQueue::new(&shutdown);

        let appended = Arc::new(Mutex::new(Vec::new()));
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let probe = FakeProbe {
            results: VecDeque::from(vec![
                Ok(500 * 1024 * 1024),
                Ok(500 * 1024 * 1024),
                Ok(50 * 1024 * 1024),
            ]),
            calls: Arc::clone(&probe_calls),
        };
        let gate = FreeSpaceGate::with_probe("/tmp/out.ser", Box::new(probe));

        for seq in 1..=250 {
            push_frame(&pool, &queue, seq);
        }
        let writer = DiskWriter::spawn(
            queue.clone(),
            Some(Box::new(RecordingSink::new(Arc::clone(&appended)))),
            gate,
        );

        wait_until(Duration::from_secs(5), || pool.free_count() == 250);
        shutdown.trigger();
        let stats = writer.join();

        assert_eq!(stats.frames_seen, 250);
        assert_eq!(stats.frames_written, 200);
        assert_eq!(probe_calls.load(Ordering::SeqCst), 3);

        // LIFO pop over a pre-filled queue: sequences 250 down to 51 are
        // written, 50 down to 1 arrive after the gate closed.
        let written = appended.lock().unwrap();
        assert_eq!(written.len(), 200);
        assert_eq!(written[0], 250);
        assert_eq!(written[199], 51);
        assert!(written.windows(2).all(|w| w[0] == w[1] + 1));
    }
}
