use std::io;
use std::path::{Path, PathBuf};

/// Absolute floor: writes stop once the target filesystem reports this
/// much free space or less.
const MIN_FREE_DISK_SPACE_BYTES: u64 = 100 * 1024 * 1024; // 100 MiB

/// Check free disk space, but not on every single frame.
const PROBE_INTERVAL_FRAMES: u64 = 100;

/// Free-capacity probe for the filesystem holding the output stream.
pub trait CapacityProbe: Send {
    fn free_bytes(&mut self, path: &Path) -> io::Result<u64>;
}

/// statvfs-backed probe: filesystem block size times blocks available to
/// unprivileged users.
pub struct StatvfsProbe;

impl CapacityProbe for StatvfsProbe {
    fn free_bytes(&mut self, path: &Path) -> io::Result<u64> {
        let stats = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
        Ok(stats.block_size() as u64 * stats.blocks_available() as u64)
    }
}

/// One-way admission gate for disk writes.
///
/// Starts permissive; permanently disables writes the first time a probe
/// reports free space at or below the floor, logging the transition
/// exactly once. A failed probe is logged and leaves the current state
/// untouched. Once disabled, no further probes are issued.
pub struct FreeSpaceGate {
    path: PathBuf,
    probe: Box<dyn CapacityProbe>,
    enabled: bool,
}

impl FreeSpaceGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_probe(path, Box::new(StatvfsProbe))
    }

    pub fn with_probe(path: impl Into<PathBuf>, probe: Box<dyn CapacityProbe>) -> Self {
        Self {
            path: path.into(),
            probe,
            enabled: true,
        }
    }

    /// Whether the frame at `frame_count` may be written. Probes the
    /// filesystem on frame 0 and every `PROBE_INTERVAL_FRAMES` thereafter.
    pub fn permit(&mut self, frame_count: u64) -> bool {
        if !self.enabled {
            return false;
        }

        if frame_count.is_multiple_of(PROBE_INTERVAL_FRAMES) {
            match self.probe.free_bytes(&self.path) {
                Err(e) => {
                    tracing::warn!(
                        "Free-space check on {} failed: {}",
                        self.path.display(),
                        e
                    );
                }
                Ok(free) if free <= MIN_FREE_DISK_SPACE_BYTES => {
                    tracing::warn!(
                        "Disk nearly full ({} bytes free); writes disabled, frames going to the bit bucket",
                        free
                    );
                    self.enabled = false;
                }
                Ok(_) => {}
            }
        }

        self.enabled
    }

    pub fn writes_enabled(&self) -> bool {
        self.enabled
    }
}
