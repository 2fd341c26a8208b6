use crate::errors::SerError;
use crate::header::{ColorId, SerHeader, metadata_field};
use crate::timestamp;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Construction parameters for a SER stream. Metadata strings are free-form
/// pass-through and land NUL-padded in the header.
#[derive(Debug, Clone)]
pub struct SerConfig {
    pub width: i32,
    pub height: i32,
    pub color_id: ColorId,
    pub bit_depth: i32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    /// Append a per-frame UTC timestamp trailer after the image data.
    pub timestamp_trailer: bool,
}

/// Append-only SER stream writer.
///
/// The 178-byte header is mmap'd so `frame_count` can be bumped in place on
/// every append; image data goes through the file handle positioned past the
/// header. The optional timestamp trailer is written on `close` (or on drop,
/// where a failure can only be logged).
pub struct SerFile {
    file: File,
    header_map: MmapMut,
    bytes_per_frame: usize,
    frame_timestamps: Vec<i64>,
    trailer: bool,
    closed: bool,
}

impl SerFile {
    pub fn create(path: impl AsRef<Path>, config: &SerConfig) -> Result<Self, SerError> {
        if config.width <= 0 || config.height <= 0 || !(1..=16).contains(&config.bit_depth) {
            return Err(SerError::InvalidGeometry {
                width: config.width,
                height: config.height,
                bit_depth: config.bit_depth,
            });
        }

        let bytes_per_plane = ((config.bit_depth - 1) / 8 + 1) as usize;
        let bytes_per_frame = config.width as usize
            * config.height as usize
            * bytes_per_plane
            * config.color_id.planes();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        // Make room for the header, then park the cursor past it so frame
        // appends land at the right offset.
        file.set_len(SerHeader::SIZE as u64)?;
        file.seek(SeekFrom::End(0))?;

        let mut header_map = unsafe { MmapOptions::new().len(SerHeader::SIZE).map_mut(&file)? };

        let utc = timestamp::utc_ticks_now();
        let local = utc + timestamp::local_utc_offset_secs() * timestamp::TICKS_PER_SEC;
        let header = SerHeader {
            file_id: SerHeader::FILE_ID,
            lu_id: 0,
            color_id: config.color_id as i32,
            little_endian: 0,
            image_width: config.width,
            image_height: config.height,
            pixel_depth_per_plane: config.bit_depth,
            frame_count: 0,
            observer: metadata_field(&config.observer),
            instrument: metadata_field(&config.instrument),
            telescope: metadata_field(&config.telescope),
            date_time: local,
            date_time_utc: utc,
        };
        unsafe {
            std::ptr::write_unaligned(header_map.as_mut_ptr() as *mut SerHeader, header);
        }

        Ok(Self {
            file,
            header_map,
            bytes_per_frame,
            frame_timestamps: Vec::new(),
            trailer: config.timestamp_trailer,
            closed: false,
        })
    }

    /// Append one frame of raw image data.
    ///
    /// The call either lands the whole frame or reports failure with the
    /// stream rolled back to the previous frame boundary; `frame_count` in
    /// the mapped header only advances on success.
    pub fn add_frame(&mut self, data: &[u8]) -> Result<(), SerError> {
        if data.len() != self.bytes_per_frame {
            return Err(SerError::SizeMismatch {
                expected: self.bytes_per_frame,
                actual: data.len(),
            });
        }

        let frame_start = self.file.stream_position()?;
        if let Err(e) = self.file.write_all(data) {
            // Partial append: cut the stream back to the frame boundary.
            let _ = self.file.set_len(frame_start);
            let _ = self.file.seek(SeekFrom::Start(frame_start));
            return Err(e.into());
        }

        if self.trailer {
            self.frame_timestamps.push(timestamp::utc_ticks_now());
        }
        self.header_mut().frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> i32 {
        self.header().frame_count
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Write the timestamp trailer (if enabled) and flush the header.
    pub fn close(mut self) -> Result<(), SerError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), SerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.trailer {
            let count = self.header().frame_count;
            if count as usize != self.frame_timestamps.len() {
                tracing::warn!(
                    "header frame count {} does not match {} recorded timestamps",
                    count,
                    self.frame_timestamps.len()
                );
            }
            for tick in &self.frame_timestamps {
                self.file.write_all(&tick.to_le_bytes())?;
            }
        }

        self.header_map.flush()?;
        Ok(())
    }

    fn header(&self) -> &SerHeader {
        unsafe { &*(self.header_map.as_ptr() as *const SerHeader) }
    }

    fn header_mut(&mut self) -> &mut SerHeader {
        unsafe { &mut *(self.header_map.as_mut_ptr() as *mut SerHeader) }
    }
}

impl Drop for SerFile {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("failed to finalize SER stream: {}", e);
        }
    }
}
