/// On-disk layout of the 178-byte SER file header.
///
/// The struct is viewed in place over the mmap'd header region of the
/// output file, so the layout must match the format byte for byte:
/// `repr(C, packed)` plus the size and offset tests below. Multi-byte
/// fields are little-endian on disk.
///
/// `frame_count` is the only field updated after creation; it is bumped in
/// place on every appended frame.
#[repr(C, packed)]
pub struct SerHeader {
    pub file_id: [u8; 14],
    pub lu_id: i32,
    pub color_id: i32,
    pub little_endian: i32,
    pub image_width: i32,
    pub image_height: i32,
    pub pixel_depth_per_plane: i32,
    pub frame_count: i32,
    pub observer: [u8; 40],
    pub instrument: [u8; 40],
    pub telescope: [u8; 40],
    pub date_time: i64,
    pub date_time_utc: i64,
}

impl SerHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub const FILE_ID: [u8; 14] = *b"LUCAM-RECORDER";
}

/// SER ColorID values for the sensor layouts this recorder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ColorId {
    Mono = 0,
    BayerRggb = 8,
    Rgb = 100,
    Bgr = 101,
}

impl ColorId {
    /// Color planes interleaved per pixel. Bayer data is a single plane;
    /// only true RGB/BGR streams carry three.
    pub fn planes(self) -> usize {
        match self {
            ColorId::Rgb | ColorId::Bgr => 3,
            ColorId::Mono | ColorId::BayerRggb => 1,
        }
    }
}

/// Truncate and NUL-pad a metadata string into a fixed header field.
pub(crate) fn metadata_field(value: &str) -> [u8; 40] {
    let mut field = [0u8; 40];
    let bytes = value.as_bytes();
    let len = bytes.len().min(40);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}
