use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("frame is {actual} bytes but the stream expects {expected} bytes per frame")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("invalid image geometry: {width}x{height} at {bit_depth} bits per plane")]
    InvalidGeometry {
        width: i32,
        height: i32,
        bit_depth: i32,
    },
}
