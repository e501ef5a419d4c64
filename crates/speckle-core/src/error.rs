use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeckleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("end of file at the frame {frames} boundary")]
    EndOfFile { frames: usize },

    #[error("Invalid IMM file: {0}")]
    InvalidImm(String),

    #[error("Frame {frame}: {got} pixels does not match the opening frame ({expected})")]
    GeometryMismatch {
        frame: usize,
        expected: usize,
        got: usize,
    },

    #[error("Frame {frame}: payload of {dlen} records exceeds the {cap}-pixel buffer")]
    PayloadTooLarge {
        frame: usize,
        dlen: usize,
        cap: usize,
    },

    #[error("Frame {frame}: pixel index {index} out of range (detector has {pixels} pixels)")]
    PixelIndexOutOfRange {
        frame: usize,
        index: usize,
        pixels: usize,
    },

    #[error("Pixel {pixel}: static bin {sbin} outside [1, {partitions}]")]
    SbinOutOfRange {
        pixel: usize,
        sbin: i32,
        partitions: usize,
    },

    #[error("Calibration error: {0}")]
    Calibration(String),
}

pub type Result<T> = std::result::Result<T, SpeckleError>;
