use std::path::Path;

use speckle_core::calibration::Calibration;
use speckle_core::io::imm::{
    IMM_HEADER_SIZE, OFF_BYTES_PER_PIXEL, OFF_COLS, OFF_COMPRESSION, OFF_CORECOTICK, OFF_DLEN,
    OFF_ELAPSED, OFF_ROWS,
};
use speckle_core::io::imm_writer::ImmWriter;

/// Elapsed seconds stamped on frame `i` by the file builders below.
pub fn test_elapsed(i: usize) -> f64 {
    (i as f64 + 1.0) * 0.5
}

/// Detector tick stamped on frame `i` by the file builders below.
pub fn test_tick(i: usize) -> u32 {
    100 + i as u32
}

/// Write a dense IMM file with one payload vector per frame.
pub fn write_dense_imm(path: &Path, rows: u32, cols: u32, frames: &[Vec<i16>]) {
    let mut writer = ImmWriter::create(path, rows, cols, false).expect("create IMM");
    for (i, frame) in frames.iter().enumerate() {
        writer
            .write_dense_frame(frame, test_elapsed(i), test_tick(i))
            .expect("write dense frame");
    }
    writer.finalize().expect("finalize IMM");
}

/// Write a sparse IMM file with one `(indices, values)` pair per frame.
pub fn write_sparse_imm(path: &Path, rows: u32, cols: u32, frames: &[(Vec<u32>, Vec<i16>)]) {
    let mut writer = ImmWriter::create(path, rows, cols, true).expect("create IMM");
    for (i, (indices, values)) in frames.iter().enumerate() {
        writer
            .write_sparse_frame(indices, values, test_elapsed(i), test_tick(i))
            .expect("write sparse frame");
    }
    writer.finalize().expect("finalize IMM");
}

/// Sparse records for a dense frame: every non-zero pixel in index order.
pub fn to_sparse(frame: &[i16]) -> (Vec<u32>, Vec<i16>) {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for (p, &v) in frame.iter().enumerate() {
        if v != 0 {
            indices.push(p as u32);
            values.push(v);
        }
    }
    (indices, values)
}

/// Build a raw 1024-byte IMM frame header with arbitrary field values.
///
/// Lets tests corrupt geometry mid-file, which `ImmWriter` refuses to do.
pub fn raw_header(
    rows: u32,
    cols: u32,
    compressed: bool,
    dlen: u32,
    elapsed: f64,
    corecotick: u32,
) -> [u8; IMM_HEADER_SIZE] {
    let mut block = [0u8; IMM_HEADER_SIZE];
    block[OFF_COMPRESSION..OFF_COMPRESSION + 4]
        .copy_from_slice(&u32::from(compressed).to_le_bytes());
    block[OFF_ROWS..OFF_ROWS + 4].copy_from_slice(&rows.to_le_bytes());
    block[OFF_COLS..OFF_COLS + 4].copy_from_slice(&cols.to_le_bytes());
    block[OFF_BYTES_PER_PIXEL..OFF_BYTES_PER_PIXEL + 4].copy_from_slice(&2u32.to_le_bytes());
    block[OFF_ELAPSED..OFF_ELAPSED + 8].copy_from_slice(&elapsed.to_le_bytes());
    block[OFF_DLEN..OFF_DLEN + 4].copy_from_slice(&dlen.to_le_bytes());
    block[OFF_CORECOTICK..OFF_CORECOTICK + 4].copy_from_slice(&corecotick.to_le_bytes());
    block
}

/// Calibration that keeps every pixel in a single static bin and reduces
/// `frames_todo` frames in one window, with unity gain and no dark window.
pub fn unit_calibration(rows: u32, cols: u32, frames_todo: u32) -> Calibration {
    let pixels = (rows * cols) as usize;
    Calibration {
        pixel_mask: vec![1; pixels],
        sbin_mask: vec![1; pixels],
        flatfield: None,
        det_efficiency: 1.0,
        det_adhu_phot: 1.0,
        det_preset: 1.0,
        norm_factor: 1.0,
        dark_threshold: 0.0,
        dark_sigma: 0.0,
        frame_width: rows,
        frame_height: cols,
        static_window: frames_todo.max(1),
        total_static_partitions: 1,
        dark_begin: 0,
        dark_end: 0,
        frames_todo,
    }
}
