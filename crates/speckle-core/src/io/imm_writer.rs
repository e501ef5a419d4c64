use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::Result;
use crate::io::imm::{
    IMM_HEADER_SIZE, OFF_BYTES_PER_PIXEL, OFF_COLS, OFF_COMPRESSION, OFF_CORECOTICK, OFF_DLEN,
    OFF_ELAPSED, OFF_ROWS,
};

/// Writes a valid IMM file at the raw byte level.
///
/// One geometry per file; each appended frame gets its own 1024-byte header
/// block with the consumed fields stamped at their offsets and every opaque
/// byte zeroed.
pub struct ImmWriter {
    writer: BufWriter<File>,
    rows: u32,
    cols: u32,
    compressed: bool,
    frames_written: u32,
}

impl ImmWriter {
    /// Create a new IMM file. `compressed` selects sparse payloads.
    pub fn create(path: &Path, rows: u32, cols: u32, compressed: bool) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            rows,
            cols,
            compressed,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Append a dense frame of row-major pixel values.
    pub fn write_dense_frame(&mut self, values: &[i16], elapsed: f64, corecotick: u32) -> Result<()> {
        debug_assert!(!self.compressed);
        debug_assert!(values.len() <= (self.rows * self.cols) as usize);
        self.write_header_block(values.len() as u32, elapsed, corecotick)?;
        for &v in values {
            self.writer.write_i16::<LittleEndian>(v)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Append a sparse frame of parallel index/value records.
    pub fn write_sparse_frame(
        &mut self,
        indices: &[u32],
        values: &[i16],
        elapsed: f64,
        corecotick: u32,
    ) -> Result<()> {
        debug_assert!(self.compressed);
        debug_assert_eq!(indices.len(), values.len());
        self.write_header_block(indices.len() as u32, elapsed, corecotick)?;
        for &idx in indices {
            self.writer.write_u32::<LittleEndian>(idx)?;
        }
        for &v in values {
            self.writer.write_i16::<LittleEndian>(v)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and finalize the file.
    pub fn finalize(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn write_header_block(&mut self, dlen: u32, elapsed: f64, corecotick: u32) -> Result<()> {
        let mut block = [0u8; IMM_HEADER_SIZE];
        let compression = u32::from(self.compressed);
        block[OFF_COMPRESSION..OFF_COMPRESSION + 4].copy_from_slice(&compression.to_le_bytes());
        block[OFF_ROWS..OFF_ROWS + 4].copy_from_slice(&self.rows.to_le_bytes());
        block[OFF_COLS..OFF_COLS + 4].copy_from_slice(&self.cols.to_le_bytes());
        block[OFF_BYTES_PER_PIXEL..OFF_BYTES_PER_PIXEL + 4].copy_from_slice(&2u32.to_le_bytes());
        block[OFF_ELAPSED..OFF_ELAPSED + 8].copy_from_slice(&elapsed.to_le_bytes());
        block[OFF_DLEN..OFF_DLEN + 4].copy_from_slice(&dlen.to_le_bytes());
        block[OFF_CORECOTICK..OFF_CORECOTICK + 4].copy_from_slice(&corecotick.to_le_bytes());
        self.writer.write_all(&block)?;
        Ok(())
    }
}
