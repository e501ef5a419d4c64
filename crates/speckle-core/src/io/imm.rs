use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, SpeckleError};

/// Every IMM frame starts with a fixed 1024-byte header block.
pub const IMM_HEADER_SIZE: usize = 1024;

// Byte offsets of the consumed header fields (classic APS IMM layout,
// little-endian). Everything else in the block is opaque.
pub const OFF_COMPRESSION: usize = 4;
pub const OFF_ROWS: usize = 108;
pub const OFF_COLS: usize = 112;
pub const OFF_BYTES_PER_PIXEL: usize = 116;
pub const OFF_ELAPSED: usize = 128;
pub const OFF_DLEN: usize = 152;
pub const OFF_CORECOTICK: usize = 620;

/// Consumed fields of one IMM frame header.
#[derive(Clone, Debug)]
pub struct ImmHeader {
    /// Non-zero means the payload is sparse (index/value records).
    pub compressed: bool,
    pub rows: u32,
    pub cols: u32,
    /// Payload stride for dense frames.
    pub bytes_per_pixel: u32,
    /// Seconds since the start of the recording.
    pub elapsed: f64,
    /// Records in this frame's payload.
    pub dlen: u32,
    /// Detector tick counter.
    pub corecotick: u32,
}

impl ImmHeader {
    pub fn pixels(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

fn parse_header(buf: &[u8; IMM_HEADER_SIZE]) -> Result<ImmHeader> {
    let mut geometry = &buf[OFF_ROWS..OFF_BYTES_PER_PIXEL + 4];
    let rows = geometry.read_u32::<LittleEndian>()?;
    let cols = geometry.read_u32::<LittleEndian>()?;
    let bytes_per_pixel = geometry.read_u32::<LittleEndian>()?;

    let mut field = &buf[OFF_COMPRESSION..];
    let compressed = field.read_u32::<LittleEndian>()? != 0;
    let mut field = &buf[OFF_ELAPSED..];
    let elapsed = field.read_f64::<LittleEndian>()?;
    let mut field = &buf[OFF_DLEN..];
    let dlen = field.read_u32::<LittleEndian>()?;
    let mut field = &buf[OFF_CORECOTICK..];
    let corecotick = field.read_u32::<LittleEndian>()?;

    Ok(ImmHeader {
        compressed,
        rows,
        cols,
        bytes_per_pixel,
        elapsed,
        dlen,
        corecotick,
    })
}

/// Streaming frame-by-frame reader for IMM files.
///
/// Owns the file handle and a reusable header block. After `open` has
/// repositioned to the start of the file, the cursor only moves forward:
/// headers and payloads are consumed with exact reads, and everything else
/// is stepped over with relative seeks. Payload buffers are caller-provided
/// so they can be sized once per ingest.
pub struct ImmCursor {
    reader: BufReader<File>,
    header_buf: [u8; IMM_HEADER_SIZE],
    template: ImmHeader,
    frames_read: usize,
}

impl ImmCursor {
    /// Open an IMM file and parse the opening header as a geometry template.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut header_buf = [0u8; IMM_HEADER_SIZE];
        reader.read_exact(&mut header_buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SpeckleError::InvalidImm("file too small for an IMM header".into())
            } else {
                SpeckleError::Io(e)
            }
        })?;

        let template = parse_header(&header_buf)?;
        if template.rows == 0 || template.cols == 0 {
            return Err(SpeckleError::InvalidImm(format!(
                "invalid detector geometry {}x{}",
                template.rows, template.cols
            )));
        }
        if template.bytes_per_pixel != 2 {
            return Err(SpeckleError::InvalidImm(format!(
                "unsupported pixel width of {} bytes",
                template.bytes_per_pixel
            )));
        }

        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            header_buf,
            template,
            frames_read: 0,
        })
    }

    /// Header of the opening frame, kept as the file-wide geometry template.
    pub fn template(&self) -> &ImmHeader {
        &self.template
    }

    /// True if the file stores sparse (index/value) payloads.
    pub fn is_sparse(&self) -> bool {
        self.template.compressed
    }

    /// Pixels per frame, from the opening header.
    pub fn pixels_per_frame(&self) -> usize {
        self.template.pixels()
    }

    /// Frames whose headers have been consumed so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Read the next frame header, consuming exactly 1024 bytes.
    ///
    /// A clean end of file at a frame boundary fails with
    /// [`SpeckleError::EndOfFile`]; a partial header block and a mid-file
    /// geometry change are format errors.
    pub fn read_header(&mut self) -> Result<ImmHeader> {
        let frame = self.frames_read;
        let mut filled = 0;
        while filled < IMM_HEADER_SIZE {
            match self.reader.read(&mut self.header_buf[filled..]) {
                Ok(0) if filled == 0 => {
                    return Err(SpeckleError::EndOfFile { frames: frame });
                }
                Ok(0) => {
                    return Err(SpeckleError::InvalidImm(format!(
                        "short header for frame {frame}: {filled} of {IMM_HEADER_SIZE} bytes"
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SpeckleError::Io(e)),
            }
        }

        let header = parse_header(&self.header_buf)?;
        if header.pixels() != self.template.pixels() {
            return Err(SpeckleError::GeometryMismatch {
                frame,
                expected: self.template.pixels(),
                got: header.pixels(),
            });
        }
        self.frames_read += 1;
        Ok(header)
    }

    /// Read a sparse payload: `count` u32 pixel indices, then `count` i16
    /// values. When the frame holds more records than the caller wants,
    /// `skip_tail` records are stepped over at the end of each array.
    pub fn read_sparse_payload(
        &mut self,
        count: usize,
        out_idx: &mut [u32],
        out_val: &mut [i16],
        skip_tail: usize,
    ) -> Result<()> {
        let frame = self.frames_read.saturating_sub(1);
        self.reader
            .read_u32_into::<LittleEndian>(&mut out_idx[..count])
            .map_err(|e| payload_error(e, frame))?;
        if skip_tail > 0 {
            self.skip_bytes((skip_tail * 4) as i64)?;
        }
        self.reader
            .read_i16_into::<LittleEndian>(&mut out_val[..count])
            .map_err(|e| payload_error(e, frame))?;
        if skip_tail > 0 {
            self.skip_bytes((skip_tail * 2) as i64)?;
        }
        Ok(())
    }

    /// Read a dense payload of `out_val.len()` i16 values, then step over
    /// `skip_tail_bytes` of unread payload.
    pub fn read_dense_payload(&mut self, out_val: &mut [i16], skip_tail_bytes: u64) -> Result<()> {
        let frame = self.frames_read.saturating_sub(1);
        self.reader
            .read_i16_into::<LittleEndian>(out_val)
            .map_err(|e| payload_error(e, frame))?;
        if skip_tail_bytes > 0 {
            self.skip_bytes(skip_tail_bytes as i64)?;
        }
        Ok(())
    }

    /// Advance past one frame's payload without interpreting it.
    ///
    /// Sparse records are 6 bytes on the wire (u32 index + i16 value); dense
    /// records are `bytes_per_pixel` wide.
    pub fn skip_frame(&mut self, dlen: u32) -> Result<()> {
        let record = if self.template.compressed {
            6
        } else {
            i64::from(self.template.bytes_per_pixel)
        };
        self.skip_bytes(i64::from(dlen) * record)
    }

    fn skip_bytes(&mut self, n: i64) -> Result<()> {
        self.reader.seek_relative(n)?;
        Ok(())
    }
}

fn payload_error(e: std::io::Error, frame: usize) -> SpeckleError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        SpeckleError::InvalidImm(format!("unexpected end of file in frame {frame} payload"))
    } else {
        SpeckleError::Io(e)
    }
}
