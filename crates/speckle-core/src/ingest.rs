use std::path::PathBuf;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::Calibration;
use crate::dark::{DarkAccumulator, DarkModel};
use crate::error::{Result, SpeckleError};
use crate::io::imm::ImmCursor;
use crate::reduce::{FrameMeanMode, Reducer};
use crate::sparse::SparseFrameStore;

/// Per-ingest options: which file, where the analysis window starts, and an
/// optional cap on pixels decoded per frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    pub input: PathBuf,
    /// First frame of the analysis window.
    #[serde(default)]
    pub frame_begin: u32,
    /// Cap on pixels decoded per frame; `None` means the full detector.
    #[serde(default)]
    pub pixels_per_frame: Option<usize>,
}

/// Ingest phase, used for logging and progress context.
#[derive(Clone, Copy, Debug)]
pub enum IngestStage {
    SkipDark,
    DarkRead,
    SkipToAnalysis,
    Analyze,
    Normalize,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkipDark => write!(f, "Skipping to dark window"),
            Self::DarkRead => write!(f, "Reading dark frames"),
            Self::SkipToAnalysis => write!(f, "Skipping to analysis window"),
            Self::Analyze => write!(f, "Reducing frames"),
            Self::Normalize => write!(f, "Normalizing partition means"),
        }
    }
}

/// Everything one ingest produces. Ownership of all accumulators transfers
/// to the caller; nothing is shared with the ingest afterwards.
///
/// The `(2, F)` arrays keep the layout of the recording pipeline: row 0
/// holds the 1-based frame ordinal, row 1 the per-frame quantity.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestResult {
    pub sparse_data: SparseFrameStore,
    /// True iff the source file stored sparse payloads.
    pub is_sparse: bool,
    /// Row 1 holds the header's elapsed seconds.
    pub timestamp_clock: Array2<f32>,
    /// Row 1 holds the detector tick counter.
    pub timestamp_tick: Array2<f32>,
    /// Row 1 holds the frame mean intensity.
    pub frame_sums: Array2<f32>,
    pub pixel_sums: Array1<f32>,
    pub total_partition_mean: Array1<f32>,
    /// Shape `(W, S)`: per-window, per-static-bin means.
    pub partial_partition_mean: Array2<f32>,
    /// Present only when the file is dense and a dark window was configured.
    pub dark_model: Option<DarkModel>,
}

/// Ingest one IMM file: skip to the dark window, estimate the noise model
/// (dense files only), skip to the analysis window, reduce `frames_todo`
/// frames in a single pass, and normalize the partition means.
///
/// The calibration is borrowed immutably for the whole call, so it cannot
/// change mid-ingest. Any failure abandons accumulation; no partial results
/// escape.
pub fn ingest(config: &IngestConfig, calib: &Calibration) -> Result<IngestResult> {
    calib.validate()?;

    let frame_begin = config.frame_begin as usize;
    let dark_begin = calib.dark_begin as usize;
    let dark_end = calib.dark_end as usize;
    if dark_end > frame_begin {
        return Err(SpeckleError::Calibration(format!(
            "dark window ends at frame {dark_end} but analysis begins at frame {frame_begin}"
        )));
    }

    let mut cursor = ImmCursor::open(&config.input)?;
    let pixels = calib.pixels();
    if cursor.pixels_per_frame() != pixels {
        return Err(SpeckleError::Calibration(format!(
            "calibration is for {}x{} but the file records {}x{} frames",
            calib.frame_width,
            calib.frame_height,
            cursor.template().rows,
            cursor.template().cols,
        )));
    }

    let is_sparse = cursor.is_sparse();
    let frames_todo = calib.frames_todo as usize;
    let cap = match config.pixels_per_frame {
        Some(n) if n >= 1 => n,
        _ => pixels,
    };

    info!(
        input = %config.input.display(),
        frames = frames_todo,
        frame_begin,
        sparse = is_sparse,
        "Ingesting IMM file"
    );

    // A missing flat-field is unity gain everywhere.
    let unity_gain;
    let flatfield: &[f64] = match calib.flatfield.as_deref() {
        Some(ff) => ff,
        None => {
            unity_gain = vec![1.0f64; pixels];
            &unity_gain
        }
    };

    let mut indices = vec![0u32; cap];
    let mut values = vec![0i16; cap];

    let mut fcount = 0usize;
    let mut dark_model: Option<DarkModel> = None;

    // Dark statistics only exist for dense recordings; sparse files arrive
    // pre-thresholded by the detector.
    if !is_sparse && dark_end > dark_begin {
        debug!(stage = %IngestStage::SkipDark, frames = dark_begin);
        while fcount < dark_begin {
            let header = cursor.read_header()?;
            cursor.skip_frame(header.dlen)?;
            fcount += 1;
        }

        debug!(stage = %IngestStage::DarkRead, frames = dark_end - dark_begin);
        let mut dark = DarkAccumulator::new(pixels);
        // Dark frames are always read at full detector width; the pixel cap
        // only applies to the analysis window.
        let mut dark_values = vec![0i16; pixels];
        while fcount < dark_end {
            let header = cursor.read_header()?;
            let dlen = header.dlen as usize;
            if dlen != pixels {
                return Err(SpeckleError::InvalidImm(format!(
                    "dark frame {fcount} has {dlen} records, expected a full {pixels}-pixel frame"
                )));
            }
            cursor.read_dense_payload(&mut dark_values, 0)?;
            dark.push_frame(&dark_values, flatfield);
            fcount += 1;
        }
        dark_model = Some(dark.finish());
    }

    debug!(stage = %IngestStage::SkipToAnalysis, frames = frame_begin - fcount);
    while fcount < frame_begin {
        let header = cursor.read_header()?;
        cursor.skip_frame(header.dlen)?;
        fcount += 1;
    }

    let mean_mode = if is_sparse {
        FrameMeanMode::TotalPixels
    } else {
        FrameMeanMode::AcceptedPixels
    };
    let mut reducer = Reducer::new(calib, flatfield, dark_model.as_ref(), mean_mode)?;

    let mut timestamp_clock = Array2::<f32>::zeros((2, frames_todo));
    let mut timestamp_tick = Array2::<f32>::zeros((2, frames_todo));

    debug!(stage = %IngestStage::Analyze, frames = frames_todo);
    while fcount - frame_begin < frames_todo {
        let header = cursor.read_header()?;
        let frame = fcount - frame_begin;
        let dlen = header.dlen as usize;

        timestamp_clock[[0, frame]] = frame as f32 + 1.0;
        timestamp_clock[[1, frame]] = header.elapsed as f32;
        timestamp_tick[[0, frame]] = frame as f32 + 1.0;
        timestamp_tick[[1, frame]] = header.corecotick as f32;

        if is_sparse {
            let count = dlen.min(cap);
            let skip_tail = dlen - count;
            cursor.read_sparse_payload(count, &mut indices, &mut values, skip_tail)?;
            let records = indices[..count]
                .iter()
                .zip(&values[..count])
                .map(|(&p, &v)| (p as usize, v));
            reducer.accumulate_frame(frame, records)?;
        } else {
            if dlen > cap {
                return Err(SpeckleError::PayloadTooLarge {
                    frame: fcount,
                    dlen,
                    cap,
                });
            }
            cursor.read_dense_payload(&mut values[..dlen], 0)?;
            let records = values[..dlen].iter().copied().enumerate();
            reducer.accumulate_frame(frame, records)?;
        }
        fcount += 1;
    }

    debug!(stage = %IngestStage::Normalize);
    let reduction = reducer.finish();

    info!(
        emissions = reduction.store.emission_count(),
        dark = dark_model.is_some(),
        "IMM ingest complete"
    );

    Ok(IngestResult {
        sparse_data: reduction.store,
        is_sparse,
        timestamp_clock,
        timestamp_tick,
        frame_sums: reduction.frame_sums,
        pixel_sums: reduction.pixel_sums,
        total_partition_mean: reduction.total_partition_mean,
        partial_partition_mean: reduction.partial_partition_mean,
        dark_model,
    })
}
