use ndarray::{Array1, Array2};

use crate::calibration::Calibration;
use crate::dark::DarkModel;
use crate::error::{Result, SpeckleError};
use crate::sparse::SparseFrameStore;

/// How a frame's mean intensity is normalized.
///
/// Dense recordings divide by the number of pixels that survived the gates;
/// sparse recordings divide by the full detector pixel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMeanMode {
    AcceptedPixels,
    TotalPixels,
}

/// Accumulators handed back once the analysis window closes.
#[derive(Clone, Debug)]
pub struct Reduction {
    pub store: SparseFrameStore,
    pub pixel_sums: Array1<f32>,
    /// Shape `(2, F)`: row 0 holds `frame + 1`, row 1 the frame mean.
    pub frame_sums: Array2<f32>,
    pub total_partition_mean: Array1<f32>,
    /// Shape `(W, S)`.
    pub partial_partition_mean: Array2<f32>,
}

/// The central per-record accumulator.
///
/// Fed one frame at a time with an iterator of `(pixel, raw_value)` records,
/// so sparse payloads (index/value pairs) and dense payloads (enumerated
/// values) flow through the same gates: pixel mask, optional dark threshold,
/// flat-field, then the five accumulation targets.
pub struct Reducer<'a> {
    calib: &'a Calibration,
    flatfield: &'a [f64],
    dark: Option<&'a DarkModel>,
    mean_mode: FrameMeanMode,

    pixels: usize,
    frames_todo: usize,
    partitions: usize,

    store: SparseFrameStore,
    pixel_sums: Vec<f32>,
    frame_sums: Array2<f32>,
    total_partition_mean: Vec<f32>,
    partial_partition_mean: Array2<f32>,
    /// Pixels per static bin, counted over all pixels without the pixel mask.
    pixcount: Vec<f32>,

    window: usize,
    frames_in_window: u32,
}

impl<'a> Reducer<'a> {
    pub fn new(
        calib: &'a Calibration,
        flatfield: &'a [f64],
        dark: Option<&'a DarkModel>,
        mean_mode: FrameMeanMode,
    ) -> Result<Self> {
        let pixels = calib.pixels();
        let frames_todo = calib.frames_todo as usize;
        let partitions = calib.total_static_partitions as usize;
        let windows = calib.windows();

        let mut pixcount = vec![0.0f32; partitions];
        for (pixel, &sbin) in calib.sbin_mask.iter().enumerate() {
            if sbin < 1 || sbin as usize > partitions {
                return Err(SpeckleError::SbinOutOfRange {
                    pixel,
                    sbin,
                    partitions,
                });
            }
            pixcount[(sbin - 1) as usize] += 1.0;
        }

        Ok(Self {
            calib,
            flatfield,
            dark,
            mean_mode,
            pixels,
            frames_todo,
            partitions,
            store: SparseFrameStore::new(pixels),
            pixel_sums: vec![0.0; pixels],
            frame_sums: Array2::zeros((2, frames_todo)),
            total_partition_mean: vec![0.0; partitions],
            partial_partition_mean: Array2::zeros((windows, partitions)),
            pixcount,
            window: 0,
            frames_in_window: 0,
        })
    }

    /// Fold one frame's records into every accumulator.
    ///
    /// `frame` is the ordinal within the analysis window. A frame with no
    /// accepted pixels leaves a NaN mean under
    /// [`FrameMeanMode::AcceptedPixels`]; the caller decides how to report it.
    pub fn accumulate_frame<I>(&mut self, frame: usize, records: I) -> Result<()>
    where
        I: Iterator<Item = (usize, i16)>,
    {
        debug_assert!(frame < self.frames_todo);
        if frame > 0 && frame % self.calib.static_window as usize == 0 {
            self.window += 1;
            self.frames_in_window = 0;
        }
        self.frames_in_window += 1;

        let mut frame_sum = 0.0f32;
        let mut accepted = 0u32;

        for (pixel, raw) in records {
            if pixel >= self.pixels {
                return Err(SpeckleError::PixelIndexOutOfRange {
                    frame,
                    index: pixel,
                    pixels: self.pixels,
                });
            }
            if self.calib.pixel_mask[pixel] == 0 {
                continue;
            }

            let mut val = f32::from(raw);
            if let Some(dark) = self.dark {
                val = (val - dark.avg[pixel] as f32).max(0.0);
                let threshold =
                    self.calib.dark_threshold + self.calib.dark_sigma * dark.std[pixel] as f32;
                if val <= threshold {
                    continue;
                }
            }

            val *= self.flatfield[pixel] as f32;

            accepted += 1;
            frame_sum += val;
            self.pixel_sums[pixel] += val;
            let sbin = (self.calib.sbin_mask[pixel] - 1) as usize;
            self.total_partition_mean[sbin] += val;
            self.partial_partition_mean[[self.window, sbin]] += val;
            self.store.push(pixel, frame as u32, val);
        }

        let denom = match self.mean_mode {
            FrameMeanMode::AcceptedPixels => accepted as f32,
            FrameMeanMode::TotalPixels => self.pixels as f32,
        };
        self.frame_sums[[0, frame]] = frame as f32 + 1.0;
        self.frame_sums[[1, frame]] = frame_sum / denom;
        Ok(())
    }

    /// Normalize the partition means and hand every accumulator back.
    ///
    /// Partial means divide by the frame count of the *final* window, total
    /// means by the full analysis span. A bin with no pixels normalizes to
    /// a non-finite value rather than an error.
    pub fn finish(mut self) -> Reduction {
        let frames_final = self.frames_in_window as f32;
        let norm = self.calib.norm_factor;
        let windows = self.partial_partition_mean.nrows();

        for s in 0..self.partitions {
            let partial_denom = self.pixcount[s] * frames_final * norm;
            for w in 0..windows {
                self.partial_partition_mean[[w, s]] /= partial_denom;
            }
            let total_denom = self.pixcount[s] * self.frames_todo as f32 * norm;
            self.total_partition_mean[s] /= total_denom;
        }

        Reduction {
            store: self.store,
            pixel_sums: Array1::from_vec(self.pixel_sums),
            frame_sums: self.frame_sums,
            total_partition_mean: Array1::from_vec(self.total_partition_mean),
            partial_partition_mean: self.partial_partition_mean,
        }
    }
}
