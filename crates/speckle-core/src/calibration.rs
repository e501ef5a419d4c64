use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeckleError};

/// Detector calibration and reduction parameters for one ingest.
///
/// The caller builds one value and lends it to [`crate::ingest::ingest`] for
/// the duration of the call; the ingest never mutates it. Loading these
/// values from disk is the caller's concern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Calibration {
    /// Per-pixel keep mask; zero drops the pixel. Length `rows * cols`.
    pub pixel_mask: Vec<i16>,
    /// Per-pixel static-partition labels in `[1, total_static_partitions]`.
    pub sbin_mask: Vec<i32>,
    /// Per-pixel multiplicative gain. `None` means unity gain everywhere.
    pub flatfield: Option<Vec<f64>>,

    pub det_efficiency: f32,
    pub det_adhu_phot: f32,
    pub det_preset: f32,

    /// Divides every partition mean, typically exposure-time-derived.
    pub norm_factor: f32,
    /// Additive part of the dark threshold.
    pub dark_threshold: f32,
    /// Weight of the per-pixel dark standard deviation in the threshold.
    pub dark_sigma: f32,

    /// Detector rows.
    pub frame_width: u32,
    /// Detector columns.
    pub frame_height: u32,

    /// Frames per static-partition window.
    pub static_window: u32,
    /// Number of static partitions addressed by `sbin_mask`.
    pub total_static_partitions: u32,

    /// First frame of the dark window.
    pub dark_begin: u32,
    /// Frame ordinal at which the dark window closes (exclusive).
    pub dark_end: u32,
    /// Number of frames to reduce in the analysis window.
    pub frames_todo: u32,
}

impl Calibration {
    /// Pixels per frame.
    pub fn pixels(&self) -> usize {
        self.frame_width as usize * self.frame_height as usize
    }

    /// Frames in the dark window.
    pub fn dark_frames(&self) -> usize {
        (self.dark_end - self.dark_begin) as usize
    }

    /// Number of static windows covering the analysis span.
    pub fn windows(&self) -> usize {
        (self.frames_todo as usize).div_ceil(self.static_window as usize)
    }

    /// Check internal consistency before an ingest starts.
    pub fn validate(&self) -> Result<()> {
        let pixels = self.pixels();
        if pixels == 0 {
            return Err(SpeckleError::Calibration(format!(
                "invalid detector geometry {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.pixel_mask.len() != pixels {
            return Err(SpeckleError::Calibration(format!(
                "pixel mask has {} entries, detector has {} pixels",
                self.pixel_mask.len(),
                pixels
            )));
        }
        if self.sbin_mask.len() != pixels {
            return Err(SpeckleError::Calibration(format!(
                "static-bin mask has {} entries, detector has {} pixels",
                self.sbin_mask.len(),
                pixels
            )));
        }
        if let Some(ff) = &self.flatfield {
            if ff.len() != pixels {
                return Err(SpeckleError::Calibration(format!(
                    "flat-field has {} entries, detector has {} pixels",
                    ff.len(),
                    pixels
                )));
            }
        }
        if self.static_window == 0 {
            return Err(SpeckleError::Calibration(
                "static window size must be at least 1".into(),
            ));
        }
        if self.total_static_partitions == 0 {
            return Err(SpeckleError::Calibration(
                "at least one static partition is required".into(),
            ));
        }
        if self.frames_todo == 0 {
            return Err(SpeckleError::Calibration(
                "analysis window must contain at least one frame".into(),
            ));
        }
        if self.dark_begin > self.dark_end {
            return Err(SpeckleError::Calibration(format!(
                "dark window begins at frame {} but ends at frame {}",
                self.dark_begin, self.dark_end
            )));
        }
        Ok(())
    }
}
