use ndarray::Array1;

/// Per-pixel noise model estimated from the dark window.
///
/// Immutable once built. `std` is the population standard deviation: the
/// variance divisor is the frame count `K`, not `K - 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct DarkModel {
    pub avg: Array1<f64>,
    pub std: Array1<f64>,
}

/// Streaming one-pass mean/variance estimator over dense dark frames,
/// using the Welford recurrence:
///
/// ```text
/// x      = raw[p] * flatfield[p]
/// delta1 = x - avg[p];  avg[p] += delta1 / i
/// delta2 = x - avg[p];  m2[p]  += delta1 * delta2
/// ```
#[derive(Clone, Debug)]
pub struct DarkAccumulator {
    avg: Vec<f64>,
    m2: Vec<f64>,
    frames: usize,
}

impl DarkAccumulator {
    pub fn new(pixels: usize) -> Self {
        Self {
            avg: vec![0.0; pixels],
            m2: vec![0.0; pixels],
            frames: 0,
        }
    }

    /// Fold one flat-field-corrected dark frame into the running estimate.
    pub fn push_frame(&mut self, raw: &[i16], flatfield: &[f64]) {
        debug_assert_eq!(raw.len(), self.avg.len());
        debug_assert_eq!(flatfield.len(), self.avg.len());
        self.frames += 1;
        let n = self.frames as f64;
        for (p, &v) in raw.iter().enumerate() {
            let x = f64::from(v) * flatfield[p];
            let delta1 = x - self.avg[p];
            self.avg[p] += delta1 / n;
            let delta2 = x - self.avg[p];
            self.m2[p] += delta1 * delta2;
        }
    }

    /// Frames folded in so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Finalize into per-pixel mean and population standard deviation.
    ///
    /// Must be fed at least one frame first.
    pub fn finish(self) -> DarkModel {
        debug_assert!(self.frames > 0);
        let k = self.frames as f64;
        let std = self.m2.into_iter().map(|m2| (m2 / k).sqrt()).collect();
        DarkModel {
            avg: Array1::from_vec(self.avg),
            std: Array1::from_vec(std),
        }
    }
}
