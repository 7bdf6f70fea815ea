use crate::error::PipelineError;

/// Leading samples forced to zero before baseline estimation. The first
/// detector pixels carry large spikes that would drag the baseline up.
pub const EDGE_MASK_SAMPLES: usize = 60;

// ---------------------------------------------------------------------------
// Stowed-arm subtraction
// ---------------------------------------------------------------------------

/// Element-wise `intensity - reference`.
pub fn subtract_reference(intensity: &[f64], reference: &[f64]) -> Result<Vec<f64>, PipelineError> {
    if intensity.len() != reference.len() {
        return Err(PipelineError::ShapeMismatch {
            expected: intensity.len(),
            found: reference.len(),
        });
    }
    Ok(intensity
        .iter()
        .zip(reference)
        .map(|(y, r)| y - r)
        .collect())
}

// ---------------------------------------------------------------------------
// Baseline removal
// ---------------------------------------------------------------------------

/// Output of [`remove_baseline`]. `baseline + residual == masked` sample by sample.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRemoval {
    /// The input with its first [`EDGE_MASK_SAMPLES`] samples zeroed.
    pub masked: Vec<f64>,
    pub baseline: Vec<f64>,
    pub residual: Vec<f64>,
}

/// Estimate a smooth baseline under `intensity` and subtract it.
///
/// The masked trace is pre-smoothed with a centred moving average of
/// `smooth_half_window`, then eroded: for every half window from 1 to
/// `max_half_window` each sample is replaced by the smaller of itself and its
/// moving average. Peaks narrower than the largest window are flattened into
/// the surrounding background, broad curvature is kept.
pub fn remove_baseline(
    intensity: &[f64],
    max_half_window: usize,
    smooth_half_window: usize,
) -> Result<BaselineRemoval, PipelineError> {
    if max_half_window == 0 {
        return Err(PipelineError::InvalidParameter {
            name: "max_half_window",
            value: max_half_window,
        });
    }
    if smooth_half_window == 0 {
        return Err(PipelineError::InvalidParameter {
            name: "smooth_half_window",
            value: smooth_half_window,
        });
    }

    let mut masked = intensity.to_vec();
    let edge = EDGE_MASK_SAMPLES.min(masked.len());
    masked[..edge].fill(0.0);

    let baseline = estimate_baseline(&masked, max_half_window, smooth_half_window);
    let residual = masked
        .iter()
        .zip(&baseline)
        .map(|(y, b)| y - b)
        .collect();

    Ok(BaselineRemoval {
        masked,
        baseline,
        residual,
    })
}

fn estimate_baseline(y: &[f64], max_half_window: usize, smooth_half_window: usize) -> Vec<f64> {
    let mut z = moving_average(y, smooth_half_window);
    for half_window in 1..=max_half_window {
        let smoothed = moving_average(&z, half_window);
        for (zi, si) in z.iter_mut().zip(smoothed) {
            if si < *zi {
                *zi = si;
            }
        }
    }
    z
}

/// Centred moving average; the window is truncated at both ends.
fn moving_average(y: &[f64], half_window: usize) -> Vec<f64> {
    let n = y.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in y {
        acc += v;
        prefix.push(acc);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half_window);
            let hi = (i + half_window).min(n - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64
        })
        .collect()
}
