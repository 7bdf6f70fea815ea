use serde::{Deserialize, Serialize};

use crate::data::filter::{ShiftWindow, select};
use crate::error::PipelineError;

/// Band with no Raman features from the target minerals.
pub const SILENT_REGION: ShiftWindow = ShiftWindow {
    low: 2000.0,
    high: 2100.0,
};

/// Half width of the reference window around a peak center.
pub const REFERENCE_HALF_WIDTH: f64 = 200.0;

/// The reference window never reaches below this shift; the stowed-arm
/// trace is dominated by laser-edge structure there.
pub const REFERENCE_FLOOR: f64 = 700.0;

/// Two independent signal-to-noise estimates; never merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnrPair {
    /// Amplitude over the stowed-arm reference noise near the peak.
    pub reference: f64,
    /// Amplitude over the spectrum's own silent-region noise.
    pub silent: f64,
}

impl SnrPair {
    pub fn min(&self) -> f64 {
        self.reference.min(self.silent)
    }

    pub fn max(&self) -> f64 {
        self.reference.max(self.silent)
    }
}

/// Which part of the stowed-arm trace a run measures noise in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceBand {
    /// The peak-fit window.
    #[default]
    Fit,
    /// A fixed band around the expected center, see [`ReferenceWindow::AroundCenter`].
    Center,
}

/// Where to sample the reference trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceWindow {
    /// `max(center - 200, 700) < x < center + 200`
    AroundCenter(f64),
    /// An explicit window, typically the peak-fit window.
    Between(ShiftWindow),
}

impl ReferenceWindow {
    pub fn resolve(&self) -> ShiftWindow {
        match *self {
            ReferenceWindow::AroundCenter(center) => ShiftWindow::new(
                (center - REFERENCE_HALF_WIDTH).max(REFERENCE_FLOOR),
                center + REFERENCE_HALF_WIDTH,
            ),
            ReferenceWindow::Between(window) => window,
        }
    }
}

/// `amplitude / std(reference inside window)`.
pub fn snr_from_reference(
    reference: &[f64],
    raman_shift: &[f64],
    amplitude: f64,
    window: ReferenceWindow,
) -> Result<f64, PipelineError> {
    if reference.len() != raman_shift.len() {
        return Err(PipelineError::ShapeMismatch {
            expected: raman_shift.len(),
            found: reference.len(),
        });
    }
    let window = window.resolve();
    let (_, noise) = select(raman_shift, reference, window);
    Ok(amplitude / std_dev(&noise, window)?)
}

/// `amplitude / std(intensity inside the silent region)`.
pub fn snr_from_silent_region(
    raman_shift: &[f64],
    intensity: &[f64],
    amplitude: f64,
) -> Result<f64, PipelineError> {
    if intensity.len() != raman_shift.len() {
        return Err(PipelineError::ShapeMismatch {
            expected: raman_shift.len(),
            found: intensity.len(),
        });
    }
    let (_, silent) = select(raman_shift, intensity, SILENT_REGION);
    Ok(amplitude / std_dev(&silent, SILENT_REGION)?)
}

/// Both estimates for one peak amplitude.
pub fn estimate_snr(
    raman_shift: &[f64],
    intensity: &[f64],
    reference: &[f64],
    amplitude: f64,
    window: ReferenceWindow,
) -> Result<SnrPair, PipelineError> {
    Ok(SnrPair {
        reference: snr_from_reference(reference, raman_shift, amplitude, window)?,
        silent: snr_from_silent_region(raman_shift, intensity, amplitude)?,
    })
}

/// Population standard deviation.
fn std_dev(values: &[f64], window: ShiftWindow) -> Result<f64, PipelineError> {
    if values.is_empty() {
        return Err(PipelineError::InvalidWindow {
            low: window.low,
            high: window.high,
        });
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Ok(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> Vec<f64> {
        (0..3000).map(|i| 500.0 + i as f64 * 0.6).collect()
    }

    /// Alternates ±1; standard deviation ≈ 1 over any window.
    fn square_noise(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect()
    }

    #[test]
    fn reference_window_is_floored() {
        assert_eq!(
            ReferenceWindow::AroundCenter(800.0).resolve(),
            ShiftWindow::new(700.0, 1000.0)
        );
        assert_eq!(
            ReferenceWindow::AroundCenter(1085.0).resolve(),
            ShiftWindow::new(885.0, 1285.0)
        );
    }

    #[test]
    fn snr_is_amplitude_over_std() {
        let x = axis();
        let noise = square_noise(x.len());
        let window = ReferenceWindow::Between(ShiftWindow::new(1000.0, 1100.0));
        let snr = snr_from_reference(&noise, &x, 50.0, window).unwrap();
        assert!((snr - 50.0).abs() < 0.1, "snr {snr}");

        let silent = snr_from_silent_region(&x, &noise, 20.0).unwrap();
        assert!((silent - 20.0).abs() < 0.1, "silent {silent}");
    }

    #[test]
    fn estimates_stay_independent() {
        let x = axis();
        let reference = square_noise(x.len());
        let intensity: Vec<f64> = reference.iter().map(|v| v * 4.0).collect();
        let pair = estimate_snr(
            &x,
            &intensity,
            &reference,
            40.0,
            ReferenceWindow::AroundCenter(1085.0),
        )
        .unwrap();
        assert!((pair.reference - 40.0).abs() < 0.1);
        assert!((pair.silent - 10.0).abs() < 0.1);
        assert_eq!(pair.min(), pair.silent);
        assert_eq!(pair.max(), pair.reference);
    }

    #[test]
    fn empty_windows_are_errors() {
        let x: Vec<f64> = (0..100).map(|i| 800.0 + i as f64).collect();
        let y = vec![0.0; x.len()];
        assert!(matches!(
            snr_from_silent_region(&x, &y, 1.0),
            Err(PipelineError::InvalidWindow { .. })
        ));
        assert!(matches!(
            snr_from_reference(&y, &x, 1.0, ReferenceWindow::Between(ShiftWindow::new(0.0, 10.0))),
            Err(PipelineError::InvalidWindow { .. })
        ));
    }
}
