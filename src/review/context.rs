use std::sync::Arc;

use crate::analysis::noise::{ReferenceWindow, estimate_snr};
use crate::analysis::peak_fit::{
    self, GaussianParams, fit_double_peak, fit_single_peak, r_squared_double, r_squared_single,
};
use crate::analysis::preprocess::{remove_baseline, subtract_reference};
use crate::analysis::verdict::{FitMetrics, Thresholds, Verdict, decide};
use crate::config::Settings;
use crate::data::filter::{ShiftWindow, nearest_index};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Cosmic-ray patch bounds
// ---------------------------------------------------------------------------

/// Sample indices bracketing a cosmic-ray spike. The patch touches only the
/// samples strictly between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CosmicBounds {
    pub lower: usize,
    pub upper: usize,
}

impl CosmicBounds {
    /// Bounds from two Raman shifts, ordered ascending.
    pub fn from_shifts(raman_shift: &[f64], a: f64, b: f64) -> Self {
        let (i, j) = (nearest_index(raman_shift, a), nearest_index(raman_shift, b));
        CosmicBounds {
            lower: i.min(j),
            upper: i.max(j),
        }
    }
}

/// Replace `trace[lower+1 .. upper]` with a straight line from `trace[lower]`
/// toward `trace[upper]`. Out-of-range or empty bounds leave the trace as is.
pub fn patch_linear(trace: &mut [f64], bounds: CosmicBounds) {
    let CosmicBounds { lower, upper } = bounds;
    if lower >= upper || upper >= trace.len() {
        return;
    }
    let slope = (trace[lower] - trace[upper]) / (lower as f64 - upper as f64);
    for i in lower + 1..upper {
        trace[i] = trace[i - 1] + slope;
    }
}

/// Plot position of a component in a two-peak fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

// ---------------------------------------------------------------------------
// PointContext – everything known about the point being processed
// ---------------------------------------------------------------------------

/// One scan point with its current corrections, fit and metrics.
///
/// Owned by exactly one activity at a time: the scan thread builds it, moves
/// it to the review side when an operator must look at it, and gets it back
/// with the verdict.
#[derive(Debug, Clone)]
pub struct PointContext {
    pub index: usize,
    pub raman_shift: Arc<[f64]>,
    pub reference: Arc<[f64]>,

    /// Reference-subtracted trace with the edge mask applied. Cosmic-ray
    /// patches are made here.
    pub corrected: Vec<f64>,
    pub baseline: Vec<f64>,
    /// `corrected - baseline`; every fit and metric reads this.
    pub residual: Vec<f64>,

    /// Baseline half windows for this point.
    pub sampling: usize,
    pub smoothing: usize,

    /// The peak at the expected center.
    pub peak: GaussianParams,
    /// One-sigma errors of `peak` from the last fit; cleared by manual edits.
    pub peak_errors: Option<GaussianParams>,
    /// Neighbouring peak, present once a two-peak fit has been requested.
    pub other: Option<GaussianParams>,
    other_guess: f64,

    pub metrics: FitMetrics,

    /// Shift range shown around the cosmic-ray editor.
    pub display: ShiftWindow,
    pub cosmic: CosmicBounds,

    thresholds: Thresholds,
    fit_window: ShiftWindow,
    reference_window: ReferenceWindow,
}

impl PointContext {
    /// Subtract the reference, remove the baseline, fit the expected peak and
    /// compute its metrics.
    pub fn prepare(
        index: usize,
        raw: &[f64],
        raman_shift: Arc<[f64]>,
        reference: Arc<[f64]>,
        settings: &Settings,
    ) -> Result<Self, PipelineError> {
        if raw.len() != raman_shift.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: raman_shift.len(),
                found: raw.len(),
            });
        }
        let corrected = subtract_reference(raw, &reference)?;
        let fit_window = settings.fit_window();

        let mut ctx = PointContext {
            index,
            raman_shift,
            reference,
            corrected,
            baseline: Vec::new(),
            residual: Vec::new(),
            sampling: settings.max_half_window,
            smoothing: settings.smooth_half_window,
            peak: GaussianParams::default(),
            peak_errors: None,
            other: None,
            other_guess: 0.0,
            metrics: FitMetrics::default(),
            display: fit_window,
            cosmic: CosmicBounds::default(),
            thresholds: settings.thresholds(),
            fit_window,
            reference_window: settings.reference_window(),
        };
        ctx.rebaseline()?;
        ctx.refit()?;
        Ok(ctx)
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn fit_window(&self) -> ShiftWindow {
        self.fit_window
    }

    /// The verdict the policy gives the current metrics.
    pub fn automatic_verdict(&self) -> Verdict {
        decide(&self.metrics, &self.thresholds)
    }

    /// Re-run baseline removal on `corrected` with the current half windows.
    pub fn rebaseline(&mut self) -> Result<(), PipelineError> {
        let removal = remove_baseline(&self.corrected, self.sampling, self.smoothing)?;
        self.corrected = removal.masked;
        self.baseline = removal.baseline;
        self.residual = removal.residual;
        Ok(())
    }

    /// Fit the residual again: one peak, or both when a neighbour is tracked.
    pub fn refit(&mut self) -> Result<(), PipelineError> {
        if self.other.is_some() {
            return self.fit_two_peaks(self.other_guess);
        }
        let fit = fit_single_peak(
            &self.raman_shift,
            &self.residual,
            self.fit_window,
            self.thresholds.expected_center,
        );
        self.peak = fit.params;
        self.peak_errors = fit.errors;
        self.recompute_metrics()
    }

    /// Fit the expected peak together with a neighbour near `other_center`.
    pub fn fit_two_peaks(&mut self, other_center: f64) -> Result<(), PipelineError> {
        let fit = fit_double_peak(
            &self.raman_shift,
            &self.residual,
            self.fit_window,
            self.thresholds.expected_center,
            other_center,
        );
        self.other_guess = if fit.is_found() {
            fit.other.center
        } else {
            other_center
        };
        self.peak = fit.focus;
        self.peak_errors = fit.focus_errors;
        self.other = Some(fit.other);
        self.recompute_metrics()
    }

    /// Recompute R², FWHM and both SNRs from the current parameters and
    /// residual.
    pub fn recompute_metrics(&mut self) -> Result<(), PipelineError> {
        let r_squared = match &self.other {
            Some(other) => r_squared_double(&self.raman_shift, &self.residual, &self.peak, other),
            None => r_squared_single(&self.raman_shift, &self.residual, &self.peak),
        };
        let snr = estimate_snr(
            &self.raman_shift,
            &self.residual,
            &self.reference,
            self.peak.amplitude,
            self.reference_window,
        )?;
        self.metrics = FitMetrics {
            snr,
            r_squared,
            fwhm: self.peak.fwhm(),
            center: self.peak.center,
        };
        Ok(())
    }

    /// Set cosmic-ray bounds from two Raman shifts.
    pub fn set_cosmic_bounds(&mut self, a: f64, b: f64) {
        self.cosmic = CosmicBounds::from_shifts(&self.raman_shift, a, b);
    }

    /// Patch the spike between the cosmic bounds, then re-baseline and refit.
    pub fn apply_cosmic_patch(&mut self) -> Result<(), PipelineError> {
        patch_linear(&mut self.corrected, self.cosmic);
        self.rebaseline()?;
        self.refit()
    }

    /// The component drawn on `side` of the plot. Without a neighbour both
    /// sides are the expected peak.
    pub fn component_mut(&mut self, side: Side) -> &mut GaussianParams {
        let focus_left = self
            .other
            .as_ref()
            .map_or(true, |other| self.peak.center <= other.center);
        match (side, focus_left, self.other.as_mut()) {
            (Side::Left, false, Some(other)) | (Side::Right, true, Some(other)) => other,
            _ => &mut self.peak,
        }
    }

    /// Whether the peak fit produced anything.
    pub fn peak_found(&self) -> bool {
        self.peak != GaussianParams::default()
    }

    /// One-line summary for logs and prompts.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "point {}: height {:.1}, mean {:.1}, sigma {:.1}, FWHM {:.1}, R^2 {:.4}, SNR {:.2}/{:.2}, sampling {}, smoothing {}",
            self.index,
            self.peak.amplitude,
            self.peak.center,
            self.peak.sigma,
            self.metrics.fwhm,
            self.metrics.r_squared,
            self.metrics.snr.reference,
            self.metrics.snr.silent,
            self.sampling,
            self.smoothing,
        );
        if let Some(errors) = &self.peak_errors {
            text.push_str(&format!(
                " (± height {:.2}, mean {:.2}, sigma {:.2})",
                errors.amplitude, errors.center, errors.sigma
            ));
        }
        if let Some(other) = &self.other {
            text.push_str(&format!(
                "; other height {:.1}, mean {:.1}, sigma {:.1}, FWHM {:.1}",
                other.amplitude,
                other.center,
                other.sigma,
                other.sigma * peak_fit::FWHM_PER_SIGMA,
            ));
        }
        text
    }
}
