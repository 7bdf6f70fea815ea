use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::lm::{self, LmOptions};
use crate::data::filter::{ShiftWindow, select};

/// FWHM of a Gaussian in units of sigma (2·√(2·ln 2)).
pub const FWHM_PER_SIGMA: f64 = 2.3548;

/// Initial sigma handed to the solver.
pub const SIGMA_GUESS: f64 = 5.0;

/// R² is evaluated over `center ± R_SQUARED_SIGMAS · sigma`.
pub const R_SQUARED_SIGMAS: f64 = 2.0;

// ---------------------------------------------------------------------------
// Gaussian model
// ---------------------------------------------------------------------------

/// `A·exp(-(x-mu)²/(2σ²))`
pub fn gaussian(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    amplitude * (-(x - center).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Sum of Gaussians; `p` holds `(A, mu, σ)` triples. Writes the partial
/// derivatives into `grad`.
fn gaussian_sum(x: f64, p: &[f64], grad: &mut [f64]) -> f64 {
    let mut total = 0.0;
    for (params, d) in p.chunks_exact(3).zip(grad.chunks_exact_mut(3)) {
        let (a, mu, sigma) = (params[0], params[1], params[2]);
        let dx = x - mu;
        let g = (-dx * dx / (2.0 * sigma * sigma)).exp();
        d[0] = g;
        d[1] = a * g * dx / (sigma * sigma);
        d[2] = a * g * dx * dx / (sigma * sigma * sigma);
        total += a * g;
    }
    total
}

/// One fitted Gaussian component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GaussianParams {
    pub amplitude: f64,
    pub center: f64,
    pub sigma: f64,
}

/// Which component parameter an operator edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Amplitude,
    Center,
    Sigma,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Amplitude => write!(f, "height"),
            Parameter::Center => write!(f, "mean"),
            Parameter::Sigma => write!(f, "sigma"),
        }
    }
}

impl GaussianParams {
    pub fn new(amplitude: f64, center: f64, sigma: f64) -> Self {
        GaussianParams {
            amplitude,
            center,
            sigma,
        }
    }

    fn from_solution(p: &[f64]) -> Self {
        // σ enters squared; report it positive.
        GaussianParams::new(p[0], p[1], p[2].abs())
    }

    pub fn eval(&self, x: f64) -> f64 {
        gaussian(x, self.amplitude, self.center, self.sigma)
    }

    pub fn fwhm(&self) -> f64 {
        FWHM_PER_SIGMA * self.sigma
    }

    pub fn set(&mut self, parameter: Parameter, value: f64) {
        match parameter {
            Parameter::Amplitude => self.amplitude = value,
            Parameter::Center => self.center = value,
            Parameter::Sigma => self.sigma = value,
        }
    }
}

// ---------------------------------------------------------------------------
// Fit results
// ---------------------------------------------------------------------------

/// Single-peak fit. A failed fit is all zeros; check [`PeakFit::is_found`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeakFit {
    pub params: GaussianParams,
    pub fwhm: f64,
    pub r_squared: f64,
    /// One-sigma parameter errors from the fit covariance.
    pub errors: Option<GaussianParams>,
}

impl PeakFit {
    /// The "no peak found" result.
    pub fn not_found() -> Self {
        PeakFit {
            params: GaussianParams::default(),
            fwhm: 0.0,
            r_squared: 0.0,
            errors: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.params != GaussianParams::default()
    }
}

/// Two-peak fit, keyed by the caller's focus guess rather than by position.
#[derive(Debug, Clone, PartialEq)]
pub struct DoublePeakFit {
    pub focus: GaussianParams,
    pub other: GaussianParams,
    pub focus_fwhm: f64,
    /// Joint R² over both peaks.
    pub r_squared: f64,
    /// One-sigma errors of the focus component.
    pub focus_errors: Option<GaussianParams>,
}

impl DoublePeakFit {
    pub fn not_found() -> Self {
        DoublePeakFit {
            focus: GaussianParams::default(),
            other: GaussianParams::default(),
            focus_fwhm: 0.0,
            r_squared: 0.0,
            focus_errors: None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.focus != GaussianParams::default() || self.other != GaussianParams::default()
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Fit one Gaussian to the samples strictly inside `window`.
///
/// Starts from (window maximum, `center_guess`, [`SIGMA_GUESS`]). Any solver
/// failure is logged and returned as [`PeakFit::not_found`].
pub fn fit_single_peak(
    raman_shift: &[f64],
    intensity: &[f64],
    window: ShiftWindow,
    center_guess: f64,
) -> PeakFit {
    let (wx, wy) = select(raman_shift, intensity, window);
    let Some(peak_max) = max_of(&wy) else {
        log::warn!("single-peak fit: no samples in {:.1}..{:.1}", window.low, window.high);
        return PeakFit::not_found();
    };

    let p0 = [peak_max, center_guess, SIGMA_GUESS];
    match lm::levenberg_marquardt(&wx, &wy, &p0, gaussian_sum, &LmOptions::default()) {
        Ok(solution) => {
            let params = GaussianParams::from_solution(&solution.params);
            log::debug!(
                "single-peak fit converged in {} iterations: {params:?}",
                solution.iterations
            );
            PeakFit {
                params,
                fwhm: params.fwhm(),
                r_squared: r_squared_single(raman_shift, intensity, &params),
                errors: solution
                    .covariance
                    .as_ref()
                    .and_then(|cov| std_errors(cov, 0)),
            }
        }
        Err(e) => {
            log::warn!("single-peak fit near {center_guess:.1} failed: {e}");
            PeakFit::not_found()
        }
    }
}

/// Fit two Gaussians jointly inside `window`.
///
/// The solver sees the guesses in ascending order; the result is mapped back
/// so `focus` is the component seeded by `focus_center`. Equal guesses keep
/// the focus on the left.
pub fn fit_double_peak(
    raman_shift: &[f64],
    intensity: &[f64],
    window: ShiftWindow,
    focus_center: f64,
    other_center: f64,
) -> DoublePeakFit {
    let (wx, wy) = select(raman_shift, intensity, window);
    let Some(peak_max) = max_of(&wy) else {
        log::warn!("double-peak fit: no samples in {:.1}..{:.1}", window.low, window.high);
        return DoublePeakFit::not_found();
    };

    let focus_left = focus_center <= other_center;
    let (left, right) = if focus_left {
        (focus_center, other_center)
    } else {
        (other_center, focus_center)
    };

    let p0 = [peak_max, left, SIGMA_GUESS, peak_max, right, SIGMA_GUESS];
    match lm::levenberg_marquardt(&wx, &wy, &p0, gaussian_sum, &LmOptions::default()) {
        Ok(solution) => {
            let first = GaussianParams::from_solution(&solution.params[0..3]);
            let second = GaussianParams::from_solution(&solution.params[3..6]);
            let (focus, other) = if focus_left {
                (first, second)
            } else {
                (second, first)
            };
            log::debug!(
                "double-peak fit converged in {} iterations: focus {focus:?}, other {other:?}",
                solution.iterations
            );
            DoublePeakFit {
                focus,
                other,
                focus_fwhm: focus.fwhm(),
                r_squared: r_squared_double(raman_shift, intensity, &focus, &other),
                focus_errors: solution
                    .covariance
                    .as_ref()
                    .and_then(|cov| std_errors(cov, if focus_left { 0 } else { 3 })),
            }
        }
        Err(e) => {
            log::warn!(
                "double-peak fit near {focus_center:.1}/{other_center:.1} failed: {e}"
            );
            DoublePeakFit::not_found()
        }
    }
}

/// Square roots of the covariance diagonal for the component starting at
/// `offset`.
fn std_errors(covariance: &DMatrix<f64>, offset: usize) -> Option<GaussianParams> {
    let err = |i: usize| {
        let var = covariance[(offset + i, offset + i)];
        (var >= 0.0).then(|| var.sqrt())
    };
    Some(GaussianParams::new(err(0)?, err(1)?, err(2)?))
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

// ---------------------------------------------------------------------------
// Goodness of fit
// ---------------------------------------------------------------------------

/// R² of one Gaussian over `center ± 2σ`.
pub fn r_squared_single(raman_shift: &[f64], intensity: &[f64], peak: &GaussianParams) -> f64 {
    let window = ShiftWindow::around(peak.center, R_SQUARED_SIGMAS * peak.sigma);
    r_squared(raman_shift, intensity, window, |x| peak.eval(x))
}

/// Joint R² of two Gaussians, from 2σ left of the lower-center peak to 2σ
/// right of the higher-center one.
pub fn r_squared_double(
    raman_shift: &[f64],
    intensity: &[f64],
    a: &GaussianParams,
    b: &GaussianParams,
) -> f64 {
    let (left, right) = if a.center <= b.center { (a, b) } else { (b, a) };
    let window = ShiftWindow::new(
        left.center - R_SQUARED_SIGMAS * left.sigma,
        right.center + R_SQUARED_SIGMAS * right.sigma,
    );
    r_squared(raman_shift, intensity, window, |x| a.eval(x) + b.eval(x))
}

/// `1 - SS_res/SS_tot`. A zero residual, a flat window (`SS_tot == 0`) or
/// an empty window gives 0: such a fit is uninformative, not perfect.
fn r_squared(
    raman_shift: &[f64],
    intensity: &[f64],
    window: ShiftWindow,
    model: impl Fn(f64) -> f64,
) -> f64 {
    let (xs, ys) = select(raman_shift, intensity, window);
    if ys.is_empty() {
        return 0.0;
    }
    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let ss_res: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(&x, &y)| (y - model(x)).powi(2))
        .sum();
    let ss_tot: f64 = ys.iter().map(|&y| (y - mean).powi(2)).sum();

    let ratio = ss_res / ss_tot;
    if ratio == 0.0 || !ratio.is_finite() {
        return 0.0;
    }
    1.0 - ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> Vec<f64> {
        (0..1600).map(|i| 700.0 + i as f64 * 0.5).collect()
    }

    fn synth(x: &[f64], peaks: &[GaussianParams]) -> Vec<f64> {
        x.iter()
            .map(|&xi| peaks.iter().map(|p| p.eval(xi)).sum())
            .collect()
    }

    /// ±`level`, alternating in an irregular pattern.
    fn with_noise(y: &[f64], level: f64) -> Vec<f64> {
        y.iter()
            .enumerate()
            .map(|(i, v)| if (i * 7919) % 13 < 6 { v + level } else { v - level })
            .collect()
    }

    fn within(actual: f64, expected: f64, rel: f64) -> bool {
        (actual - expected).abs() <= rel * expected.abs()
    }

    #[test]
    fn recovers_noiseless_single_gaussian() {
        let x = axis();
        let y = synth(&x, &[GaussianParams::new(100.0, 1085.0, 4.0)]);

        let fit = fit_single_peak(&x, &y, ShiftWindow::around(1085.0, 150.0), 1082.0);
        assert!(fit.is_found());
        assert!(within(fit.params.amplitude, 100.0, 0.01), "{:?}", fit.params);
        assert!(within(fit.params.center, 1085.0, 0.01), "{:?}", fit.params);
        assert!(within(fit.params.sigma, 4.0, 0.01), "{:?}", fit.params);
        assert!(fit.r_squared > 0.999, "r2 {}", fit.r_squared);
        assert!((fit.fwhm - FWHM_PER_SIGMA * fit.params.sigma).abs() < 1e-12);
        let errors = fit.errors.unwrap();
        assert!(errors.center < 1e-3, "{errors:?}");
    }

    #[test]
    fn parameter_errors_follow_peak_strength() {
        let x = axis();
        let y = with_noise(
            &synth(
                &x,
                &[
                    GaussianParams::new(100.0, 1085.0, 4.0),
                    GaussianParams::new(20.0, 1100.0, 5.0),
                ],
            ),
            0.5,
        );
        let window = ShiftWindow::around(1090.0, 150.0);

        let lone = with_noise(&synth(&x, &[GaussianParams::new(100.0, 1085.0, 4.0)]), 0.5);
        let single = fit_single_peak(&x, &lone, ShiftWindow::around(1085.0, 150.0), 1085.0);
        let errors = single.errors.unwrap();
        assert!(errors.center > 0.0 && errors.center < 0.1, "{errors:?}");
        assert!(errors.amplitude > 0.0 && errors.amplitude < 2.0, "{errors:?}");

        let strong = fit_double_peak(&x, &y, window, 1083.0, 1102.0).focus_errors.unwrap();
        let weak = fit_double_peak(&x, &y, window, 1102.0, 1083.0).focus_errors.unwrap();
        assert!(weak.center > 2.0 * strong.center, "{strong:?} {weak:?}");
    }

    #[test]
    fn flat_zero_spectrum_has_zero_r_squared() {
        let x = axis();
        let y = vec![0.0; x.len()];
        let fit = fit_single_peak(&x, &y, ShiftWindow::around(1085.0, 150.0), 1085.0);
        assert_eq!(fit.r_squared, 0.0);
        assert!(!fit.r_squared.is_nan());
    }

    #[test]
    fn empty_window_is_not_found() {
        let x = axis();
        let y = vec![1.0; x.len()];
        let fit = fit_single_peak(&x, &y, ShiftWindow::new(10.0, 20.0), 15.0);
        assert_eq!(fit, PeakFit::not_found());
        assert!(!fit.is_found());
    }

    #[test]
    fn double_peak_focus_follows_the_requested_center() {
        let x = axis();
        let y = synth(
            &x,
            &[
                GaussianParams::new(100.0, 1085.0, 4.0),
                GaussianParams::new(60.0, 1100.0, 5.0),
            ],
        );
        let window = ShiftWindow::around(1090.0, 150.0);

        let forward = fit_double_peak(&x, &y, window, 1083.0, 1102.0);
        let reversed = fit_double_peak(&x, &y, window, 1102.0, 1083.0);

        assert!(within(forward.focus.center, 1085.0, 0.001), "{forward:?}");
        assert!(within(forward.other.center, 1100.0, 0.001), "{forward:?}");
        assert!(within(reversed.focus.center, 1100.0, 0.001), "{reversed:?}");
        assert!(within(reversed.other.center, 1085.0, 0.001), "{reversed:?}");

        assert!(within(reversed.other.amplitude, forward.focus.amplitude, 1e-6));
        assert!(within(reversed.focus.amplitude, forward.other.amplitude, 1e-6));
        assert!((reversed.focus_fwhm - reversed.focus.fwhm()).abs() < 1e-12);
        assert!(forward.r_squared > 0.999);
    }

    #[test]
    fn flat_window_double_fit_is_uninformative() {
        let x = axis();
        let y = vec![0.0; x.len()];
        let fit = fit_double_peak(&x, &y, ShiftWindow::new(1500.0, 1600.0), 1540.0, 1560.0);
        assert_eq!(fit.r_squared, 0.0);
    }

    #[test]
    fn r_squared_for_manual_parameters() {
        let x = axis();
        let truth = GaussianParams::new(100.0, 1085.0, 4.0);
        let y = synth(&x, &[truth]);

        // Zero residual over a non-flat window.
        assert_eq!(r_squared_single(&x, &y, &truth), 0.0);
        assert_eq!(
            r_squared_double(&x, &y, &truth, &GaussianParams::new(0.0, 1120.0, 4.0)),
            0.0
        );

        let flat = vec![3.0; x.len()];
        assert_eq!(r_squared_single(&x, &flat, &GaussianParams::new(3.0, 1085.0, 4.0)), 0.0);

        let shifted = GaussianParams::new(100.0, 1087.0, 4.0);
        let r2 = r_squared_single(&x, &y, &shifted);
        assert!(r2 < 0.9 && r2 > -10.0, "r2 {r2}");
    }
}
