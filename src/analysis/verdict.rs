use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::noise::SnrPair;

// ---------------------------------------------------------------------------
// Verdict & run mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Approved,
    Denied,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::Denied => write!(f, "denied"),
        }
    }
}

/// How much of a scan is shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Never prompt; every point takes the automatic verdict.
    Automatic,
    /// Prompt only for borderline points.
    #[default]
    #[serde(alias = "semi-automatic", alias = "semi_automatic")]
    SemiAutomatic,
    /// Prompt for every point.
    Manual,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic" | "auto" => Ok(RunMode::Automatic),
            "semiautomatic" | "semi-automatic" | "semi_automatic" | "semi" => {
                Ok(RunMode::SemiAutomatic)
            }
            "manual" => Ok(RunMode::Manual),
            other => Err(format!(
                "unknown run mode '{other}' (expected automatic, semiautomatic or manual)"
            )),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Automatic => write!(f, "automatic"),
            RunMode::SemiAutomatic => write!(f, "semiautomatic"),
            RunMode::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Acceptance thresholds for one mineral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub snr: f64,
    pub r_squared: f64,
    pub fwhm_min: f64,
    pub fwhm_max: f64,
    pub center_range: f64,
    pub expected_center: f64,
}

impl Thresholds {
    /// `fwhm_min < fwhm < fwhm_max`
    pub fn fwhm_in_range(&self, fwhm: f64) -> bool {
        fwhm > self.fwhm_min && fwhm < self.fwhm_max
    }
}

/// The metrics a verdict is based on.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitMetrics {
    pub snr: SnrPair,
    pub r_squared: f64,
    pub fwhm: f64,
    pub center: f64,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Approve iff the weaker SNR, R², FWHM and center offset all pass.
///
/// A "no peak found" fit (all zeros) is denied through its zero FWHM.
pub fn decide(metrics: &FitMetrics, thresholds: &Thresholds) -> Verdict {
    let approved = metrics.snr.min() > thresholds.snr
        && metrics.r_squared > thresholds.r_squared
        && thresholds.fwhm_in_range(metrics.fwhm)
        && (metrics.center - thresholds.expected_center).abs() < thresholds.center_range;

    if approved {
        Verdict::Approved
    } else {
        Verdict::Denied
    }
}

/// Whether the operator should see this point.
///
/// Semi-automatic mode flags points that pass on the stronger SNR with at
/// least half the R² threshold, or on 1.5× the SNR threshold alone; both
/// need a plausible FWHM.
pub fn needs_review(mode: RunMode, metrics: &FitMetrics, thresholds: &Thresholds) -> bool {
    match mode {
        RunMode::Automatic => false,
        RunMode::Manual => true,
        RunMode::SemiAutomatic => {
            let snr = metrics.snr.max();
            let fwhm_ok = thresholds.fwhm_in_range(metrics.fwhm);
            (snr > thresholds.snr && metrics.r_squared > thresholds.r_squared / 2.0 && fwhm_ok)
                || (snr > thresholds.snr * 1.5 && fwhm_ok)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds {
            snr: 5.0,
            r_squared: 0.8,
            fwhm_min: 5.0,
            fwhm_max: 30.0,
            center_range: 10.0,
            expected_center: 1085.0,
        }
    }

    fn passing() -> FitMetrics {
        FitMetrics {
            snr: SnrPair {
                reference: 12.0,
                silent: 9.0,
            },
            r_squared: 0.95,
            fwhm: 10.0,
            center: 1086.0,
        }
    }

    #[test]
    fn decide_requires_every_criterion() {
        let t = thresholds();
        assert_eq!(decide(&passing(), &t), Verdict::Approved);

        let mut m = passing();
        m.snr.silent = 4.0;
        assert_eq!(decide(&m, &t), Verdict::Denied, "weaker SNR governs");

        let mut m = passing();
        m.r_squared = 0.8;
        assert_eq!(decide(&m, &t), Verdict::Denied);

        let mut m = passing();
        m.fwhm = 30.0;
        assert_eq!(decide(&m, &t), Verdict::Denied);

        let mut m = passing();
        m.center = 1095.0;
        assert_eq!(decide(&m, &t), Verdict::Denied);

        let mut m = passing();
        m.center = 1075.5;
        assert_eq!(decide(&m, &t), Verdict::Approved);
    }

    #[test]
    fn decide_is_monotonic_in_snr() {
        let t = thresholds();
        let mut previous = Verdict::Denied;
        for step in 0..200 {
            let snr = step as f64 * 0.1;
            let mut m = passing();
            m.snr = SnrPair {
                reference: snr,
                silent: snr,
            };
            let verdict = decide(&m, &t);
            assert!(
                !(previous == Verdict::Approved && verdict == Verdict::Denied),
                "flipped back to denied at snr {snr}"
            );
            previous = verdict;
        }
        assert_eq!(previous, Verdict::Approved);
    }

    #[test]
    fn not_found_fit_is_denied() {
        let m = FitMetrics {
            snr: SnrPair::default(),
            r_squared: 0.0,
            fwhm: 0.0,
            center: 0.0,
        };
        assert_eq!(decide(&m, &thresholds()), Verdict::Denied);
    }

    #[test]
    fn review_predicate_per_mode() {
        let t = thresholds();
        let m = passing();
        assert!(!needs_review(RunMode::Automatic, &m, &t));
        assert!(needs_review(RunMode::Manual, &m, &t));
        assert!(needs_review(RunMode::SemiAutomatic, &m, &t));
    }

    #[test]
    fn semi_automatic_disjuncts() {
        let t = thresholds();
        let with = |reference: f64, silent: f64, r_squared: f64, fwhm: f64| FitMetrics {
            snr: SnrPair { reference, silent },
            r_squared,
            fwhm,
            center: 0.0,
        };

        // First disjunct: stronger SNR over threshold, R² over half threshold.
        assert!(needs_review(RunMode::SemiAutomatic, &with(6.0, 1.0, 0.41, 10.0), &t));
        assert!(!needs_review(RunMode::SemiAutomatic, &with(6.0, 1.0, 0.40, 10.0), &t));
        // Second disjunct: 1.5× SNR ignores R².
        assert!(needs_review(RunMode::SemiAutomatic, &with(1.0, 7.6, 0.0, 10.0), &t));
        assert!(!needs_review(RunMode::SemiAutomatic, &with(1.0, 7.5, 0.0, 10.0), &t));
        // FWHM gates both.
        assert!(!needs_review(RunMode::SemiAutomatic, &with(50.0, 50.0, 0.99, 31.0), &t));
    }

    #[test]
    fn run_mode_parsing() {
        assert_eq!("Automatic".parse::<RunMode>(), Ok(RunMode::Automatic));
        assert_eq!("semi-automatic".parse::<RunMode>(), Ok(RunMode::SemiAutomatic));
        assert_eq!("manual".parse::<RunMode>(), Ok(RunMode::Manual));
        assert!("sometimes".parse::<RunMode>().is_err());
    }
}
