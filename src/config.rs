use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::analysis::noise::{ReferenceBand, ReferenceWindow};
use crate::analysis::verdict::{RunMode, Thresholds};
use crate::data::filter::ShiftWindow;

/// Default half width of the peak-fit window around the expected center.
pub const DEFAULT_FIT_HALF_WIDTH: f64 = 150.0;

fn default_fit_half_width() -> f64 {
    DEFAULT_FIT_HALF_WIDTH
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Per-mineral run settings.
///
/// Column names follow the instrument team's `Settings.csv`; the older
/// `SAMPLING`, `SMOOTHING`, `CENTER` and `NOISE_SAMPLE` headers are accepted
/// as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    pub snr_threshold: f64,
    pub r_squared_threshold: f64,
    pub fwhm_min: f64,
    pub fwhm_max: f64,
    pub center_range: f64,
    /// Largest baseline half window, in samples.
    #[serde(alias = "SAMPLING")]
    pub max_half_window: usize,
    /// Pre-smoothing half window, in samples.
    #[serde(alias = "SMOOTHING")]
    pub smooth_half_window: usize,
    #[serde(alias = "CENTER")]
    pub expected_center: f64,
    pub mineral_name: String,
    /// Stem of the noise table under the noise directory.
    #[serde(alias = "NOISE_SAMPLE")]
    pub noise_sample_id: String,
    #[serde(default)]
    pub run_mode: RunMode,
    #[serde(default = "default_fit_half_width")]
    pub fit_half_width: f64,
    /// `fit` (default) or `center`.
    #[serde(default)]
    pub reference_band: ReferenceBand,
}

impl Settings {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            snr: self.snr_threshold,
            r_squared: self.r_squared_threshold,
            fwhm_min: self.fwhm_min,
            fwhm_max: self.fwhm_max,
            center_range: self.center_range,
            expected_center: self.expected_center,
        }
    }

    /// `EXPECTED_CENTER ± FIT_HALF_WIDTH`
    pub fn fit_window(&self) -> ShiftWindow {
        ShiftWindow::around(self.expected_center, self.fit_half_width)
    }

    /// Window the stowed-arm SNR is measured in.
    pub fn reference_window(&self) -> ReferenceWindow {
        match self.reference_band {
            ReferenceBand::Fit => ReferenceWindow::Between(self.fit_window()),
            ReferenceBand::Center => ReferenceWindow::AroundCenter(self.expected_center),
        }
    }

    /// `<noise_dir>/<NOISE_SAMPLE_ID>.csv`
    pub fn noise_path(&self, noise_dir: &Path) -> PathBuf {
        noise_dir.join(format!("{}.csv", self.noise_sample_id))
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("SNR_THRESHOLD", self.snr_threshold),
            ("R_SQUARED_THRESHOLD", self.r_squared_threshold),
            ("FWHM_MIN", self.fwhm_min),
            ("FWHM_MAX", self.fwhm_max),
            ("CENTER_RANGE", self.center_range),
            ("EXPECTED_CENTER", self.expected_center),
            ("FIT_HALF_WIDTH", self.fit_half_width),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                bail!("{name} must be a finite number, got {value}");
            }
        }

        if self.max_half_window == 0 {
            bail!("MAX_HALF_WINDOW must be at least 1");
        }
        if self.smooth_half_window == 0 {
            bail!("SMOOTH_HALF_WINDOW must be at least 1");
        }
        if self.fwhm_min >= self.fwhm_max {
            bail!(
                "FWHM_MIN ({}) must be below FWHM_MAX ({})",
                self.fwhm_min,
                self.fwhm_max
            );
        }
        if self.center_range <= 0.0 {
            bail!("CENTER_RANGE must be positive, got {}", self.center_range);
        }
        if self.fit_half_width <= 0.0 {
            bail!("FIT_HALF_WIDTH must be positive, got {}", self.fit_half_width);
        }
        if self.mineral_name.trim().is_empty() {
            bail!("MINERAL_NAME must not be empty");
        }
        if self.noise_sample_id.trim().is_empty() {
            bail!("NOISE_SAMPLE_ID must not be empty");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load settings from `.csv` (first data row) or `.json`, then validate.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let settings = match ext.as_str() {
        "csv" => load_csv(path)?,
        "json" => load_json(path)?,
        other => bail!("Unsupported settings extension: .{other}"),
    };

    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    log::info!(
        "Settings for {}: center {} ± {}, mode {}",
        settings.mineral_name,
        settings.expected_center,
        settings.fit_half_width,
        settings.run_mode
    );
    Ok(settings)
}

fn load_csv(path: &Path) -> Result<Settings> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening settings {}", path.display()))?;

    match reader.deserialize::<Settings>().next() {
        Some(row) => row.with_context(|| format!("parsing settings row in {}", path.display())),
        None => bail!("{}: settings file has no data row", path.display()),
    }
}

fn load_json(path: &Path) -> Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            snr_threshold: 5.0,
            r_squared_threshold: 0.8,
            fwhm_min: 5.0,
            fwhm_max: 30.0,
            center_range: 10.0,
            max_half_window: 20,
            smooth_half_window: 5,
            expected_center: 1085.0,
            mineral_name: "Carbonate".into(),
            noise_sample_id: "stowed_0001".into(),
            run_mode: RunMode::SemiAutomatic,
            fit_half_width: DEFAULT_FIT_HALF_WIDTH,
            reference_band: ReferenceBand::Fit,
        }
    }

    #[test]
    fn csv_accepts_legacy_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Settings.csv");
        std::fs::write(
            &path,
            "SNR_THRESHOLD,R_SQUARED_THRESHOLD,FWHM_MIN,FWHM_MAX,CENTER_RANGE,SAMPLING,SMOOTHING,MINERAL_NAME,NOISE_SAMPLE,CENTER\n\
             5, 0.8, 5, 30, 10, 20, 5, Carbonate, stowed_0001, 1085\n\
             1, 0.1, 1, 2, 3, 4, 5, Ignored, other, 900\n",
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings, sample());
    }

    #[test]
    fn json_uses_canonical_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "SNR_THRESHOLD": 5.0, "R_SQUARED_THRESHOLD": 0.8,
                "FWHM_MIN": 5.0, "FWHM_MAX": 30.0, "CENTER_RANGE": 10.0,
                "MAX_HALF_WINDOW": 20, "SMOOTH_HALF_WINDOW": 5,
                "EXPECTED_CENTER": 1085.0, "MINERAL_NAME": "Carbonate",
                "NOISE_SAMPLE_ID": "stowed_0001", "RUN_MODE": "manual",
                "FIT_HALF_WIDTH": 120.0
            }"#,
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.run_mode, RunMode::Manual);
        assert_eq!(settings.fit_half_width, 120.0);
        assert_eq!(settings.fit_window(), ShiftWindow::new(965.0, 1205.0));
        assert_eq!(
            settings.reference_window(),
            ReferenceWindow::Between(ShiftWindow::new(965.0, 1205.0))
        );
    }

    #[test]
    fn csv_selects_the_center_reference_band() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Settings.csv");
        std::fs::write(
            &path,
            "SNR_THRESHOLD,R_SQUARED_THRESHOLD,FWHM_MIN,FWHM_MAX,CENTER_RANGE,SAMPLING,SMOOTHING,MINERAL_NAME,NOISE_SAMPLE,CENTER,REFERENCE_BAND\n\
             5, 0.8, 5, 30, 10, 20, 5, Carbonate, stowed_0001, 850, center\n",
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.reference_band, ReferenceBand::Center);
        assert_eq!(
            settings.reference_window().resolve(),
            ShiftWindow::new(700.0, 1050.0)
        );
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let mut s = sample();
        s.max_half_window = 0;
        assert!(s.validate().is_err());

        let mut s = sample();
        s.fwhm_min = 40.0;
        assert!(s.validate().is_err());

        let mut s = sample();
        s.snr_threshold = f64::NAN;
        assert!(s.validate().is_err());

        let mut s = sample();
        s.mineral_name = "  ".into();
        assert!(s.validate().is_err());

        assert!(sample().validate().is_ok());
    }

    #[test]
    fn derived_values() {
        let s = sample();
        assert_eq!(s.thresholds().expected_center, 1085.0);
        assert_eq!(
            s.noise_path(Path::new("Noise")),
            Path::new("Noise").join("stowed_0001.csv")
        );
    }
}
