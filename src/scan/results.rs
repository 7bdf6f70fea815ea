use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::review::context::PointContext;

// ---------------------------------------------------------------------------
// Rows and tables
// ---------------------------------------------------------------------------

/// Final metrics of one point, as written to the result tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Point")]
    pub point: usize,
    #[serde(rename = "Height")]
    pub amplitude: f64,
    #[serde(rename = "Mean")]
    pub center: f64,
    #[serde(rename = "Sigma")]
    pub sigma: f64,
    #[serde(rename = "FWHM")]
    pub fwhm: f64,
    #[serde(rename = "R^2")]
    pub r_squared: f64,
    #[serde(rename = "SNR")]
    pub snr_reference: f64,
    #[serde(rename = "SNR_Silent")]
    pub snr_silent: f64,
    #[serde(rename = "Other_Height")]
    pub other_amplitude: Option<f64>,
    #[serde(rename = "Other_Mean")]
    pub other_center: Option<f64>,
    #[serde(rename = "Other_Sigma")]
    pub other_sigma: Option<f64>,
}

impl ResultRow {
    /// Column order of the CSV tables.
    pub const HEADERS: [&'static str; 11] = [
        "Point",
        "Height",
        "Mean",
        "Sigma",
        "FWHM",
        "R^2",
        "SNR",
        "SNR_Silent",
        "Other_Height",
        "Other_Mean",
        "Other_Sigma",
    ];
}

impl From<&PointContext> for ResultRow {
    fn from(point: &PointContext) -> Self {
        ResultRow {
            point: point.index,
            amplitude: point.peak.amplitude,
            center: point.peak.center,
            sigma: point.peak.sigma,
            fwhm: point.metrics.fwhm,
            r_squared: point.metrics.r_squared,
            snr_reference: point.metrics.snr.reference,
            snr_silent: point.metrics.snr.silent,
            other_amplitude: point.other.map(|o| o.amplitude),
            other_center: point.other.map(|o| o.center),
            other_sigma: point.other.map(|o| o.sigma),
        }
    }
}

/// Append-only list of result rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Destination for a finished scan's tables.
pub trait ResultSink {
    /// Store both tables; returns where they went.
    fn persist(
        &mut self,
        scan: &str,
        approved: &ResultTable,
        denied: &ResultTable,
    ) -> Result<PathBuf, PersistError>;
}

/// Writes `<root>/<mineral>/<scan>_<n>/<scan>_Approved.csv` and
/// `<scan>_Denied.csv`, picking the first `n` (from 1) whose directory does
/// not exist yet.
#[derive(Debug, Clone)]
pub struct CsvResultStore {
    root: PathBuf,
    mineral: String,
}

impl CsvResultStore {
    pub fn new(root: impl Into<PathBuf>, mineral: impl Into<String>) -> Self {
        CsvResultStore {
            root: root.into(),
            mineral: mineral.into(),
        }
    }

    fn create_run_dir(&self, scan: &str) -> Result<PathBuf, PersistError> {
        let mineral_dir = self.root.join(&self.mineral);
        std::fs::create_dir_all(&mineral_dir).map_err(|source| PersistError::CreateDir {
            path: mineral_dir.clone(),
            source,
        })?;

        let mut n = 1usize;
        loop {
            let candidate = mineral_dir.join(format!("{scan}_{n}"));
            match std::fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(source) => {
                    return Err(PersistError::CreateDir {
                        path: candidate,
                        source,
                    });
                }
            }
        }
    }
}

fn write_table(path: &Path, table: &ResultTable) -> Result<(), PersistError> {
    let wrap = |source: csv::Error| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(wrap)?;
    writer.write_record(ResultRow::HEADERS).map_err(wrap)?;
    for row in table.rows() {
        writer.serialize(row).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))
}

impl ResultSink for CsvResultStore {
    fn persist(
        &mut self,
        scan: &str,
        approved: &ResultTable,
        denied: &ResultTable,
    ) -> Result<PathBuf, PersistError> {
        let dir = self.create_run_dir(scan)?;
        write_table(&dir.join(format!("{scan}_Approved.csv")), approved)?;
        write_table(&dir.join(format!("{scan}_Denied.csv")), denied)?;
        log::info!(
            "Wrote {} approved / {} denied rows to {}",
            approved.len(),
            denied.len(),
            dir.display()
        );
        Ok(dir)
    }
}
