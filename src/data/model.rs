use std::sync::Arc;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Scan – every point of one map, on a shared Raman-shift axis
// ---------------------------------------------------------------------------

/// A full scan: one intensity row per point, all sharing the same x-axis.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Used to name the result directory.
    pub name: String,
    /// Raman shift axis (cm-1), ascending.
    pub raman_shift: Arc<[f64]>,
    /// Raw intensity rows, each the same length as `raman_shift`.
    pub points: Vec<Vec<f64>>,
}

impl Scan {
    /// Build a scan, checking every row against the axis length.
    pub fn new(
        name: impl Into<String>,
        raman_shift: Vec<f64>,
        points: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        let expected = raman_shift.len();
        if let Some(row) = points.iter().find(|row| row.len() != expected) {
            return Err(PipelineError::ShapeMismatch {
                expected,
                found: row.len(),
            });
        }
        Ok(Scan {
            name: name.into(),
            raman_shift: raman_shift.into(),
            points,
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the scan has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// NoiseReference – stowed-arm background
// ---------------------------------------------------------------------------

/// A dark / stowed-arm measurement on the scan's x-axis.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseReference {
    pub intensity: Arc<[f64]>,
}

impl NoiseReference {
    pub fn new(intensity: Vec<f64>) -> Self {
        NoiseReference {
            intensity: intensity.into(),
        }
    }

    /// Collapse several stowed-arm measurements into one reference by taking
    /// the per-sample median across measurements.
    pub fn median_of(measurements: &[Vec<f64>]) -> Result<Self, PipelineError> {
        let Some(first) = measurements.first() else {
            return Err(PipelineError::ShapeMismatch {
                expected: 1,
                found: 0,
            });
        };
        let len = first.len();
        if let Some(m) = measurements.iter().find(|m| m.len() != len) {
            return Err(PipelineError::ShapeMismatch {
                expected: len,
                found: m.len(),
            });
        }

        let mut column = Vec::with_capacity(measurements.len());
        let intensity = (0..len)
            .map(|i| {
                column.clear();
                column.extend(measurements.iter().map(|m| m[i]));
                median(&mut column)
            })
            .collect();
        Ok(NoiseReference::new(intensity))
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
