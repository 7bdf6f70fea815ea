use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::results::{ResultRow, ResultSink, ResultTable};
use crate::analysis::verdict::{Verdict, needs_review};
use crate::config::Settings;
use crate::data::model::{NoiseReference, Scan};
use crate::error::{PersistError, PipelineError, ScanError};
use crate::review::channel::ReviewGate;
use crate::review::context::PointContext;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Point counter shared with whoever displays progress.
#[derive(Debug, Default)]
pub struct ScanProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl ScanProgress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// `completed / total`, 0 before a scan starts.
    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.completed() as f64 / total as f64,
        }
    }

    fn start(&self, total: usize) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A finished, persisted scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub approved: ResultTable,
    pub denied: ResultTable,
    /// Points an operator looked at.
    pub reviewed: usize,
    /// Where the sink put the tables.
    pub output: PathBuf,
}

// ---------------------------------------------------------------------------
// ScanOrchestrator
// ---------------------------------------------------------------------------

/// Walks a scan point by point and collects the verdicts.
#[derive(Debug)]
pub struct ScanOrchestrator {
    settings: Settings,
    progress: Arc<ScanProgress>,
    approved: ResultTable,
    denied: ResultTable,
    reviewed: usize,
    /// Scan whose tables are waiting to be persisted.
    pending: Option<String>,
}

impl ScanOrchestrator {
    pub fn new(settings: Settings) -> Self {
        ScanOrchestrator {
            settings,
            progress: Arc::new(ScanProgress::default()),
            approved: ResultTable::default(),
            denied: ResultTable::default(),
            reviewed: 0,
            pending: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn progress(&self) -> Arc<ScanProgress> {
        Arc::clone(&self.progress)
    }

    /// Rows collected but not yet persisted: `(approved, denied)`.
    pub fn pending_rows(&self) -> (usize, usize) {
        (self.approved.len(), self.denied.len())
    }

    /// Process every point in index order, then persist both tables.
    ///
    /// Points that need an operator block in `gate` until resolved. If
    /// persisting fails the tables stay in memory; call [`Self::flush`] to
    /// retry.
    pub fn run_scan<G, S>(
        &mut self,
        scan: &Scan,
        reference: &NoiseReference,
        gate: &mut G,
        sink: &mut S,
    ) -> Result<ScanOutcome, ScanError>
    where
        G: ReviewGate + ?Sized,
        S: ResultSink + ?Sized,
    {
        if reference.len() != scan.raman_shift.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: scan.raman_shift.len(),
                found: reference.len(),
            }
            .into());
        }
        if let Some(previous) = &self.pending {
            log::warn!("Discarding unsaved results of scan {previous}");
        }

        self.approved = ResultTable::default();
        self.denied = ResultTable::default();
        self.reviewed = 0;
        self.pending = Some(scan.name.clone());
        self.progress.start(scan.len());
        log::info!(
            "Scanning {} ({} points, {} mode)",
            scan.name,
            scan.len(),
            self.settings.run_mode
        );

        for (index, raw) in scan.points.iter().enumerate() {
            let verdict = self.process_point(
                index,
                raw,
                Arc::clone(&scan.raman_shift),
                Arc::clone(&reference.intensity),
                gate,
            )?;
            let done = self.progress.advance();
            log::info!("Point {done}/{}: {verdict}", scan.len());
        }

        Ok(self.flush(sink)?)
    }

    /// Run one point through the pipeline and file its row.
    pub fn process_point<G>(
        &mut self,
        index: usize,
        raw: &[f64],
        raman_shift: Arc<[f64]>,
        reference: Arc<[f64]>,
        gate: &mut G,
    ) -> Result<Verdict, ScanError>
    where
        G: ReviewGate + ?Sized,
    {
        let point = PointContext::prepare(index, raw, raman_shift, reference, &self.settings)
            .map_err(|source| ScanError::Point {
                point: index,
                source,
            })?;
        log::debug!("{}", point.summary());

        let automatic = point.automatic_verdict();
        let (verdict, point) =
            if needs_review(self.settings.run_mode, &point.metrics, point.thresholds()) {
                self.reviewed += 1;
                gate.review(point)?
            } else {
                (automatic, point)
            };

        let row = ResultRow::from(&point);
        match verdict {
            Verdict::Approved => self.approved.push(row),
            Verdict::Denied => self.denied.push(row),
        }
        Ok(verdict)
    }

    /// Persist the collected tables and clear them. On failure nothing is
    /// cleared, so the call can be repeated.
    pub fn flush<S>(&mut self, sink: &mut S) -> Result<ScanOutcome, PersistError>
    where
        S: ResultSink + ?Sized,
    {
        let scan = self.pending.clone().unwrap_or_else(|| "scan".to_string());
        let output = match sink.persist(&scan, &self.approved, &self.denied) {
            Ok(output) => output,
            Err(e) => {
                log::error!("Saving results of {scan} failed: {e}");
                return Err(e);
            }
        };

        self.pending = None;
        Ok(ScanOutcome {
            approved: std::mem::take(&mut self.approved),
            denied: std::mem::take(&mut self.denied),
            reviewed: std::mem::take(&mut self.reviewed),
            output,
        })
    }
}
