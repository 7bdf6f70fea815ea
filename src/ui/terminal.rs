use std::error::Error as _;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use super::plot::{Series, render};
use crate::data::filter::ShiftWindow;
use crate::error::PersistError;
use crate::review::context::PointContext;
use crate::review::{Prompt, Reviewer, View};
use crate::scan::orchestrator::{ScanOrchestrator, ScanOutcome};
use crate::scan::results::CsvResultStore;

const PLOT_WIDTH: usize = 72;
const PLOT_HEIGHT: usize = 14;

// ---------------------------------------------------------------------------
// Line-oriented reviewer
// ---------------------------------------------------------------------------

/// Shows each prompt with a text plot of the point and reads one answer per
/// line.
pub struct TerminalReviewer<I, O> {
    input: I,
    output: O,
}

impl TerminalReviewer<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        TerminalReviewer::new(io::stdin().lock(), io::stdout())
    }
}

impl<I: BufRead, O: Write> TerminalReviewer<I, O> {
    pub fn new(input: I, output: O) -> Self {
        TerminalReviewer { input, output }
    }

    pub fn into_output(self) -> O {
        self.output
    }

    fn show(&mut self, prompt: &Prompt, point: &PointContext) -> io::Result<()> {
        if !prompt.invalid {
            let picture = draw(prompt.view, point);
            self.output.write_all(picture.as_bytes())?;
            writeln!(self.output, "{}", point.summary())?;
        }
        write!(self.output, "\n{prompt} ")?;
        self.output.flush()
    }

    /// One trimmed line; `None` at end of input or on a read error.
    fn read_answer(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end().to_string()),
            Err(e) => {
                log::error!("Reading answer failed: {e}");
                None
            }
        }
    }

    /// Ask what to do after saving the result tables failed. End of input
    /// gives up.
    pub fn ask_save_retry(&mut self, error: &PersistError) -> SaveRetry {
        let mut message = format!("Saving results failed: {error}");
        if let Some(source) = error.source() {
            message.push_str(&format!(": {source}"));
        }
        let shown = writeln!(self.output, "\n{message}").and_then(|_| {
            write!(
                self.output,
                "Retry? (Y to retry, N to give up, or a new results directory): "
            )?;
            self.output.flush()
        });
        if let Err(e) = shown {
            log::error!("Writing save prompt failed: {e}");
            return SaveRetry::GiveUp;
        }
        match self.read_answer() {
            None => SaveRetry::GiveUp,
            Some(answer) => SaveRetry::parse(&answer),
        }
    }

    /// Retry [`ScanOrchestrator::flush`] until it succeeds or the operator
    /// gives up. The tables stay in `orchestrator` until a save succeeds.
    pub fn recover_results(
        &mut self,
        orchestrator: &mut ScanOrchestrator,
        mut root: PathBuf,
        mut error: PersistError,
    ) -> Result<ScanOutcome, PersistError> {
        loop {
            match self.ask_save_retry(&error) {
                SaveRetry::GiveUp => return Err(error),
                SaveRetry::Same => {}
                SaveRetry::Elsewhere(new_root) => root = new_root,
            }
            log::info!("Retrying save under {}", root.display());
            let mut store =
                CsvResultStore::new(&root, orchestrator.settings().mineral_name.clone());
            match orchestrator.flush(&mut store) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => error = e,
            }
        }
    }
}

/// Operator's answer to a failed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveRetry {
    /// Try the same results root again.
    Same,
    /// Try a different results root.
    Elsewhere(PathBuf),
    GiveUp,
}

impl SaveRetry {
    /// Empty or `Y` retries, `N` gives up, anything else is a directory.
    pub fn parse(answer: &str) -> Self {
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("y") {
            SaveRetry::Same
        } else if answer.eq_ignore_ascii_case("n") {
            SaveRetry::GiveUp
        } else {
            SaveRetry::Elsewhere(PathBuf::from(answer))
        }
    }
}

impl<I: BufRead, O: Write> Reviewer for TerminalReviewer<I, O> {
    fn ask(&mut self, prompt: &Prompt, point: &PointContext) -> Option<String> {
        if let Err(e) = self.show(prompt, point) {
            log::error!("Writing review prompt failed: {e}");
            return None;
        }
        self.read_answer()
    }
}

/// Text picture for one view of the point.
fn draw(view: View, point: &PointContext) -> String {
    let x = &point.raman_shift;
    match view {
        View::Overview | View::PeakFit => {
            let model: Vec<f64> = x
                .iter()
                .map(|&xi| point.peak.eval(xi) + point.other.map_or(0.0, |o| o.eval(xi)))
                .collect();
            render(
                x,
                &[
                    Series { y: &point.residual, glyph: '.' },
                    Series { y: &model, glyph: '*' },
                ],
                point.fit_window(),
                &[point.peak.center],
                PLOT_WIDTH,
                PLOT_HEIGHT,
            )
        }
        View::Baseline => {
            let (Some(&first), Some(&last)) = (x.first(), x.last()) else {
                return String::new();
            };
            render(
                x,
                &[
                    Series { y: &point.corrected, glyph: '.' },
                    Series { y: &point.baseline, glyph: '_' },
                ],
                ShiftWindow::new(first - 1.0, last + 1.0),
                &[],
                PLOT_WIDTH,
                PLOT_HEIGHT,
            )
        }
        View::CosmicRay => {
            let markers: Vec<f64> = [point.cosmic.lower, point.cosmic.upper]
                .iter()
                .filter_map(|&i| x.get(i).copied())
                .collect();
            render(
                x,
                &[Series { y: &point.corrected, glyph: '.' }],
                point.display,
                &markers,
                PLOT_WIDTH,
                PLOT_HEIGHT,
            )
        }
    }
}
