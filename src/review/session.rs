use super::context::{PointContext, Side};
use super::{Answer, Expect, Prompt, Reviewer, View};
use crate::analysis::peak_fit::{GaussianParams, Parameter};
use crate::analysis::verdict::Verdict;
use crate::data::filter::ShiftWindow;
use crate::error::{PipelineError, ReviewError};

const MENU_KEYS: &[char] = &['B', 'C', 'P', 'T', 'A', 'D'];
const YES_NO: &[char] = &['Y', 'N'];
const COSMIC_KEYS: &[char] = &['A', 'R', 'M', 'E'];
const FIT_KEYS: &[char] = &['A', 'M', 'E'];
const PARAMETER_KEYS: &[char] = &['H', 'M', 'S'];
const SIDE_KEYS: &[char] = &['L', 'R'];

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Where the session is; every stage waits for exactly one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    /// Hub: pick a correction or give the verdict.
    Menu,
    Baseline(BaselineStep),
    CosmicRay(CosmicStep),
    PeakFit(FitStep),
    DoublePeakFit(DoubleStep),
    /// Terminal; releases the point.
    Resolved(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BaselineStep {
    Sampling,
    Smoothing,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CosmicStep {
    Choose,
    RangeLow,
    RangeHigh { low: f64 },
    BoundLow,
    BoundHigh { low: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitStep {
    Choose,
    Parameter,
    Value(Parameter),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoubleStep {
    OtherCenter,
    Choose,
    Side,
    Parameter(Side),
    Value(Side, Parameter),
}

/// Fit parameters captured when a fit editor is entered; restored on exit.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    peak: GaussianParams,
    peak_errors: Option<GaussianParams>,
    other: Option<GaussianParams>,
}

fn parameter_for(key: char) -> Parameter {
    match key {
        'H' => Parameter::Amplitude,
        'M' => Parameter::Center,
        _ => Parameter::Sigma,
    }
}

fn side_for(key: char) -> Side {
    if key == 'L' { Side::Left } else { Side::Right }
}

// ---------------------------------------------------------------------------
// ReviewSession
// ---------------------------------------------------------------------------

/// Interactive correction loop for one point.
///
/// Drive it with [`ReviewSession::prompt`] / [`ReviewSession::submit`], or
/// hand it a [`Reviewer`] with [`ReviewSession::run`].
#[derive(Debug)]
pub struct ReviewSession {
    point: PointContext,
    stage: Stage,
    invalid: bool,
    snapshot: Option<Snapshot>,
}

impl ReviewSession {
    pub fn new(point: PointContext) -> Self {
        ReviewSession {
            point,
            stage: Stage::Menu,
            invalid: false,
            snapshot: None,
        }
    }

    pub fn point(&self) -> &PointContext {
        &self.point
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The final verdict, once given.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.stage {
            Stage::Resolved(verdict) => Some(verdict),
            _ => None,
        }
    }

    /// The question for the current stage; `None` once resolved.
    pub fn prompt(&self) -> Option<Prompt> {
        let (text, expect) = match self.stage {
            Stage::Resolved(_) => return None,
            Stage::Menu => (
                "(B)aseline\n(C)osmic rays\n(P)eak fit\n(T)wo-peak fit\n(A)pprove\n(D)eny:",
                Expect::Choice(MENU_KEYS),
            ),
            Stage::Baseline(BaselineStep::Sampling) => ("Sampling:", Expect::Count),
            Stage::Baseline(BaselineStep::Smoothing) => ("Smoothing:", Expect::Count),
            Stage::Baseline(BaselineStep::Confirm) => {
                ("Approve baseline? (Y/N):", Expect::Choice(YES_NO))
            }
            Stage::CosmicRay(CosmicStep::Choose) => (
                "(A)pprove\n(R)ange\n(M)odify\n(E)xit:",
                Expect::Choice(COSMIC_KEYS),
            ),
            Stage::CosmicRay(CosmicStep::RangeLow) => ("Lower Range:", Expect::Number),
            Stage::CosmicRay(CosmicStep::RangeHigh { .. }) => ("Upper Range:", Expect::Number),
            Stage::CosmicRay(CosmicStep::BoundLow) => ("Cosmic Lower:", Expect::Number),
            Stage::CosmicRay(CosmicStep::BoundHigh { .. }) => ("Cosmic Upper:", Expect::Number),
            Stage::PeakFit(FitStep::Choose) | Stage::DoublePeakFit(DoubleStep::Choose) => {
                ("(A)pprove\n(M)odify\n(E)xit:", Expect::Choice(FIT_KEYS))
            }
            Stage::PeakFit(FitStep::Parameter) | Stage::DoublePeakFit(DoubleStep::Parameter(_)) => {
                ("(H)eight\n(M)ean\n(S)igma:", Expect::Choice(PARAMETER_KEYS))
            }
            Stage::PeakFit(FitStep::Value(_)) | Stage::DoublePeakFit(DoubleStep::Value(..)) => {
                ("Value:", Expect::Number)
            }
            Stage::DoublePeakFit(DoubleStep::OtherCenter) => ("Other peak center:", Expect::Number),
            Stage::DoublePeakFit(DoubleStep::Side) => {
                ("(L)eft\n(R)ight:", Expect::Choice(SIDE_KEYS))
            }
        };
        let view = match self.stage {
            Stage::Baseline(_) => View::Baseline,
            Stage::CosmicRay(_) => View::CosmicRay,
            Stage::PeakFit(_) | Stage::DoublePeakFit(_) => View::PeakFit,
            Stage::Menu | Stage::Resolved(_) => View::Overview,
        };
        Some(Prompt {
            text: text.to_string(),
            expect,
            view,
            invalid: self.invalid,
        })
    }

    /// Feed one raw answer. Input that does not fit the prompt is rejected
    /// and the same prompt is asked again with `invalid` set.
    pub fn submit(&mut self, input: &str) -> Result<(), PipelineError> {
        let Some(prompt) = self.prompt() else {
            return Ok(());
        };
        let Some(answer) = prompt.expect.parse(input) else {
            log::warn!(
                "point {}: rejected answer {input:?} at {:?}",
                self.point.index,
                self.stage
            );
            self.invalid = true;
            return Ok(());
        };
        self.invalid = false;
        self.stage = self.advance(answer)?;
        if let Stage::Resolved(verdict) = self.stage {
            log::info!("point {}: operator {verdict}", self.point.index);
        }
        Ok(())
    }

    /// Ask `reviewer` until a verdict is given, then hand the point back.
    pub fn run<R>(mut self, reviewer: &mut R) -> Result<(Verdict, PointContext), ReviewError>
    where
        R: Reviewer + ?Sized,
    {
        loop {
            if let Stage::Resolved(verdict) = self.stage {
                return Ok((verdict, self.point));
            }
            let Some(prompt) = self.prompt() else {
                continue;
            };
            let input = reviewer
                .ask(&prompt, &self.point)
                .ok_or(ReviewError::Abandoned)?;
            self.submit(&input)?;
        }
    }

    fn take_snapshot(&mut self) {
        self.snapshot = Some(Snapshot {
            peak: self.point.peak,
            peak_errors: self.point.peak_errors,
            other: self.point.other,
        });
    }

    fn restore_snapshot(&mut self) -> Result<(), PipelineError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.point.peak = snapshot.peak;
            self.point.peak_errors = snapshot.peak_errors;
            self.point.other = snapshot.other;
        }
        self.point.recompute_metrics()
    }

    fn advance(&mut self, answer: Answer) -> Result<Stage, PipelineError> {
        use Answer::{Choice, Count, Number};

        let next = match (self.stage, answer) {
            // Menu
            (Stage::Menu, Choice('B')) => Stage::Baseline(BaselineStep::Sampling),
            (Stage::Menu, Choice('C')) => Stage::CosmicRay(CosmicStep::Choose),
            (Stage::Menu, Choice('P')) => {
                self.take_snapshot();
                Stage::PeakFit(FitStep::Choose)
            }
            (Stage::Menu, Choice('T')) => {
                self.take_snapshot();
                if self.point.other.is_some() {
                    Stage::DoublePeakFit(DoubleStep::Choose)
                } else {
                    Stage::DoublePeakFit(DoubleStep::OtherCenter)
                }
            }
            (Stage::Menu, Choice('A')) => Stage::Resolved(Verdict::Approved),
            (Stage::Menu, Choice('D')) => Stage::Resolved(Verdict::Denied),

            // Baseline
            (Stage::Baseline(BaselineStep::Sampling), Count(n)) => {
                self.point.sampling = n;
                Stage::Baseline(BaselineStep::Smoothing)
            }
            (Stage::Baseline(BaselineStep::Smoothing), Count(n)) => {
                self.point.smoothing = n;
                self.point.rebaseline()?;
                self.point.refit()?;
                Stage::Baseline(BaselineStep::Confirm)
            }
            (Stage::Baseline(BaselineStep::Confirm), Choice('Y')) => Stage::Menu,
            (Stage::Baseline(BaselineStep::Confirm), Choice(_)) => {
                Stage::Baseline(BaselineStep::Sampling)
            }

            // Cosmic rays
            (Stage::CosmicRay(CosmicStep::Choose), Choice('A')) => {
                self.point.apply_cosmic_patch()?;
                Stage::Menu
            }
            (Stage::CosmicRay(CosmicStep::Choose), Choice('R')) => {
                Stage::CosmicRay(CosmicStep::RangeLow)
            }
            (Stage::CosmicRay(CosmicStep::Choose), Choice('M')) => {
                Stage::CosmicRay(CosmicStep::BoundLow)
            }
            (Stage::CosmicRay(CosmicStep::Choose), Choice(_)) => Stage::Menu,
            (Stage::CosmicRay(CosmicStep::RangeLow), Number(low)) => {
                Stage::CosmicRay(CosmicStep::RangeHigh { low })
            }
            (Stage::CosmicRay(CosmicStep::RangeHigh { low }), Number(high)) => {
                self.point.display = ShiftWindow::new(low.min(high), low.max(high));
                Stage::CosmicRay(CosmicStep::Choose)
            }
            (Stage::CosmicRay(CosmicStep::BoundLow), Number(low)) => {
                Stage::CosmicRay(CosmicStep::BoundHigh { low })
            }
            (Stage::CosmicRay(CosmicStep::BoundHigh { low }), Number(high)) => {
                self.point.set_cosmic_bounds(low, high);
                Stage::CosmicRay(CosmicStep::Choose)
            }

            // Single peak
            (Stage::PeakFit(FitStep::Choose), Choice('A')) => {
                self.snapshot = None;
                Stage::Menu
            }
            (Stage::PeakFit(FitStep::Choose), Choice('M')) => Stage::PeakFit(FitStep::Parameter),
            (Stage::PeakFit(FitStep::Choose), Choice(_)) => {
                self.restore_snapshot()?;
                Stage::Menu
            }
            (Stage::PeakFit(FitStep::Parameter), Choice(key)) => {
                Stage::PeakFit(FitStep::Value(parameter_for(key)))
            }
            (Stage::PeakFit(FitStep::Value(parameter)), Number(value)) => {
                self.point.peak.set(parameter, value);
                self.point.peak_errors = None;
                self.point.recompute_metrics()?;
                Stage::PeakFit(FitStep::Choose)
            }

            // Two peaks
            (Stage::DoublePeakFit(DoubleStep::OtherCenter), Number(center)) => {
                self.point.fit_two_peaks(center)?;
                Stage::DoublePeakFit(DoubleStep::Choose)
            }
            (Stage::DoublePeakFit(DoubleStep::Choose), Choice('A')) => {
                self.snapshot = None;
                Stage::Menu
            }
            (Stage::DoublePeakFit(DoubleStep::Choose), Choice('M')) => {
                Stage::DoublePeakFit(DoubleStep::Side)
            }
            (Stage::DoublePeakFit(DoubleStep::Choose), Choice(_)) => {
                self.restore_snapshot()?;
                Stage::Menu
            }
            (Stage::DoublePeakFit(DoubleStep::Side), Choice(key)) => {
                Stage::DoublePeakFit(DoubleStep::Parameter(side_for(key)))
            }
            (Stage::DoublePeakFit(DoubleStep::Parameter(side)), Choice(key)) => {
                Stage::DoublePeakFit(DoubleStep::Value(side, parameter_for(key)))
            }
            (Stage::DoublePeakFit(DoubleStep::Value(side, parameter)), Number(value)) => {
                self.point.component_mut(side).set(parameter, value);
                self.point.peak_errors = None;
                self.point.recompute_metrics()?;
                Stage::DoublePeakFit(DoubleStep::Choose)
            }

            // The prompt only admits answers of the expected kind.
            (stage, _) => stage,
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::ScriptedReviewer;
    use crate::review::context::tests::context;

    fn feed(session: &mut ReviewSession, answers: &[&str]) {
        for answer in answers {
            session.submit(answer).unwrap();
        }
    }

    #[test]
    fn menu_verdicts_are_terminal() {
        let mut session = ReviewSession::new(context(120.0, false));
        feed(&mut session, &["a"]);
        assert_eq!(session.verdict(), Some(Verdict::Approved));
        assert!(session.prompt().is_none());

        feed(&mut session, &["d"]);
        assert_eq!(session.verdict(), Some(Verdict::Approved));
    }

    #[test]
    fn invalid_input_reprompts_without_changing_state() {
        let mut session = ReviewSession::new(context(120.0, false));
        let before = session.point().metrics;

        feed(&mut session, &["x"]);
        assert_eq!(session.stage(), Stage::Menu);
        assert!(session.prompt().unwrap().invalid);

        feed(&mut session, &["B", "0"]);
        assert_eq!(session.stage(), Stage::Baseline(BaselineStep::Sampling));
        assert!(session.prompt().unwrap().invalid);

        feed(&mut session, &["abc", "-4"]);
        assert_eq!(session.stage(), Stage::Baseline(BaselineStep::Sampling));
        assert_eq!(session.point().metrics, before);

        feed(&mut session, &["20"]);
        assert!(!session.prompt().unwrap().invalid);
        assert_eq!(session.stage(), Stage::Baseline(BaselineStep::Smoothing));
    }

    #[test]
    fn baseline_loop_until_approved() {
        let mut session = ReviewSession::new(context(120.0, false));
        feed(&mut session, &["B", "30", "4"]);
        assert_eq!(session.stage(), Stage::Baseline(BaselineStep::Confirm));
        assert_eq!(session.point().sampling, 30);
        assert_eq!(session.point().smoothing, 4);

        feed(&mut session, &["n"]);
        assert_eq!(session.stage(), Stage::Baseline(BaselineStep::Sampling));

        feed(&mut session, &["25", "3", "y"]);
        assert_eq!(session.stage(), Stage::Menu);
        assert_eq!(session.point().sampling, 25);
        assert!((session.point().peak.center - 1085.0).abs() < 1.0);
    }

    #[test]
    fn peak_fit_exit_rolls_back_to_entry_snapshot() {
        let mut session = ReviewSession::new(context(120.0, false));
        let peak = session.point().peak;
        let errors = session.point().peak_errors;
        let metrics = session.point().metrics;

        feed(&mut session, &["P", "M", "H", "500"]);
        assert_eq!(session.point().peak.amplitude, 500.0);
        assert_ne!(session.point().metrics, metrics);
        assert_eq!(session.stage(), Stage::PeakFit(FitStep::Choose));

        feed(&mut session, &["M", "S", "9"]);
        assert_eq!(session.point().metrics.fwhm, session.point().peak.fwhm());

        feed(&mut session, &["E"]);
        assert_eq!(session.stage(), Stage::Menu);
        assert_eq!(session.point().peak, peak);
        assert_eq!(session.point().peak_errors, errors);
        assert_eq!(session.point().metrics, metrics);
    }

    #[test]
    fn peak_fit_approve_keeps_edits() {
        let mut session = ReviewSession::new(context(120.0, false));
        feed(&mut session, &["P", "M", "M", "1086", "A"]);
        assert_eq!(session.stage(), Stage::Menu);
        assert_eq!(session.point().peak.center, 1086.0);
        assert_eq!(session.point().metrics.center, 1086.0);
        assert!(session.point().peak_errors.is_none());
    }

    #[test]
    fn cosmic_ray_patch_through_the_menu() {
        let mut session = ReviewSession::new(context(120.0, false));
        feed(&mut session, &["C", "R", "1200", "900"]);
        assert_eq!(session.point().display, ShiftWindow::new(900.0, 1200.0));
        assert_eq!(session.stage(), Stage::CosmicRay(CosmicStep::Choose));

        feed(&mut session, &["M", "1510", "1500"]);
        let bounds = session.point().cosmic;
        assert!(bounds.lower < bounds.upper);
        let before = session.point().corrected.clone();

        feed(&mut session, &["A"]);
        assert_eq!(session.stage(), Stage::Menu);
        let after = &session.point().corrected;
        let slope = (before[bounds.lower] - before[bounds.upper])
            / (bounds.lower as f64 - bounds.upper as f64);
        for i in bounds.lower + 1..bounds.upper {
            let expected = before[bounds.lower] + slope * (i - bounds.lower) as f64;
            assert!((after[i] - expected).abs() < 1e-9, "sample {i}");
        }
        for i in (0..=bounds.lower).chain(bounds.upper..before.len()) {
            assert_eq!(after[i], before[i], "sample {i} outside the patch changed");
        }
    }

    #[test]
    fn two_peak_modify_targets_the_chosen_side() {
        let mut session = ReviewSession::new(context(120.0, true));
        let single = session.point().peak;

        feed(&mut session, &["T", "1112"]);
        assert_eq!(session.stage(), Stage::DoublePeakFit(DoubleStep::Choose));
        let other = session.point().other.unwrap();
        assert!(other.center > session.point().peak.center);

        // The neighbour sits right of the expected peak.
        feed(&mut session, &["M", "R", "H", "10"]);
        assert_eq!(session.point().other.unwrap().amplitude, 10.0);
        assert_ne!(session.point().peak.amplitude, 10.0);

        feed(&mut session, &["M", "L", "M", "1086"]);
        assert_eq!(session.point().peak.center, 1086.0);

        feed(&mut session, &["E"]);
        assert_eq!(session.point().other, None);
        assert_eq!(session.point().peak, single);
    }

    #[test]
    fn two_peak_reentry_reuses_the_neighbour() {
        let mut session = ReviewSession::new(context(120.0, true));
        feed(&mut session, &["T", "1112", "A"]);
        let other = session.point().other;
        assert!(other.is_some());

        feed(&mut session, &["T"]);
        assert_eq!(session.stage(), Stage::DoublePeakFit(DoubleStep::Choose));
        assert_eq!(session.point().other, other);
    }

    #[test]
    fn run_drives_a_reviewer_to_a_verdict() {
        let mut reviewer = ScriptedReviewer::new(["P", "A", "nope", "D"]);
        let (verdict, point) = ReviewSession::new(context(120.0, false))
            .run(&mut reviewer)
            .unwrap();
        assert_eq!(verdict, Verdict::Denied);
        assert_eq!(point.index, 0);
        assert_eq!(reviewer.seen.len(), 4);
        assert!(reviewer.seen[3].invalid);
    }

    #[test]
    fn run_reports_an_abandoned_review() {
        let mut reviewer = ScriptedReviewer::new(["B"]);
        let err = ReviewSession::new(context(120.0, false))
            .run(&mut reviewer)
            .unwrap_err();
        assert_eq!(err, ReviewError::Abandoned);
    }
}
