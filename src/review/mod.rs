/// Operator review: an explicit state machine around one point.
///
/// Architecture:
/// ```text
///   scan thread                         review thread
///   ───────────                         ─────────────
///   PointContext ──── ChannelGate ────▶ ReviewDesk
///        ▲            (request)             │
///        │                                  ▼
///        │                           ReviewSession ◀──▶ Reviewer
///        │                             prompt/submit      (terminal, script)
///        └──── one-shot reply ◀──── Resolved(verdict)
/// ```

pub mod channel;
pub mod context;
pub mod session;

use std::fmt;

use self::context::PointContext;

// ---------------------------------------------------------------------------
// Prompts and answers
// ---------------------------------------------------------------------------

/// What kind of answer a prompt accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// One of the listed keys, case-insensitive.
    Choice(&'static [char]),
    /// A finite, non-negative decimal number.
    Number,
    /// A whole number of at least 1.
    Count,
}

/// A parsed operator answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Answer {
    Choice(char),
    Number(f64),
    Count(usize),
}

impl Expect {
    /// Parse raw input; `None` when it does not fit this prompt.
    pub fn parse(&self, input: &str) -> Option<Answer> {
        let input = input.trim();
        match self {
            Expect::Choice(keys) => {
                let mut chars = input.chars();
                let key = chars.next()?.to_ascii_uppercase();
                if chars.next().is_some() || !keys.contains(&key) {
                    return None;
                }
                Some(Answer::Choice(key))
            }
            Expect::Number => {
                let value: f64 = input.parse().ok()?;
                (value.is_finite() && value >= 0.0).then_some(Answer::Number(value))
            }
            Expect::Count => {
                let value: usize = input.parse().ok()?;
                (value >= 1).then_some(Answer::Count(value))
            }
        }
    }
}

/// Which picture of the point goes with a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Overview,
    Baseline,
    CosmicRay,
    PeakFit,
}

/// One question for the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub expect: Expect,
    pub view: View,
    /// The previous answer was rejected.
    pub invalid: bool,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invalid {
            writeln!(f, "INVALID")?;
        }
        write!(f, "{}", self.text)
    }
}

// ---------------------------------------------------------------------------
// Reviewer – the operator side of the prompt channel
// ---------------------------------------------------------------------------

/// Answers prompts for a point under review.
pub trait Reviewer {
    /// Return the operator's raw answer, or `None` once no further answers
    /// will come (closed input, finished script).
    fn ask(&mut self, prompt: &Prompt, point: &PointContext) -> Option<String>;
}

/// Replays a fixed list of answers. Used by tests and batch re-runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReviewer {
    answers: std::collections::VecDeque<String>,
    /// Every prompt shown, in order.
    pub seen: Vec<Prompt>,
}

impl ScriptedReviewer {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedReviewer {
            answers: answers.into_iter().map(Into::into).collect(),
            seen: Vec::new(),
        }
    }
}

impl Reviewer for ScriptedReviewer {
    fn ask(&mut self, prompt: &Prompt, _point: &PointContext) -> Option<String> {
        self.seen.push(prompt.clone());
        self.answers.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_is_case_insensitive_and_single_key() {
        let expect = Expect::Choice(&['A', 'M', 'E']);
        assert_eq!(expect.parse(" m "), Some(Answer::Choice('M')));
        assert_eq!(expect.parse("E"), Some(Answer::Choice('E')));
        assert_eq!(expect.parse("x"), None);
        assert_eq!(expect.parse("AM"), None);
        assert_eq!(expect.parse(""), None);
    }

    #[test]
    fn numbers_must_be_finite_and_non_negative() {
        assert_eq!(Expect::Number.parse("1085.5"), Some(Answer::Number(1085.5)));
        assert_eq!(Expect::Number.parse("12"), Some(Answer::Number(12.0)));
        assert_eq!(Expect::Number.parse("-3"), None);
        assert_eq!(Expect::Number.parse("inf"), None);
        assert_eq!(Expect::Number.parse("NaN"), None);
        assert_eq!(Expect::Number.parse("abc"), None);
    }

    #[test]
    fn counts_start_at_one() {
        assert_eq!(Expect::Count.parse("15"), Some(Answer::Count(15)));
        assert_eq!(Expect::Count.parse("0"), None);
        assert_eq!(Expect::Count.parse("2.5"), None);
    }
}
