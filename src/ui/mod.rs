/// Operator-facing text output: plots of a point and the terminal reviewer.
///
/// ```text
///   Prompt + PointContext ──▶ TerminalReviewer ──▶ plot::render ──▶ stdout
///                                   ▲
///                                 stdin (one answer per line)
/// ```
pub mod plot;
pub mod terminal;
