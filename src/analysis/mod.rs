/// Numeric core: everything that turns one raw trace into a verdict.
///
/// Architecture:
/// ```text
///   raw trace ── stowed-arm reference
///        │
///        ▼
///   ┌────────────┐
///   │ preprocess  │  subtract reference, remove baseline
///   └────────────┘
///        │ residual
///        ▼
///   ┌────────────┐      ┌──────┐
///   │  peak_fit   │ ───▶ │  lm   │  Levenberg–Marquardt
///   └────────────┘      └──────┘
///        │ amplitude, center, FWHM, R²
///        ▼
///   ┌────────────┐
///   │   noise     │  SNR vs. reference, SNR vs. silent region
///   └────────────┘
///        │
///        ▼
///   ┌────────────┐
///   │  verdict    │  decide / needs_review
///   └────────────┘
/// ```

pub mod lm;
pub mod noise;
pub mod peak_fit;
pub mod preprocess;
pub mod verdict;
