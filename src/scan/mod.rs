/// Scan driver: per-point pipeline, review hand-off and result tables.
///
/// Architecture:
/// ```text
///   Scan + NoiseReference
///        │  point by point
///        ▼
///   ┌──────────────┐  needs_review   ┌────────────┐
///   │ orchestrator  │ ─────────────▶ │ ReviewGate  │  blocks until resolved
///   └──────────────┘ ◀───────────── └────────────┘
///        │ approved / denied rows
///        ▼
///   ┌──────────────┐
///   │   results     │  ResultSink → <mineral>/<scan>_<n>/*.csv
///   └──────────────┘
/// ```

pub mod orchestrator;
pub mod results;
