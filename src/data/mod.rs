/// Data layer: scan types, loading, and spectral windows.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet      Noise/<id>.csv
///        │                            │
///        ▼                            ▼
///   ┌──────────┐              ┌────────────────┐
///   │  loader   │  → Scan      │ NoiseReference  │  per-sample median
///   └──────────┘              └────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  shift windows → sample indices
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
