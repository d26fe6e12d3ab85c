//! Data layer: core types, alignment, statistics and filtering.
//!
//! Architecture:
//! ```text
//!  .parquet / .json / .csv
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Vec<SampleFeatures>
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ matching  │  greedy alignment under RT / m/z tolerances
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │ FeatureTable  │  ordered rows, frozen behind an Arc
//!   └──────────────┘
//!        │                     │
//!        ▼                     ▼
//!   ┌──────────┐         ┌──────────┐
//!   │  filter   │         │  stats    │  log-ratio RT/MZ view
//!   └──────────┘         └──────────┘
//! ```

pub mod filter;
pub mod loader;
pub mod matching;
pub mod model;
pub mod stats;
pub mod tolerance;
