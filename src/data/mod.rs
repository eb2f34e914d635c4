/// Data layer: registry, backing-file decoding, resolution and statistics.
///
/// Architecture:
/// ```text
///   Registry  dataset → group → GroupSpec { file, feature table }
///        │
///        ▼
///   ┌──────────┐
///   │ resolver  │  pick group + effective features, open one file
///   └──────────┘
///        │  .pkl ──► loader::read_record
///        │  .npz ──► loader::NpzArchive
///        ▼
///   ┌──────────────┐
///   │  FeatureMap   │  name → FeatureValue, plus diagnostics
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  stats    │  category counts, scatter series
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod stats;

#[cfg(test)]
pub mod testutil;
