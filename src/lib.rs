//! Feature loading for dialect survey datasets.
//!
//! A [`Registry`](data::registry::Registry) names every dataset, its groups
//! and the backing file of each group; the
//! [`FeatureResolver`](data::resolver::FeatureResolver) turns a
//! `(dataset, group, features)` request into loaded values.

pub mod data;
