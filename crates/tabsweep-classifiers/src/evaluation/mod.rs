//! Metric computation for fitted classifiers.
//!
//! `alignment` maps backend probability matrices onto the full label space,
//! `metrics` holds the pure metric functions and `evaluator` ties both to a
//! `Classifier` and produces a `MetricReport`.
pub mod alignment;
pub mod evaluator;
pub mod metrics;

pub use evaluator::{evaluate, MetricReport};
pub use metrics::ConfusionMatrix;
