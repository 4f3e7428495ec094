//! tabsweep-classifiers: train, evaluate and compare multi-class tabular
//! classifiers across dataset variants.
//!
//! A sweep runs every (dataset, model kind) combination in isolation:
//! rare classes are filtered out, rows are split into train and test
//! partitions, a fresh classifier is fitted, and its predictions are scored
//! against the full label space of the working dataset. Successful runs are
//! aggregated into an `ExperimentTable`; failed runs are logged and listed
//! separately.
//!
//! Plots are produced through the `ArtifactSink` trait so the metric code
//! stays free of side effects.
pub mod config;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod math;
pub mod models;
pub mod partition;
pub mod report;
pub mod runner;

pub use error::{Result, SweepError};
