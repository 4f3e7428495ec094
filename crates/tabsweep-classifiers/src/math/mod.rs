//! Small dense containers used throughout the crate.
//!
//! `Array2` is a row-major matrix used for encoded feature tables and
//! probability matrices. It is intentionally tiny and dependency-free so the
//! model backends and metric code can share it without conversions.
pub mod matrix;

pub use matrix::{Array2, ShapeError};
