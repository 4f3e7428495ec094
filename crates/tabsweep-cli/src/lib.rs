//! CLI helpers for tabsweep: argument definitions, configuration overrides
//! and the single-run and sweep entry points.
pub mod cli;
pub mod experiments;
pub mod util;
