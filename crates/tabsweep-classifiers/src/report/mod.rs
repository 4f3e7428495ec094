pub mod plots;
pub mod summary;

pub use plots::{ArtifactKey, ArtifactSink, PlotlySink};
pub use summary::render_sweep_report;
