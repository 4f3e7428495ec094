use std::path::PathBuf;

use plotly::layout::{Axis, Layout};
use plotly::{Bar, HeatMap, Plot};

use crate::config::ModelKind;
use crate::error::{Result, SweepError};

/// Identifies the run an artifact belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey {
    pub model: ModelKind,
    pub dataset: String,
}

impl ArtifactKey {
    pub fn new(model: ModelKind, dataset: impl Into<String>) -> Self {
        Self {
            model,
            dataset: dataset.into(),
        }
    }

    pub fn confusion_matrix_stem(&self) -> String {
        format!("confusion_matrix_{}_{}", self.model, self.dataset)
    }

    pub fn feature_importance_stem(&self) -> String {
        format!("feature_importance_{}_{}", self.model, self.dataset)
    }
}

/// Destination for per-run plots.
///
/// Each method returns a reference to the stored artifact. Failures are
/// reported as `SweepError::Artifact` and never abort the run.
pub trait ArtifactSink: Send + Sync {
    fn confusion_matrix(
        &self,
        key: &ArtifactKey,
        labels: &[String],
        matrix: &[Vec<usize>],
    ) -> Result<String>;

    fn feature_importances(
        &self,
        key: &ArtifactKey,
        names: &[String],
        values: &[f64],
    ) -> Result<String>;
}

/// Writes plotly HTML files into a directory.
#[derive(Debug, Clone)]
pub struct PlotlySink {
    out_dir: PathBuf,
}

impl PlotlySink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    fn write(&self, stem: &str, plot: &Plot) -> Result<String> {
        std::fs::create_dir_all(&self.out_dir).map_err(|e| {
            SweepError::Artifact(format!("cannot create {}: {}", self.out_dir.display(), e))
        })?;
        let path = self.out_dir.join(format!("{}.html", stem));
        std::fs::write(&path, plot.to_html())
            .map_err(|e| SweepError::Artifact(format!("cannot write {}: {}", path.display(), e)))?;
        log::debug!("wrote {}", path.display());
        Ok(path.display().to_string())
    }
}

/// Heat map of a confusion matrix; rows are true labels.
pub fn plot_confusion_matrix(labels: &[String], matrix: &[Vec<usize>], title: &str) -> Plot {
    let trace = HeatMap::new(labels.to_vec(), labels.to_vec(), matrix.to_vec());

    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Predicted"))
        .y_axis(Axis::new().title("True"));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(layout);
    plot
}

/// Bar chart of feature importances, largest first.
pub fn plot_feature_importances(names: &[String], values: &[f64], title: &str) -> Plot {
    let mut pairs: Vec<(&String, f64)> = names.iter().zip(values.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (names, values): (Vec<String>, Vec<f64>) =
        pairs.into_iter().map(|(n, v)| (n.clone(), v)).unzip();

    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Feature"))
        .y_axis(Axis::new().title("Importance"));

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(names, values).name("Importance"));
    plot.set_layout(layout);
    plot
}

impl ArtifactSink for PlotlySink {
    fn confusion_matrix(
        &self,
        key: &ArtifactKey,
        labels: &[String],
        matrix: &[Vec<usize>],
    ) -> Result<String> {
        if matrix.len() != labels.len() || matrix.iter().any(|row| row.len() != labels.len()) {
            return Err(SweepError::Artifact(format!(
                "confusion matrix does not match its {} labels",
                labels.len()
            )));
        }
        let title = format!("Confusion matrix: {} on {}", key.model, key.dataset);
        self.write(
            &key.confusion_matrix_stem(),
            &plot_confusion_matrix(labels, matrix, &title),
        )
    }

    fn feature_importances(
        &self,
        key: &ArtifactKey,
        names: &[String],
        values: &[f64],
    ) -> Result<String> {
        if names.len() != values.len() {
            return Err(SweepError::Artifact(format!(
                "{} feature names for {} importances",
                names.len(),
                values.len()
            )));
        }
        let title = format!("Feature importance: {} on {}", key.model, key.dataset);
        self.write(
            &key.feature_importance_stem(),
            &plot_feature_importances(names, values, &title),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn artifact_names_are_deterministic() {
        let key = ArtifactKey::new(ModelKind::HistGb, "cohort_a");
        assert_eq!(key.confusion_matrix_stem(), "confusion_matrix_histgb_cohort_a");
        assert_eq!(key.feature_importance_stem(), "feature_importance_histgb_cohort_a");
    }

    #[test]
    fn plotly_sink_writes_html_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PlotlySink::new(dir.path().join("plots"));
        let key = ArtifactKey::new(ModelKind::Gbdt, "d1");
        let labels = vec!["A".to_string(), "B".to_string()];

        let cm = sink
            .confusion_matrix(&key, &labels, &[vec![3, 1], vec![0, 2]])
            .unwrap();
        assert!(cm.ends_with("confusion_matrix_gbdt_d1.html"));
        assert!(Path::new(&cm).exists());

        let fi = sink
            .feature_importances(&key, &labels, &[0.2, 0.8])
            .unwrap();
        assert!(Path::new(&fi).exists());
    }

    #[test]
    fn malformed_matrix_is_an_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = PlotlySink::new(dir.path());
        let key = ArtifactKey::new(ModelKind::Gbdt, "d1");
        let labels = vec!["A".to_string(), "B".to_string()];
        assert!(matches!(
            sink.confusion_matrix(&key, &labels, &[vec![1, 2]]),
            Err(SweepError::Artifact(_))
        ));
    }
}
