use serde::Serialize;

use crate::data_handling::LabelSpace;
use crate::error::{Result, SweepError};
use crate::evaluation::alignment::{align_probabilities, one_hot};
use crate::evaluation::metrics::{label_metrics, ovr_macro_auc, ovr_macro_pr_auc, ConfusionMatrix};
use crate::math::Array2;
use crate::models::Classifier;

/// Metrics of one trained classifier on one test fold.
#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    /// Label space the confusion matrix and probabilities are expressed in.
    pub labels: Vec<String>,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    /// `None` when the fold holds fewer than two classes.
    pub macro_auc: Option<f64>,
    pub macro_pr_auc: Option<f64>,
    /// Names of metrics that could not be computed for this fold.
    pub undefined_metrics: Vec<String>,
    pub confusion_matrix: ConfusionMatrix,
    /// `(feature name, importance)` pairs when the backend exposes them.
    pub feature_importances: Option<Vec<(String, f64)>>,
}

/// Errors that do not drop the run become `None`; the rest propagate.
fn optional_metric(
    name: &str,
    value: Result<f64>,
    undefined: &mut Vec<String>,
) -> Result<Option<f64>> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(e) if !e.is_fatal_to_run() => {
            log::warn!("{} undefined: {}", name, e);
            undefined.push(name.to_string());
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Score a trained classifier on a test fold.
///
/// Class probabilities are re-expressed in the full `label_space` order
/// before ranking metrics are computed, so classes the classifier never saw
/// during training contribute zero-probability columns.
pub fn evaluate(
    classifier: &dyn Classifier,
    test_x: &Array2<f32>,
    test_y: &[usize],
    label_space: &LabelSpace,
    feature_names: &[String],
) -> Result<MetricReport> {
    if test_x.nrows() != test_y.len() {
        return Err(SweepError::Data(format!(
            "test matrix has {} rows but {} labels were given",
            test_x.nrows(),
            test_y.len()
        )));
    }
    let n_labels = label_space.len();

    let predicted = classifier.predict(test_x)?;
    let confusion_matrix = ConfusionMatrix::from_labels(test_y, &predicted, n_labels)?;
    let summary = label_metrics(&confusion_matrix);

    let proba = classifier.predict_proba(test_x)?;
    let aligned = align_probabilities(&proba, classifier.classes(), n_labels)?;
    let y_onehot = one_hot(test_y, n_labels)?;

    let mut undefined_metrics = Vec::new();
    let macro_auc = optional_metric(
        "macro_auc",
        ovr_macro_auc(&y_onehot, &aligned),
        &mut undefined_metrics,
    )?;
    let macro_pr_auc = optional_metric(
        "macro_pr_auc",
        ovr_macro_pr_auc(&y_onehot, &aligned),
        &mut undefined_metrics,
    )?;

    let feature_importances = classifier.feature_importances().and_then(|values| {
        if values.len() == feature_names.len() {
            Some(feature_names.iter().cloned().zip(values).collect())
        } else {
            log::warn!(
                "{} reported {} importances for {} features; ignoring them",
                classifier.name(),
                values.len(),
                feature_names.len()
            );
            None
        }
    });

    Ok(MetricReport {
        labels: label_space.labels().to_vec(),
        accuracy: summary.accuracy,
        macro_f1: summary.macro_f1,
        weighted_f1: summary.weighted_f1,
        macro_precision: summary.macro_precision,
        macro_recall: summary.macro_recall,
        macro_auc,
        macro_pr_auc,
        undefined_metrics,
        confusion_matrix,
        feature_importances,
    })
}
