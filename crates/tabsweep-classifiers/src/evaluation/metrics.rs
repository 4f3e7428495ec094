//! Pure multi-class metric functions.
//!
//! Label-level metrics are derived from a `ConfusionMatrix` over the full
//! label space. Ranking metrics (ROC-AUC, average precision) use a
//! one-vs-rest decomposition of an aligned probability matrix.
use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{Result, SweepError};
use crate::math::Array2;

/// Row-major confusion matrix: entry `(i, j)` counts rows whose true class is
/// `i` and predicted class is `j`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub n_classes: usize,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build a matrix spanning `n_classes`, whether or not every class
    /// occurs in `actual` or `predicted`.
    pub fn from_labels(actual: &[usize], predicted: &[usize], n_classes: usize) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(SweepError::Data(format!(
                "actual length {} != predicted length {}",
                actual.len(),
                predicted.len()
            )));
        }
        let mut counts = vec![vec![0usize; n_classes]; n_classes];
        for (&a, &p) in actual.iter().zip(predicted) {
            if a >= n_classes || p >= n_classes {
                return Err(SweepError::Data(format!(
                    "label pair ({}, {}) outside a label space of {} classes",
                    a, p, n_classes
                )));
            }
            counts[a][p] += 1;
        }
        Ok(Self { n_classes, counts })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts[class][class]
    }

    /// Rows whose true class is `class`.
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Rows predicted as `class`.
    pub fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.n_classes).map(|c| self.true_positives(c)).sum();
        correct as f64 / total as f64
    }

    /// Precision of one class; 0 when nothing was predicted as that class.
    pub fn precision(&self, class: usize) -> f64 {
        safe_div(self.true_positives(class), self.predicted(class))
    }

    /// Recall of one class; 0 when the class has no support.
    pub fn recall(&self, class: usize) -> f64 {
        safe_div(self.true_positives(class), self.support(class))
    }

    pub fn f1(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Classes that occur either as a true or as a predicted label.
    pub fn active_classes(&self) -> Vec<usize> {
        (0..self.n_classes)
            .filter(|&c| self.support(c) > 0 || self.predicted(c) > 0)
            .collect()
    }
}

fn safe_div(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Label-level summary metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
}

/// Accuracy, macro/weighted F1 and macro precision/recall.
///
/// Macro averages run over the classes present in the true or predicted
/// labels; weighted F1 is weighted by true-class support.
pub fn label_metrics(cm: &ConfusionMatrix) -> LabelMetrics {
    let active = cm.active_classes();
    let mean = |f: &dyn Fn(usize) -> f64| {
        if active.is_empty() {
            0.0
        } else {
            active.iter().map(|&c| f(c)).sum::<f64>() / active.len() as f64
        }
    };

    let total_support: usize = (0..cm.n_classes).map(|c| cm.support(c)).sum();
    let weighted_f1 = if total_support == 0 {
        0.0
    } else {
        (0..cm.n_classes)
            .map(|c| cm.f1(c) * cm.support(c) as f64)
            .sum::<f64>()
            / total_support as f64
    };

    LabelMetrics {
        accuracy: cm.accuracy(),
        macro_f1: mean(&|c| cm.f1(c)),
        weighted_f1,
        macro_precision: mean(&|c| cm.precision(c)),
        macro_recall: mean(&|c| cm.recall(c)),
    }
}

/// Indices that sort `scores` in descending order.
fn descending_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order
}

/// Binary ROC-AUC with average ranks for tied scores.
///
/// Returns `None` when `labels` has no positives or no negatives.
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let n = scores.len();
    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let order = descending_order(scores);
    let mut rank_sum_pos = 0.0f64;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            if labels[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j;
    }

    // Ranks were assigned in descending order; convert to ascending ranks.
    let n_pos_f = n_pos as f64;
    let n_neg_f = n_neg as f64;
    let sum_ascending_ranks = n_pos_f * (n as f64 + 1.0) - rank_sum_pos;
    Some((sum_ascending_ranks - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg_f))
}

/// Step-wise average precision (area under the precision-recall curve).
///
/// Returns `None` when `labels` has no positives.
pub fn average_precision(scores: &[f64], labels: &[bool]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&l| l).count();
    if n_pos == 0 {
        return None;
    }

    let order = descending_order(scores);
    let n = scores.len();
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && scores[order[j]] == scores[order[i]] {
            if labels[order[j]] {
                tp += 1;
            } else {
                fp += 1;
            }
            j += 1;
        }
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
        i = j;
    }
    Some(ap)
}

/// Macro one-vs-rest average of a binary ranking metric.
///
/// Only classes present in the fold are averaged. Fewer than two present
/// classes leaves the metric undefined.
fn ovr_macro(
    y_true: &Array2<f64>,
    proba: &Array2<f64>,
    name: &str,
    metric: fn(&[f64], &[bool]) -> Option<f64>,
) -> Result<f64> {
    if y_true.shape() != proba.shape() {
        return Err(SweepError::MetricComputation(format!(
            "{}: label matrix {:?} and probability matrix {:?} differ in shape",
            name,
            y_true.shape(),
            proba.shape()
        )));
    }

    let mut values = Vec::new();
    for class in 0..y_true.ncols() {
        let labels: Vec<bool> = y_true.column(class).into_iter().map(|v| v > 0.5).collect();
        let n_pos = labels.iter().filter(|&&l| l).count();
        if n_pos == 0 {
            continue;
        }
        if n_pos == labels.len() {
            return Err(SweepError::MetricComputation(format!(
                "{} is undefined: only one class present in the test fold",
                name
            )));
        }
        if let Some(v) = metric(&proba.column(class), &labels) {
            values.push(v);
        }
    }

    if values.len() < 2 {
        return Err(SweepError::MetricComputation(format!(
            "{} is undefined: fewer than two classes present in the test fold",
            name
        )));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Macro ROC-AUC over a one-hot label matrix and aligned probabilities.
pub fn ovr_macro_auc(y_true: &Array2<f64>, proba: &Array2<f64>) -> Result<f64> {
    ovr_macro(y_true, proba, "macro AUC", roc_auc)
}

/// Macro PR-AUC (average precision) over a one-hot label matrix and aligned
/// probabilities.
pub fn ovr_macro_pr_auc(y_true: &Array2<f64>, proba: &Array2<f64>) -> Result<f64> {
    ovr_macro(y_true, proba, "macro PR-AUC", average_precision)
}
