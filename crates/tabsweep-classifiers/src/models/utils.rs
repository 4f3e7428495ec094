//! Helpers shared by the classifier backends.
use std::collections::BTreeSet;

use crate::error::{Result, SweepError};
use crate::math::Array2;

/// Validate training inputs and return the observed classes, ascending.
///
/// Every label must be a code below `num_classes`, the size of the label
/// space the classifier was built for.
pub fn check_fit_input(x: &Array2<f32>, y: &[usize], num_classes: usize) -> Result<Vec<usize>> {
    if x.nrows() == 0 {
        return Err(SweepError::Data("cannot fit on an empty training set".into()));
    }
    if x.nrows() != y.len() {
        return Err(SweepError::Data(format!(
            "feature matrix has {} rows but {} labels were given",
            x.nrows(),
            y.len()
        )));
    }
    let classes: Vec<usize> = y.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    if let Some(&largest) = classes.last() {
        if largest >= num_classes {
            return Err(SweepError::Model(format!(
                "label {} is outside a label space of {} classes",
                largest, num_classes
            )));
        }
    }
    Ok(classes)
}

/// Reject feature matrices whose width differs from the training data.
pub fn check_predict_input(x: &Array2<f32>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(SweepError::Model(format!(
            "model was fit on {} features, got {}",
            n_features,
            x.ncols()
        )));
    }
    Ok(())
}

pub fn not_fitted(name: &str) -> SweepError {
    SweepError::Configuration(format!("{} used before fit", name))
}

/// Map each probability row to the class with the highest probability.
/// Ties resolve to the lowest class code.
pub fn argmax_classes(proba: &Array2<f64>, classes: &[usize]) -> Vec<usize> {
    (0..proba.nrows())
        .map(|row| {
            let probs = proba.row_slice(row);
            let mut best = 0;
            for (col, &p) in probs.iter().enumerate() {
                if p > probs[best] {
                    best = col;
                }
            }
            classes[best]
        })
        .collect()
}

/// Numerically stable in-place softmax of one row of scores.
pub fn softmax_inplace(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}
