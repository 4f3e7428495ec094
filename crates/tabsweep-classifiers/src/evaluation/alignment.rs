use crate::error::{Result, SweepError};
use crate::math::Array2;

/// One-hot encode category codes over a label space of `n_labels` classes.
pub fn one_hot(y: &[usize], n_labels: usize) -> Result<Array2<f64>> {
    let mut out = Array2::zeros(y.len(), n_labels);
    for (row, &label) in y.iter().enumerate() {
        if label >= n_labels {
            return Err(SweepError::Data(format!(
                "label code {} outside a label space of {} classes",
                label, n_labels
            )));
        }
        out[(row, label)] = 1.0;
    }
    Ok(out)
}

/// Re-order a probability matrix whose columns follow `classes` into the
/// full label-space order.
///
/// Columns for classes the classifier never observed are zero, and rows are
/// not renormalised: when `classes` is a strict subset of the label space the
/// aligned rows still sum to what the backend reported for its own classes.
pub fn align_probabilities(
    proba: &Array2<f64>,
    classes: &[usize],
    n_labels: usize,
) -> Result<Array2<f64>> {
    if proba.ncols() != classes.len() {
        return Err(SweepError::Model(format!(
            "probability matrix has {} columns but the classifier reports {} classes",
            proba.ncols(),
            classes.len()
        )));
    }
    if let Some(&bad) = classes.iter().find(|&&c| c >= n_labels) {
        return Err(SweepError::Model(format!(
            "classifier reports class code {} outside a label space of {} classes",
            bad, n_labels
        )));
    }

    let mut aligned = Array2::zeros(proba.nrows(), n_labels);
    for row in 0..proba.nrows() {
        for (col, &class) in classes.iter().enumerate() {
            aligned[(row, class)] = proba[(row, col)];
        }
    }
    Ok(aligned)
}
