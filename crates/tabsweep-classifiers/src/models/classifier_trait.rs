use crate::error::Result;
use crate::math::Array2;
use crate::models::cancel::CancelToken;

/// Capability set shared by every classifier backend.
///
/// Labels are category codes from the dataset's full label space. A backend
/// only knows the classes it saw during `fit`; `predict_proba` returns one
/// column per entry of `classes()`, in that order.
pub trait Classifier: Send {
    /// Fit the model once on encoded features and category codes.
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<()>;

    /// Like `fit`, but stops with `SweepError::Cancelled` once `cancel`
    /// fires. Backends check the token between boosting steps; this default
    /// only checks it before fitting.
    fn fit_until(&mut self, x: &Array2<f32>, y: &[usize], cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.fit(x, y)
    }

    /// Predict one category code per row.
    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>>;

    /// Per-row probabilities over the observed classes.
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>>;

    /// Category codes observed during training, ascending.
    fn classes(&self) -> &[usize];

    /// One value per feature when the backend exposes them.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}
