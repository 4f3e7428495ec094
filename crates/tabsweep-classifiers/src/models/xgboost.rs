use log::debug;
use xgb::{
    parameters::{
        learning::{LearningTaskParametersBuilder, Objective},
        tree::{TreeBoosterParametersBuilder, TreeMethod},
        BoosterParametersBuilder, BoosterType,
    },
    Booster, DMatrix,
};

use crate::config::{ModelConfig, ModelType};
use crate::error::{Result, SweepError};
use crate::math::Array2;
use crate::models::cancel::CancelToken;
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{argmax_classes, check_fit_input, check_predict_input, not_fitted};

fn xgb_error(e: impl std::fmt::Display) -> SweepError {
    SweepError::Model(format!("xgboost: {}", e))
}

fn dense_matrix(x: &Array2<f32>) -> Result<DMatrix> {
    debug!(
        "Creating DMatrix from dense data: rows={}, cols={}",
        x.nrows(),
        x.ncols()
    );
    let data: Vec<f32> = (0..x.nrows())
        .flat_map(|row| x.row_slice(row).iter().copied())
        .collect();
    DMatrix::from_dense(&data, x.nrows()).map_err(xgb_error)
}

/// XGBoost classifier with the `multi:softprob` objective.
///
/// `num_class` is the size of the full label space, so category codes are
/// used as XGBoost labels directly. `predict_proba` keeps only the columns
/// of classes observed during training.
pub struct XGBoostClassifier {
    /// Trained booster, saved to a buffer so the classifier stays `Send`.
    model: Option<Vec<u8>>,
    classes: Vec<usize>,
    num_classes: usize,
    n_features: usize,
    params: ModelConfig,
}

impl XGBoostClassifier {
    /// Classifier over a label space of `num_classes` category codes.
    pub fn new(params: ModelConfig, num_classes: usize) -> Self {
        XGBoostClassifier {
            model: None,
            classes: Vec::new(),
            num_classes,
            n_features: 0,
            params,
        }
    }

    fn booster(&self) -> Result<Booster> {
        let buffer = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Booster::load_buffer(buffer).map_err(xgb_error)
    }
}

impl Classifier for XGBoostClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<()> {
        self.fit_until(x, y, &CancelToken::default())
    }

    fn fit_until(&mut self, x: &Array2<f32>, y: &[usize], cancel: &CancelToken) -> Result<()> {
        let ModelType::XGBoost {
            max_depth,
            num_boost_round,
            verbose_eval,
        } = &self.params.model_type
        else {
            return Err(SweepError::Configuration(format!(
                "Expected XGBoost params, got {:?}",
                self.params.kind()
            )));
        };

        self.model = None;
        self.classes = check_fit_input(x, y, self.num_classes)?;
        self.n_features = x.ncols();

        let mut dmat = dense_matrix(x)?;
        dmat.set_labels(&y.iter().map(|&l| l as f32).collect::<Vec<f32>>())
            .map_err(xgb_error)?;

        let learning_params = LearningTaskParametersBuilder::default()
            .objective(Objective::MultiSoftprob(self.num_classes as u32))
            .build()
            .map_err(xgb_error)?;
        let tree_params = TreeBoosterParametersBuilder::default()
            .tree_method(TreeMethod::Hist)
            .max_depth(*max_depth)
            .eta(self.params.learning_rate)
            .build()
            .map_err(xgb_error)?;
        let booster_params = BoosterParametersBuilder::default()
            .booster_type(BoosterType::Tree(tree_params))
            .learning_params(learning_params)
            .verbose(*verbose_eval)
            .build()
            .map_err(xgb_error)?;

        // Explicit update loop; `Booster::train` skips the per-round update
        // in some published releases.
        let mut bst = Booster::new_with_cached_dmats(&booster_params, &[&dmat]).map_err(xgb_error)?;
        for round in 0..*num_boost_round as i32 {
            cancel.check()?;
            bst.update(&dmat, round).map_err(xgb_error)?;
        }

        let buffer = bst.save_buffer(false).map_err(xgb_error)?;
        debug!("model dump size after training = {} bytes", buffer.len());
        self.model = Some(buffer);
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        let booster = self.booster()?;
        check_predict_input(x, self.n_features)?;

        let preds = booster.predict(&dense_matrix(x)?).map_err(xgb_error)?;
        if preds.len() != x.nrows() * self.num_classes {
            return Err(SweepError::Model(format!(
                "xgboost returned {} values for {} rows x {} classes",
                preds.len(),
                x.nrows(),
                self.num_classes
            )));
        }

        let mut proba = Array2::zeros(x.nrows(), self.classes.len());
        for row in 0..x.nrows() {
            let full = &preds[row * self.num_classes..(row + 1) * self.num_classes];
            let out = proba.row_slice_mut(row);
            for (k, &class) in self.classes.iter().enumerate() {
                out[k] = f64::from(full[class]);
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn name(&self) -> &str {
        "xgboost"
    }
}
