use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec};
use gbdt::gradient_boost::GBDT;

use crate::config::{ModelConfig, ModelType};
use crate::error::{Result, SweepError};
use crate::math::Array2;
use crate::models::cancel::CancelToken;
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{argmax_classes, check_fit_input, check_predict_input, not_fitted};

/// Stand-in for missing feature values; sorts below every real value.
const MISSING_VALUE: f32 = f32::MIN;

/// Gradient Boosting Decision Tree (GBDT) classifier.
///
/// Multi-class problems are decomposed one-vs-rest: one binary booster with
/// the `LogLikelyhood` loss per observed class, and per-row scores are
/// normalised over the observed classes.
pub struct GBDTClassifier {
    models: Vec<GBDT>,
    classes: Vec<usize>,
    num_classes: usize,
    n_features: usize,
    params: ModelConfig,
    fitted: bool,
}

impl GBDTClassifier {
    /// Classifier over a label space of `num_classes` category codes.
    pub fn new(params: ModelConfig, num_classes: usize) -> Self {
        GBDTClassifier {
            models: Vec::new(),
            classes: Vec::new(),
            num_classes,
            n_features: 0,
            params,
            fitted: false,
        }
    }

    fn booster_config(&self, feature_size: usize) -> Result<Config> {
        match &self.params.model_type {
            ModelType::Gbdt {
                max_depth,
                num_boost_round,
                min_leaf_size,
                training_optimization_level,
            } => {
                let mut config = Config::new();
                config.set_feature_size(feature_size);
                config.set_shrinkage(self.params.learning_rate);
                config.set_max_depth(*max_depth);
                config.set_iterations(*num_boost_round as usize);
                config.set_min_leaf_size(*min_leaf_size);
                config.set_debug(false);
                config.set_training_optimization_level(*training_optimization_level);
                config.set_loss("LogLikelyhood");
                Ok(config)
            }
            other => Err(SweepError::Configuration(format!(
                "Expected Gbdt params, got {:?}",
                other.kind()
            ))),
        }
    }
}

fn to_rows(x: &Array2<f32>) -> impl Iterator<Item = Vec<f32>> + '_ {
    (0..x.nrows()).map(move |row| {
        x.row_slice(row)
            .iter()
            .map(|&v| if v.is_nan() { MISSING_VALUE } else { v })
            .collect()
    })
}

impl Classifier for GBDTClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<()> {
        self.fit_until(x, y, &CancelToken::default())
    }

    fn fit_until(&mut self, x: &Array2<f32>, y: &[usize], cancel: &CancelToken) -> Result<()> {
        self.fitted = false;
        self.classes = check_fit_input(x, y, self.num_classes)?;
        self.n_features = x.ncols();
        self.models.clear();

        // A single observed class needs no booster.
        if self.classes.len() > 1 {
            let config = self.booster_config(x.ncols())?;
            let rows: Vec<Vec<f32>> = to_rows(x).collect();
            for &class in &self.classes {
                cancel.check()?;
                let mut train_x: DataVec = rows
                    .iter()
                    .zip(y)
                    .map(|(row, &label)| {
                        let target = if label == class { 1.0 } else { -1.0 };
                        Data::new_training_data(row.clone(), 1.0, target, None)
                    })
                    .collect();
                let mut booster = GBDT::new(&config);
                booster.fit(&mut train_x);
                self.models.push(booster);
            }
        }

        log::debug!(
            "fitted {} one-vs-rest boosters over {} rows",
            self.models.len(),
            x.nrows()
        );
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(not_fitted(self.name()));
        }
        check_predict_input(x, self.n_features)?;

        let n_classes = self.classes.len();
        if n_classes == 1 {
            return Array2::from_shape_vec((x.nrows(), 1), vec![1.0; x.nrows()])
                .map_err(|e| SweepError::Model(e.to_string()));
        }

        let test_x: DataVec = to_rows(x)
            .map(|row| Data::new_training_data(row, 1.0, 0.0, None))
            .collect();
        let scores: Vec<Vec<f32>> = self
            .models
            .iter()
            .map(|booster| booster.predict(&test_x))
            .collect();

        let mut proba = Array2::zeros(x.nrows(), n_classes);
        for row in 0..x.nrows() {
            let out = proba.row_slice_mut(row);
            for (k, class_scores) in scores.iter().enumerate() {
                out[k] = f64::from(class_scores[row]).clamp(0.0, 1.0);
            }
            let total: f64 = out.iter().sum();
            if total > 0.0 {
                out.iter_mut().for_each(|p| *p /= total);
            } else {
                out.iter_mut().for_each(|p| *p = 1.0 / n_classes as f64);
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn name(&self) -> &str {
        "gbdt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;

    fn small_config() -> ModelConfig {
        ModelConfig::new(
            0.3,
            ModelType::Gbdt {
                max_depth: 3,
                num_boost_round: 10,
                min_leaf_size: 1,
                training_optimization_level: 2,
            },
        )
    }

    #[test]
    fn test_gbdt_classifier_three_classes() {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let class = i % 3;
            data.push(class as f32 * 10.0 + (i as f32) * 0.01);
            data.push(1.0);
            y.push(class * 2);
        }
        let x = Array2::from_shape_vec((30, 2), data).unwrap();

        let mut classifier = GBDTClassifier::new(small_config(), 5);
        classifier.fit(&x, &y).unwrap();
        assert_eq!(classifier.classes(), &[0, 2, 4]);

        let proba = classifier.predict_proba(&x).unwrap();
        assert_eq!(proba.shape(), (30, 3));
        for row in 0..30 {
            let sum: f64 = proba.row_slice(row).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }

        let predictions = classifier.predict(&x).unwrap();
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct >= 27, "only {} of 30 correct", correct);
    }

    #[test]
    fn single_class_training_predicts_that_class() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let mut classifier = GBDTClassifier::new(small_config(), 5);
        classifier.fit(&x, &[1, 1, 1]).unwrap();
        assert_eq!(classifier.predict(&x).unwrap(), vec![1, 1, 1]);
        assert_eq!(classifier.predict_proba(&x).unwrap().shape(), (3, 1));
    }

    #[test]
    fn cancelled_token_stops_fitting() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let mut classifier = GBDTClassifier::new(small_config(), 2);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            classifier.fit_until(&x, &[0, 0, 1, 1], &cancel),
            Err(SweepError::Cancelled)
        ));
        assert!(classifier.predict(&x).is_err());
    }

    #[test]
    fn predict_before_fit_fails() {
        let classifier = GBDTClassifier::new(small_config(), 5);
        let x = Array2::from_shape_vec((1, 1), vec![0.0]).unwrap();
        assert!(classifier.predict(&x).is_err());
    }

    #[test]
    fn wrong_params_are_a_configuration_error() {
        let mut classifier = GBDTClassifier::new(ModelConfig::default_for(ModelKind::HistGb), 2);
        let x = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        assert!(matches!(
            classifier.fit(&x, &[0, 1]),
            Err(SweepError::Configuration(_))
        ));
    }
}
