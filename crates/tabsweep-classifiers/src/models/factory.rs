use std::collections::BTreeMap;

use crate::config::{ModelConfig, ModelKind};
use crate::error::{Result, SweepError};
use crate::models::classifier_trait::Classifier;
use crate::models::gbdt::GBDTClassifier;
use crate::models::hist_gb::HistGbClassifier;

/// Constructs fresh, untrained classifiers for a sweep.
///
/// Every call must return a new instance; runs never share a classifier.
pub trait ClassifierFactory: Send + Sync {
    /// Fail early for kinds this factory cannot build.
    fn ensure_supported(&self, _kind: ModelKind) -> Result<()> {
        Ok(())
    }

    fn create(&self, kind: ModelKind, num_classes: usize) -> Result<Box<dyn Classifier>>;
}

/// Build a boxed classifier from a `ModelConfig` for a label space of
/// `num_classes` category codes.
pub fn build_model(params: ModelConfig, num_classes: usize) -> Box<dyn Classifier> {
    match params.kind() {
        ModelKind::Gbdt => Box::new(GBDTClassifier::new(params, num_classes)),
        ModelKind::HistGb => Box::new(HistGbClassifier::new(params, num_classes)),
        #[cfg(feature = "xgboost")]
        ModelKind::XGBoost => Box::new(crate::models::xgboost::XGBoostClassifier::new(
            params,
            num_classes,
        )),
    }
}

/// Enum-keyed registry of model hyper-parameters.
///
/// Kinds without an entry are rejected with a configuration error before any
/// data is touched.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    configs: BTreeMap<ModelKind, ModelConfig>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            configs: BTreeMap::new(),
        }
    }

    /// Registry with default parameters for every known kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for &kind in ModelKind::ALL {
            registry.register(ModelConfig::default_for(kind));
        }
        registry
    }

    pub fn register(&mut self, config: ModelConfig) -> &mut Self {
        self.configs.insert(config.kind(), config);
        self
    }

    pub fn get(&self, kind: ModelKind) -> Option<&ModelConfig> {
        self.configs.get(&kind)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ClassifierFactory for ModelRegistry {
    fn ensure_supported(&self, kind: ModelKind) -> Result<()> {
        self.get(kind).map(|_| ()).ok_or_else(|| {
            SweepError::Configuration(format!("model kind '{}' is not registered", kind))
        })
    }

    fn create(&self, kind: ModelKind, num_classes: usize) -> Result<Box<dyn Classifier>> {
        if num_classes == 0 {
            return Err(SweepError::Data("cannot build a classifier for zero classes".into()));
        }
        let config = self.get(kind).ok_or_else(|| {
            SweepError::Configuration(format!("model kind '{}' is not registered", kind))
        })?;
        log::debug!("building {} classifier for {} classes", kind, num_classes);
        Ok(build_model(config.clone(), num_classes))
    }
}
