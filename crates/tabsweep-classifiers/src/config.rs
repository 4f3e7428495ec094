use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Closed set of classifier backends known to the factory.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// One-vs-rest gradient boosted decision trees.
    #[default]
    Gbdt,
    /// Histogram-binned gradient boosting with a softmax objective.
    HistGb,
    /// XGBoost booster with the `multi:softprob` objective.
    #[cfg(feature = "xgboost")]
    XGBoost,
}

impl ModelKind {
    #[cfg(not(feature = "xgboost"))]
    pub const ALL: &'static [ModelKind] = &[ModelKind::Gbdt, ModelKind::HistGb];
    #[cfg(feature = "xgboost")]
    pub const ALL: &'static [ModelKind] = &[ModelKind::Gbdt, ModelKind::HistGb, ModelKind::XGBoost];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Gbdt => "gbdt",
            ModelKind::HistGb => "histgb",
            #[cfg(feature = "xgboost")]
            ModelKind::XGBoost => "xgboost",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gbdt" => Ok(ModelKind::Gbdt),
            "histgb" => Ok(ModelKind::HistGb),
            #[cfg(feature = "xgboost")]
            "xgboost" => Ok(ModelKind::XGBoost),
            #[cfg(not(feature = "xgboost"))]
            "xgboost" => Err(SweepError::Configuration(
                "Unknown model kind: xgboost. To use xgboost, please compile with `--features xgboost`"
                    .to_string(),
            )),
            other => Err(SweepError::Configuration(format!(
                "Unknown model kind: {}. Supported kinds are: {}",
                other,
                ModelKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Hyper-parameters for one classifier backend.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub learning_rate: f32,

    #[serde(flatten)]
    pub model_type: ModelType,
}

/// Supported model types and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    Gbdt {
        max_depth: u32,
        num_boost_round: u32,
        min_leaf_size: usize,
        training_optimization_level: u8,
    },
    HistGb {
        max_depth: u32,
        num_boost_round: u32,
        max_bins: usize,
        min_samples_leaf: usize,
        l2_regularization: f64,
    },
    #[cfg(feature = "xgboost")]
    XGBoost {
        max_depth: u32,
        num_boost_round: u32,
        verbose_eval: bool,
    },
}

impl ModelType {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelType::Gbdt { .. } => ModelKind::Gbdt,
            ModelType::HistGb { .. } => ModelKind::HistGb,
            #[cfg(feature = "xgboost")]
            ModelType::XGBoost { .. } => ModelKind::XGBoost,
        }
    }
}

impl ModelConfig {
    pub fn new(learning_rate: f32, model_type: ModelType) -> Self {
        Self {
            learning_rate,
            model_type,
        }
    }

    /// Default hyper-parameters for `kind`.
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Gbdt => Self::new(
                0.1,
                ModelType::Gbdt {
                    max_depth: 4,
                    num_boost_round: 50,
                    min_leaf_size: 1,
                    training_optimization_level: 2,
                },
            ),
            ModelKind::HistGb => Self::new(
                0.1,
                ModelType::HistGb {
                    max_depth: 5,
                    num_boost_round: 100,
                    max_bins: 255,
                    min_samples_leaf: 20,
                    l2_regularization: 1.0,
                },
            ),
            #[cfg(feature = "xgboost")]
            ModelKind::XGBoost => Self::new(
                0.3,
                ModelType::XGBoost {
                    max_depth: 6,
                    num_boost_round: 100,
                    verbose_eval: false,
                },
            ),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.model_type.kind()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::default_for(ModelKind::default())
    }
}

/// Options recognised by a sweep (and by a single run, which is a sweep of one).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub datasets: Vec<PathBuf>,
    /// One-column CSV of identifiers selecting the test rows. When absent a
    /// stratified split with `test_size` and `seed` is used instead.
    pub test_ids: Option<PathBuf>,
    pub models: Vec<ModelKind>,
    pub target_column: String,
    pub id_column: String,
    pub categorical_columns: Vec<String>,
    pub test_size: f64,
    pub seed: u64,
    pub rarity_threshold: usize,
    pub output: PathBuf,
    pub artifacts_dir: Option<PathBuf>,
    pub workers: usize,
    pub run_timeout_secs: Option<u64>,
    pub model_params: BTreeMap<ModelKind, ModelConfig>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            datasets: Vec::new(),
            test_ids: None,
            models: vec![ModelKind::default()],
            target_column: "Classificatie_MMZ".to_string(),
            id_column: "Identifier".to_string(),
            categorical_columns: vec![
                "Sex".to_string(),
                "Kidney_problem".to_string(),
                "Vitamin_B12_Problem_Label".to_string(),
                "Anemie".to_string(),
            ],
            test_size: 0.2,
            seed: 42,
            rarity_threshold: 10,
            output: PathBuf::from("ml_experiment_results.csv"),
            artifacts_dir: None,
            workers: 1,
            run_timeout_secs: None,
            model_params: BTreeMap::new(),
        }
    }
}

impl ExperimentConfig {
    /// Hyper-parameters for `kind`, honouring per-kind overrides.
    pub fn model_config(&self, kind: ModelKind) -> Result<ModelConfig> {
        match self.model_params.get(&kind) {
            Some(cfg) if cfg.kind() != kind => Err(SweepError::Configuration(format!(
                "model_params entry '{}' holds parameters for '{}'",
                kind,
                cfg.kind()
            ))),
            Some(cfg) => Ok(cfg.clone()),
            None => Ok(ModelConfig::default_for(kind)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(SweepError::Configuration("no datasets configured".into()));
        }
        if self.models.is_empty() {
            return Err(SweepError::Configuration("no model kinds configured".into()));
        }
        if self.target_column.trim().is_empty() {
            return Err(SweepError::Configuration("target column name is empty".into()));
        }
        if self.id_column.trim().is_empty() {
            return Err(SweepError::Configuration("identifier column name is empty".into()));
        }
        if self.target_column == self.id_column {
            return Err(SweepError::Configuration(format!(
                "target and identifier column are both '{}'",
                self.id_column
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(SweepError::Configuration(format!(
                "test size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.workers == 0 {
            return Err(SweepError::Configuration("workers must be at least 1".into()));
        }
        for kind in &self.models {
            self.model_config(*kind)?;
        }
        Ok(())
    }
}

/// Load an experiment configuration from a JSON file.
pub fn load_experiment_config<P: AsRef<Path>>(path: P) -> Result<ExperimentConfig> {
    let content = std::fs::read_to_string(&path)?;
    let config: ExperimentConfig = serde_json::from_str(&content)?;
    Ok(config)
}
