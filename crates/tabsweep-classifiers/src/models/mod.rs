pub mod cancel;
pub mod classifier_trait;
pub mod factory;
pub mod gbdt;
pub mod hist_gb;
pub mod utils;
#[cfg(feature = "xgboost")]
pub mod xgboost;

pub use cancel::CancelToken;
pub use classifier_trait::Classifier;
pub use factory::{build_model, ClassifierFactory, ModelRegistry};
