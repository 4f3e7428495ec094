//! Single (dataset, model) run.
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ArgMatches;

use tabsweep_classifiers::config::{ExperimentConfig, ModelKind};
use tabsweep_classifiers::runner::{ExperimentRecord, ExperimentRunner};

use crate::util::validate_csv_file;

/// Build a one-dataset, one-model configuration from `run` arguments.
pub fn config_from_arguments(matches: &ArgMatches) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig::default();

    let data = matches
        .get_one::<PathBuf>("data")
        .context("a dataset path is required")?;
    validate_csv_file(data)?;
    config.datasets = vec![data.clone()];

    if let Some(test_ids) = matches.get_one::<PathBuf>("test_ids") {
        validate_csv_file(test_ids)?;
        config.test_ids = Some(test_ids.clone());
    }
    if let Some(model) = matches.get_one::<String>("model") {
        config.models = vec![ModelKind::from_str(model)?];
    }
    if let Some(target) = matches.get_one::<String>("target") {
        config.target_column = target.clone();
    }
    if let Some(id_col) = matches.get_one::<String>("id_col") {
        config.id_column = id_col.clone();
    }
    if let Some(columns) = matches.get_many::<String>("categorical") {
        config.categorical_columns = columns.cloned().collect();
    }
    if let Some(test_size) = matches.get_one::<f64>("test_size") {
        config.test_size = *test_size;
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config.seed = *seed;
    }
    if let Some(threshold) = matches.get_one::<usize>("rarity_threshold") {
        config.rarity_threshold = *threshold;
    }
    if let Some(dir) = matches.get_one::<PathBuf>("artifacts_dir") {
        config.artifacts_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Execute the first configured (dataset, model) combination.
pub fn run_single(config: &ExperimentConfig) -> Result<ExperimentRecord> {
    let (runner, sources) = ExperimentRunner::from_config(config)?;
    let source = sources.first().context("no dataset configured")?;
    let kind = *config.models.first().context("no model configured")?;
    let record = runner
        .run_one(Arc::clone(source), kind)
        .with_context(|| format!("Run of {} on {} failed", kind, source.name()))?;
    Ok(record)
}
