//! Full sweep over the configured datasets and model kinds.
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ArgMatches;

use tabsweep_classifiers::config::{load_experiment_config, ExperimentConfig, ModelKind};
use tabsweep_classifiers::io::write_results;
use tabsweep_classifiers::report::render_sweep_report;
use tabsweep_classifiers::runner::{ExperimentRunner, ExperimentTable};

use crate::util::{report_path, validate_csv_file};

/// Load a sweep configuration from a JSON file.
pub fn load_sweep_config<P: AsRef<Path>>(path: P) -> Result<ExperimentConfig> {
    load_experiment_config(&path)
        .with_context(|| format!("Failed to load config: {}", path.as_ref().display()))
}

/// Apply `sweep` command-line overrides on top of `config`.
pub fn apply_overrides(config: &mut ExperimentConfig, matches: &ArgMatches) -> Result<()> {
    if let Some(paths) = matches.get_many::<PathBuf>("data") {
        config.datasets = paths.cloned().collect();
    }
    if let Some(models) = matches.get_many::<String>("model") {
        config.models = models
            .map(|m| ModelKind::from_str(m))
            .collect::<Result<_, _>>()?;
    }
    if let Some(test_ids) = matches.get_one::<PathBuf>("test_ids") {
        config.test_ids = Some(test_ids.clone());
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.output = output.clone();
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.workers = *workers;
    }
    if let Some(secs) = matches.get_one::<u64>("timeout_secs") {
        config.run_timeout_secs = Some(*secs);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("artifacts_dir") {
        config.artifacts_dir = Some(dir.clone());
    }

    for path in &config.datasets {
        validate_csv_file(path)?;
    }
    if let Some(test_ids) = &config.test_ids {
        validate_csv_file(test_ids)?;
    }
    config.validate()?;
    Ok(())
}

/// Run the sweep, write the results CSV and, if requested, the HTML summary.
pub fn run_sweep(config: &ExperimentConfig, write_report: bool) -> Result<ExperimentTable> {
    let (runner, sources) = ExperimentRunner::from_config(config)?;
    let table = runner.run(&sources, &config.models)?;

    write_results(&config.output, &table)
        .with_context(|| format!("Failed to write results: {}", config.output.display()))?;

    if write_report {
        let path = report_path(&config.output);
        std::fs::write(&path, render_sweep_report(&table))
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        log::info!("Wrote sweep report to {}", path.display());
    }
    Ok(table)
}
