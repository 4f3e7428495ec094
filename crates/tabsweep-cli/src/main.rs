use anyhow::Result;
use clap::ArgMatches;
use log::LevelFilter;
use std::path::PathBuf;

use tabsweep_classifiers::config::ExperimentConfig;
use tabsweep_cli::cli::build_cli;
use tabsweep_cli::experiments::run::{config_from_arguments, run_single};
use tabsweep_cli::experiments::sweep::{apply_overrides, load_sweep_config, run_sweep};

const DEFAULT_LOG_FILTER: &str = "error,tabsweep=info,tabsweep_cli=info,tabsweep_classifiers=info";

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("TABSWEEP_LOG", DEFAULT_LOG_FILTER))
        .init();

    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => handle_run(run_matches),
        Some(("sweep", sweep_matches)) => handle_sweep(sweep_matches),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_run(matches: &ArgMatches) -> Result<()> {
    let config = config_from_arguments(matches)?;
    log::info!(
        "[tabsweep::run] {} on {:?}",
        config.models[0],
        config.datasets[0]
    );

    match run_single(&config) {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(e) => {
            log::error!("Run failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_sweep(matches: &ArgMatches) -> Result<()> {
    let config_path: Option<&PathBuf> = matches.get_one("config");
    let mut config = if let Some(path) = config_path {
        eprintln!("[tabsweep::sweep] Using config: {:?}", path);
        load_sweep_config(path)?
    } else {
        eprintln!("[tabsweep::sweep] No config provided; using defaults.");
        ExperimentConfig::default()
    };

    apply_overrides(&mut config, matches)?;

    if config_path.is_none() {
        let default_json = serde_json::to_string_pretty(&config).unwrap_or_default();
        eprintln!("[tabsweep::sweep] Effective config:\n{}", default_json);
    }

    let table = run_sweep(&config, !matches.get_flag("no_report"))?;
    eprintln!(
        "[tabsweep::sweep] Completed {} runs ({} failed). Results: {}",
        table.records.len() + table.failures.len(),
        table.failures.len(),
        config.output.display()
    );
    Ok(())
}
