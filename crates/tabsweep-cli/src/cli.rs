use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, Command, ValueHint};

use tabsweep_classifiers::config::ModelKind;

/// Model kinds compiled into this build.
fn model_kinds() -> PossibleValuesParser {
    PossibleValuesParser::new(ModelKind::ALL.iter().map(|kind| kind.as_str()))
}

fn data_arg() -> Arg {
    Arg::new("data")
        .short('d')
        .long("data")
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn artifacts_arg() -> Arg {
    Arg::new("artifacts_dir")
        .long("artifacts-dir")
        .help("Directory for confusion-matrix and feature-importance plots.")
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::DirPath)
}

fn test_ids_arg() -> Arg {
    Arg::new("test_ids")
        .long("test-ids")
        .help(
            "CSV file of identifiers forming the test partition. \
             Without it a stratified split is used.",
        )
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn run_command() -> Command {
    Command::new("run")
        .about("Train and evaluate one model on one dataset, printing the record as JSON")
        .arg(data_arg().help("Path to the dataset CSV").required(true))
        .arg(test_ids_arg())
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .help("Classifier backend to train.")
                .value_parser(model_kinds())
                .default_value("gbdt"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .help("Name of the target column.")
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new("id_col")
                .long("id-col")
                .help("Name of the unique identifier column.")
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new("categorical")
                .long("categorical")
                .help("Nominal feature column. May be repeated; replaces the defaults.")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("test_size")
                .long("test-size")
                .help("Test fraction for the stratified split.")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed of the stratified split.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("rarity_threshold")
                .long("rarity-threshold")
                .help("Classes with fewer rows are dropped before splitting.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(artifacts_arg())
}

fn sweep_command() -> Command {
    Command::new("sweep")
        .about("Run every dataset x model combination and write a results table")
        .arg(
            Arg::new("config")
                .help("Path to the sweep JSON configuration file")
                .required(false)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            data_arg()
                .help("Dataset CSV. May be repeated; replaces the configured datasets.")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .help("Classifier backend. May be repeated; replaces the configured models.")
                .value_parser(model_kinds())
                .action(ArgAction::Append),
        )
        .arg(test_ids_arg())
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path of the results CSV.")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("workers")
                .short('j')
                .long("workers")
                .help("Number of runs executed concurrently.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout_secs")
                .long("timeout-secs")
                .help("Abandon a run after this many seconds.")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no_report")
                .long("no-report")
                .help("Disable HTML report generation.")
                .action(ArgAction::SetTrue),
        )
        .arg(artifacts_arg())
}

/// Top-level command definition.
pub fn build_cli() -> Command {
    Command::new("tabsweep")
        .version(clap::crate_version!())
        .author("Justin Sing <justincsing@gmail.com>")
        .about("Train, evaluate and compare multi-class tabular classifiers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(run_command())
        .subcommand(sweep_command())
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
}
