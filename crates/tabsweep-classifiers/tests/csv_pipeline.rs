//! End-to-end tests over CSV inputs: configuration, sweep, results file,
//! artifacts and the HTML summary.

use std::io::Write;
use std::path::{Path, PathBuf};

use tabsweep_classifiers::config::{ExperimentConfig, ModelKind};
use tabsweep_classifiers::io::write_results;
use tabsweep_classifiers::report::render_sweep_report;
use tabsweep_classifiers::runner::ExperimentRunner;
use tabsweep_classifiers::SweepError;

/// Writes a cohort with three common classes and one rare class.
fn write_cohort(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(format!("{}.csv", name));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Identifier,Age,Hb,Sex,Anemie,Classificatie_MMZ").unwrap();
    let classes = [("deficient", 20.0), ("normal", 50.0), ("elevated", 80.0)];
    for (c, (label, age)) in classes.iter().enumerate() {
        for i in 0..25 {
            let hb = if i % 9 == 0 {
                "NA".to_string()
            } else {
                format!("{:.1}", 8.0 + c as f32 * 2.0 + (i % 5) as f32 * 0.1)
            };
            let sex = if i % 2 == 0 { "M" } else { "F" };
            let anemia = if c == 0 { "yes" } else { "no" };
            writeln!(
                file,
                "{}-{},{},{},{},{},{}",
                name,
                c * 100 + i,
                age + (i % 4) as f32,
                hb,
                sex,
                anemia,
                label
            )
            .unwrap();
        }
    }
    for i in 0..3 {
        writeln!(file, "{}-rare{},99,12.0,M,no,unknown", name, i).unwrap();
    }
    path
}

fn config_for(dir: &Path, datasets: Vec<PathBuf>) -> ExperimentConfig {
    ExperimentConfig {
        datasets,
        models: vec![ModelKind::Gbdt, ModelKind::HistGb],
        output: dir.join("results.csv"),
        artifacts_dir: Some(dir.join("plots")),
        workers: 2,
        ..ExperimentConfig::default()
    }
}

#[test]
fn sweep_over_csv_files_writes_results_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_cohort(dir.path(), "cohort_a");
    let b = write_cohort(dir.path(), "cohort_b");
    let config = config_for(dir.path(), vec![a, b]);

    let (runner, sources) = ExperimentRunner::from_config(&config).unwrap();
    let table = runner.run(&sources, &config.models).unwrap();
    assert_eq!(table.records.len(), 4);
    assert!(table.failures.is_empty());

    for record in &table.records {
        assert_eq!(record.dropped_classes, vec![("unknown".to_string(), 3)]);
        let artifact = record.confusion_matrix_artifact_ref.as_ref().unwrap();
        assert!(artifact.ends_with(&format!(
            "confusion_matrix_{}_{}.html",
            record.model, record.dataset
        )));
        assert!(Path::new(artifact).exists());
    }
    // only the histogram backend reports importances
    assert!(dir
        .path()
        .join("plots/feature_importance_histgb_cohort_a.html")
        .exists());
    assert!(!dir
        .path()
        .join("plots/feature_importance_gbdt_cohort_a.html")
        .exists());

    write_results(&config.output, &table).unwrap();
    let mut reader = csv::Reader::from_path(&config.output).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec![
            "dataset",
            "model",
            "accuracy",
            "macro_f1",
            "weighted_f1",
            "macro_precision",
            "macro_recall",
            "macro_auc",
            "macro_pr_auc",
            "confusion_matrix_artifact_ref",
        ]
    );
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 4);
    assert_eq!(&rows[0][0], "cohort_a");
    assert_eq!(&rows[0][1], "gbdt");
    assert_eq!(&rows[3][0], "cohort_b");
    assert_eq!(&rows[3][1], "histgb");

    let html = render_sweep_report(&table);
    assert!(html.contains("cohort_b"));
}

#[test]
fn explicit_test_ids_select_the_test_rows() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_cohort(dir.path(), "cohort");
    let ids = dir.path().join("test_ids.csv");
    let mut file = std::fs::File::create(&ids).unwrap();
    writeln!(file, "Identifier").unwrap();
    for code in [0, 1, 2, 3, 100, 101, 102, 103, 200, 201, 202, 203] {
        writeln!(file, "cohort-{}", code).unwrap();
    }
    writeln!(file, "not-in-dataset").unwrap();

    let mut config = config_for(dir.path(), vec![data]);
    config.test_ids = Some(ids);
    config.artifacts_dir = None;
    config.models = vec![ModelKind::HistGb];

    let (runner, sources) = ExperimentRunner::from_config(&config).unwrap();
    let table = runner.run(&sources, &config.models).unwrap();
    assert_eq!(table.records.len(), 1);
    let record = &table.records[0];
    assert_eq!(record.n_test, 12);
    assert_eq!(record.n_train, 63);
    assert!(record.confusion_matrix_artifact_ref.is_none());
}

#[test]
fn missing_file_is_a_per_run_failure() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_cohort(dir.path(), "good");
    let config = ExperimentConfig {
        models: vec![ModelKind::HistGb],
        ..config_for(dir.path(), vec![dir.path().join("absent.csv"), good])
    };

    let (runner, sources) = ExperimentRunner::from_config(&config).unwrap();
    let table = runner.run(&sources, &config.models).unwrap();
    assert_eq!(table.records.len(), 1);
    assert_eq!(table.records[0].dataset, "good");
    assert_eq!(table.failures.len(), 1);
    assert_eq!(table.failures[0].dataset, "absent");
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let config = ExperimentConfig::default();
    assert!(matches!(
        ExperimentRunner::from_config(&config),
        Err(SweepError::Configuration(_))
    ));
}
