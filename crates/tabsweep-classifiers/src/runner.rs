//! Sweep driver over the cross-product of datasets and classifier kinds.
//!
//! Every (dataset, model) combination is an isolated run: it loads its own
//! copy of the dataset, builds a fresh classifier and produces one
//! `ExperimentRecord`. A failing run is logged and left out of the table;
//! it never aborts the remaining runs.
//!
//! Runs execute on the sweep's worker pool itself. A per-run timeout arms a
//! watchdog that fires the run's `CancelToken`; the run stops at its next
//! checkpoint, so no run outlives its worker.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ExperimentConfig, ModelKind};
use crate::data_handling::{Dataset, LabelSpace};
use crate::error::{Result, SweepError};
use crate::evaluation::{evaluate, MetricReport};
use crate::io::csv_table::{dataset_name, read_dataset, read_test_ids, DatasetSchema};
use crate::models::{CancelToken, ClassifierFactory, ModelRegistry};
use crate::partition::{partition, PartitionMode};
use crate::report::{ArtifactKey, ArtifactSink, PlotlySink};

/// Default minimum class support kept by the rarity filter.
pub const DEFAULT_RARITY_THRESHOLD: usize = 10;

/// Something a run can load a dataset from.
pub trait DatasetSource: Send + Sync {
    fn name(&self) -> String;

    /// Load a fresh copy of the dataset.
    fn load(&self) -> Result<Dataset>;
}

/// A CSV file read with a fixed column schema.
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    pub path: PathBuf,
    pub schema: DatasetSchema,
}

impl CsvDatasetSource {
    pub fn new(path: impl Into<PathBuf>, schema: DatasetSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }
}

impl DatasetSource for CsvDatasetSource {
    fn name(&self) -> String {
        dataset_name(&self.path)
    }

    fn load(&self) -> Result<Dataset> {
        read_dataset(&self.path, &self.schema)
    }
}

impl DatasetSource for Dataset {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<Dataset> {
        Ok(self.clone())
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRecord {
    pub dataset: String,
    pub model: ModelKind,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_auc: Option<f64>,
    pub macro_pr_auc: Option<f64>,
    /// Metrics left undefined for this fold, e.g. AUC on a single-class fold.
    pub undefined_metrics: Vec<String>,
    /// Classes removed by the rarity filter, with their support.
    pub dropped_classes: Vec<(String, usize)>,
    pub n_train: usize,
    pub n_test: usize,
    pub confusion_matrix_artifact_ref: Option<String>,
    pub feature_importance_artifact: Option<String>,
}

impl ExperimentRecord {
    fn from_report(dataset: &str, model: ModelKind, report: &MetricReport) -> Self {
        Self {
            dataset: dataset.to_string(),
            model,
            accuracy: report.accuracy,
            macro_f1: report.macro_f1,
            weighted_f1: report.weighted_f1,
            macro_precision: report.macro_precision,
            macro_recall: report.macro_recall,
            macro_auc: report.macro_auc,
            macro_pr_auc: report.macro_pr_auc,
            undefined_metrics: report.undefined_metrics.clone(),
            dropped_classes: Vec::new(),
            n_train: 0,
            n_test: 0,
            confusion_matrix_artifact_ref: None,
            feature_importance_artifact: None,
        }
    }
}

/// A run that produced no record.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub dataset: String,
    pub model: ModelKind,
    pub error: String,
}

/// Aggregated sweep output, in dataset-major, model-minor order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentTable {
    pub records: Vec<ExperimentRecord>,
    pub failures: Vec<RunFailure>,
}

/// Shared, read-only state handed to every run.
#[derive(Clone)]
struct RunContext {
    factory: Arc<dyn ClassifierFactory>,
    partition: PartitionMode,
    sink: Option<Arc<dyn ArtifactSink>>,
    rarity_threshold: usize,
}

impl RunContext {
    fn execute(
        &self,
        source: &dyn DatasetSource,
        kind: ModelKind,
        cancel: &CancelToken,
    ) -> Result<ExperimentRecord> {
        self.factory.ensure_supported(kind)?;

        let dataset = source.load()?;
        cancel.check()?;
        let (working, dropped) = dataset.filter_rare_classes(self.rarity_threshold);
        if working.n_rows() == 0 {
            return Err(SweepError::Data(format!(
                "dataset '{}': no class has at least {} rows",
                working.name, self.rarity_threshold
            )));
        }

        let label_space = LabelSpace::from_targets(working.target.as_slice());
        let y = label_space.encode(working.target.as_slice())?;
        let split = partition(&working, &self.partition)?;

        let x = working.encode_features();
        let train_x = x.select_rows(&split.train);
        let test_x = x.select_rows(&split.test);
        let train_y: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let test_y: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();

        let mut classifier = self.factory.create(kind, label_space.len())?;
        let started = Instant::now();
        classifier.fit_until(&train_x, &train_y, cancel)?;
        cancel.check()?;
        log::debug!(
            "[{}] {} fitted in {:.2?}",
            working.name,
            kind,
            started.elapsed()
        );

        let feature_names = working.feature_names();
        let report = evaluate(
            classifier.as_ref(),
            &test_x,
            &test_y,
            &label_space,
            &feature_names,
        )?;

        let mut record = ExperimentRecord::from_report(&working.name, kind, &report);
        record.dropped_classes = dropped;
        record.n_train = split.train.len();
        record.n_test = split.test.len();
        cancel.check()?;
        if let Some(sink) = &self.sink {
            let key = ArtifactKey::new(kind, working.name.clone());
            record.confusion_matrix_artifact_ref = swallow_artifact_error(sink.confusion_matrix(
                &key,
                &report.labels,
                &report.confusion_matrix.counts,
            ));
            if let Some(importances) = &report.feature_importances {
                let (names, values): (Vec<String>, Vec<f64>) = importances.iter().cloned().unzip();
                record.feature_importance_artifact =
                    swallow_artifact_error(sink.feature_importances(&key, &names, &values));
            }
        }

        log::info!(
            "[{}] {}: accuracy={:.4} macro_f1={:.4} macro_auc={}",
            record.dataset,
            record.model,
            record.accuracy,
            record.macro_f1,
            record
                .macro_auc
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "undefined".to_string())
        );
        Ok(record)
    }
}

fn swallow_artifact_error(result: Result<String>) -> Option<String> {
    match result {
        Ok(reference) => Some(reference),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

/// Fires a run's cancel token once `timeout` elapses, unless disarmed first.
struct Watchdog {
    disarm: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    fn arm(label: String, timeout: Duration, cancel: CancelToken) -> Result<Self> {
        let (disarm, rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name(format!("watchdog-{}", label))
            .spawn(move || {
                // A dropped sender disconnects, which disarms.
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                    log::warn!("[{}] still running after {:?}; cancelling", label, timeout);
                    cancel.cancel();
                }
            })?;
        Ok(Self { disarm, handle })
    }

    fn disarm(self) {
        drop(self.disarm);
        let _ = self.handle.join();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Drives (dataset, model) runs on a bounded worker pool.
pub struct ExperimentRunner {
    ctx: RunContext,
    workers: usize,
    run_timeout: Option<Duration>,
}

impl ExperimentRunner {
    /// Runner with one worker, no timeout, no artifact sink and the default
    /// rarity threshold.
    pub fn new(factory: Arc<dyn ClassifierFactory>, partition: PartitionMode) -> Self {
        Self {
            ctx: RunContext {
                factory,
                partition,
                sink: None,
                rarity_threshold: DEFAULT_RARITY_THRESHOLD,
            },
            workers: 1,
            run_timeout: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.ctx.sink = Some(sink);
        self
    }

    pub fn with_rarity_threshold(mut self, threshold: usize) -> Self {
        self.ctx.rarity_threshold = threshold;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Build a runner and its dataset sources from an experiment configuration.
    pub fn from_config(
        config: &ExperimentConfig,
    ) -> Result<(Self, Vec<Arc<dyn DatasetSource>>)> {
        config.validate()?;

        let mut registry = ModelRegistry::empty();
        for &kind in &config.models {
            registry.register(config.model_config(kind)?);
        }

        let partition = match &config.test_ids {
            Some(path) => PartitionMode::Explicit(Arc::new(read_test_ids(path, &config.id_column)?)),
            None => PartitionMode::Stratified {
                fraction: config.test_size,
                seed: config.seed,
            },
        };

        let mut runner = ExperimentRunner::new(Arc::new(registry), partition)
            .with_rarity_threshold(config.rarity_threshold)
            .with_workers(config.workers)
            .with_run_timeout(config.run_timeout_secs.map(Duration::from_secs));
        if let Some(dir) = &config.artifacts_dir {
            runner = runner.with_sink(Arc::new(PlotlySink::new(dir)));
        }

        let schema = DatasetSchema::from(config);
        let sources = config
            .datasets
            .iter()
            .map(|path| {
                Arc::new(CsvDatasetSource::new(path, schema.clone())) as Arc<dyn DatasetSource>
            })
            .collect();
        Ok((runner, sources))
    }

    /// Execute one run on the calling thread, honouring the per-run timeout.
    ///
    /// On timeout the run is cancelled at its next checkpoint and reported
    /// as `SweepError::Timeout`; it produces no artifacts after that point.
    /// Panics inside the run are caught and reported as
    /// `SweepError::Panicked`.
    pub fn run_one(&self, source: Arc<dyn DatasetSource>, kind: ModelKind) -> Result<ExperimentRecord> {
        let cancel = CancelToken::new();
        let watchdog = match self.run_timeout {
            Some(timeout) => Some(Watchdog::arm(
                format!("{}-{}", source.name(), kind),
                timeout,
                cancel.clone(),
            )?),
            None => None,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.ctx.execute(source.as_ref(), kind, &cancel)
        }))
        .unwrap_or_else(|payload| Err(SweepError::Panicked(panic_message(payload))));

        if let Some(watchdog) = watchdog {
            watchdog.disarm();
        }
        match (outcome, self.run_timeout) {
            (Err(SweepError::Cancelled), Some(timeout)) => Err(SweepError::Timeout {
                secs: timeout.as_secs(),
            }),
            (outcome, _) => outcome,
        }
    }

    /// Run every (dataset, model) combination, dataset-major and model-minor.
    ///
    /// Failed runs are logged and listed in `failures`; the remaining
    /// records keep iteration order.
    pub fn run(
        &self,
        sources: &[Arc<dyn DatasetSource>],
        models: &[ModelKind],
    ) -> Result<ExperimentTable> {
        let jobs: Vec<(Arc<dyn DatasetSource>, ModelKind)> = sources
            .iter()
            .flat_map(|source| models.iter().map(move |&kind| (Arc::clone(source), kind)))
            .collect();
        log::info!(
            "Running {} experiments ({} datasets x {} models) on {} worker(s)",
            jobs.len(),
            sources.len(),
            models.len(),
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("tabsweep-worker-{}", i))
            .build()
            .map_err(|e| SweepError::Configuration(format!("cannot start worker pool: {}", e)))?;

        let outcomes: Vec<(String, ModelKind, Result<ExperimentRecord>)> = pool.install(|| {
            jobs.into_par_iter()
                .map(|(source, kind)| {
                    let name = source.name();
                    let outcome = self.run_one(source, kind);
                    (name, kind, outcome)
                })
                .collect()
        });

        let mut table = ExperimentTable::default();
        for (dataset, model, outcome) in outcomes {
            match outcome {
                Ok(record) => table.records.push(record),
                Err(e) => {
                    log::error!("[{}] {} failed: {}", dataset, model, e);
                    table.failures.push(RunFailure {
                        dataset,
                        model,
                        error: e.to_string(),
                    });
                }
            }
        }
        log::info!(
            "Sweep finished: {} succeeded, {} failed",
            table.records.len(),
            table.failures.len()
        );
        Ok(table)
    }
}
