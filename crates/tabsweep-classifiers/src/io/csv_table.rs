//! CSV readers for datasets and test-id lists, and the results writer.
use std::collections::HashSet;
use std::path::Path;

use csv::StringRecord;
use serde::Serialize;

use crate::config::{ExperimentConfig, ModelKind};
use crate::data_handling::{is_missing, Dataset, FeatureColumn, FeatureKind};
use crate::error::{Result, SweepError};
use crate::runner::ExperimentTable;

/// Column roles of a dataset file.
#[derive(Debug, Clone)]
pub struct DatasetSchema {
    /// Column holding unique row identifiers.
    pub id_column: String,
    /// Nominal column holding the class label.
    pub target_column: String,
    /// Columns read as nominal features. Names absent from a file are
    /// skipped.
    pub categorical_columns: Vec<String>,
}

impl From<&ExperimentConfig> for DatasetSchema {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            id_column: config.id_column.clone(),
            target_column: config.target_column.clone(),
            categorical_columns: config.categorical_columns.clone(),
        }
    }
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|header| header == name)
}

/// Name of a dataset read from `path`: its file stem.
pub fn dataset_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.as_ref().display().to_string())
}

/// Read a headered CSV file into a `Dataset`.
///
/// Every column other than the id and target columns becomes a feature.
/// Columns listed in the schema are nominal; the others are numeric unless a
/// non-missing cell fails to parse as a number, in which case the column is
/// read as nominal too.
pub fn read_dataset<P: AsRef<Path>>(path: P, schema: &DatasetSchema) -> Result<Dataset> {
    let path = path.as_ref();
    let name = dataset_name(path);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let id_idx = find_column(&headers, &schema.id_column).ok_or_else(|| {
        SweepError::Data(format!(
            "{}: missing id column '{}'",
            path.display(),
            schema.id_column
        ))
    })?;
    let target_idx = find_column(&headers, &schema.target_column).ok_or_else(|| {
        SweepError::Data(format!(
            "{}: missing target column '{}'",
            path.display(),
            schema.target_column
        ))
    })?;

    let feature_indices: Vec<usize> = (0..headers.len())
        .filter(|&idx| idx != id_idx && idx != target_idx)
        .collect();

    let mut ids = Vec::new();
    let mut target = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); feature_indices.len()];

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let line = row_idx + 2;
        let label = record.get(target_idx).unwrap_or_default();
        if is_missing(label) {
            return Err(SweepError::Data(format!(
                "{}: missing target value on line {}",
                path.display(),
                line
            )));
        }
        ids.push(record.get(id_idx).unwrap_or_default().to_string());
        target.push(label.to_string());
        for (column, &idx) in columns.iter_mut().zip(&feature_indices) {
            column.push(record.get(idx).unwrap_or_default().to_string());
        }
    }

    let declared: HashSet<&str> = schema
        .categorical_columns
        .iter()
        .map(String::as_str)
        .collect();
    for missing in declared
        .iter()
        .filter(|name| find_column(&headers, name).is_none())
    {
        log::debug!("[{}] categorical column '{}' not present, skipping", name, missing);
    }

    let features = feature_indices
        .iter()
        .zip(columns)
        .map(|(&idx, values)| {
            let header = headers.get(idx).unwrap_or_default();
            let kind = if declared.contains(header) {
                FeatureKind::Nominal
            } else if values
                .iter()
                .all(|v| is_missing(v) || v.parse::<f32>().is_ok())
            {
                FeatureKind::Numeric
            } else {
                log::debug!("[{}] column '{}' is not numeric, reading it as nominal", name, header);
                FeatureKind::Nominal
            };
            FeatureColumn::new(header, kind, values)
        })
        .collect();

    let dataset = Dataset::new(name, ids, target, features)?;
    log::info!(
        "Loaded dataset '{}' ({} rows, {} features)",
        dataset.name,
        dataset.n_rows(),
        dataset.features.len()
    );
    Ok(dataset)
}

/// Read the identifiers of a test-id list.
///
/// The list is taken from the column named `id_column`, or from the first
/// column when no column carries that name.
pub fn read_test_ids<P: AsRef<Path>>(path: P, id_column: &str) -> Result<HashSet<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(SweepError::Data(format!("{}: empty test id file", path.display())));
    }
    let idx = find_column(&headers, id_column).unwrap_or(0);

    let mut ids = HashSet::new();
    for result in reader.records() {
        let record = result?;
        if let Some(id) = record.get(idx).filter(|id| !id.is_empty()) {
            ids.insert(id.to_string());
        }
    }
    log::info!("Read {} test identifiers from {}", ids.len(), path.display());
    Ok(ids)
}

#[derive(Serialize)]
struct ResultRow<'a> {
    dataset: &'a str,
    model: ModelKind,
    accuracy: f64,
    macro_f1: f64,
    weighted_f1: f64,
    macro_precision: f64,
    macro_recall: f64,
    macro_auc: Option<f64>,
    macro_pr_auc: Option<f64>,
    confusion_matrix_artifact_ref: Option<&'a str>,
}

/// Write one CSV row per successful run. Undefined metrics are empty cells.
pub fn write_results<P: AsRef<Path>>(path: P, table: &ExperimentTable) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if table.records.is_empty() {
        writer.write_record([
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
        ])?;
    }
    for record in &table.records {
        writer.serialize(ResultRow {
            dataset: &record.dataset,
            model: record.model,
            accuracy: record.accuracy,
            macro_f1: record.macro_f1,
            weighted_f1: record.weighted_f1,
            macro_precision: record.macro_precision,
            macro_recall: record.macro_recall,
            macro_auc: record.macro_auc,
            macro_pr_auc: record.macro_pr_auc,
            confusion_matrix_artifact_ref: record.confusion_matrix_artifact_ref.as_deref(),
        })?;
    }
    writer.flush()?;
    log::info!("Wrote {} result rows to {}", table.records.len(), path.display());
    Ok(())
}
