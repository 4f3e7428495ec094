//! Tabular dataset model, category codes and the class-rarity filter.
//!
//! A `Dataset` is read once per run and never mutated afterwards; filtering
//! and row selection return new values.
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::{Result, SweepError};
use crate::math::Array2;

/// Marker cells treated as missing in numeric columns.
const MISSING_MARKERS: [&str; 5] = ["", "na", "nan", "null", "none"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Numeric,
    Nominal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
    /// Raw cell values, one per dataset row.
    pub values: Vec<String>,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, kind: FeatureKind, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    /// Encode the column as `f32`. Nominal values get category codes in
    /// sorted order of their distinct values; missing cells become `NaN`.
    fn encode(&self) -> Vec<f32> {
        match self.kind {
            FeatureKind::Numeric => self
                .values
                .iter()
                .map(|v| {
                    if is_missing(v) {
                        f32::NAN
                    } else {
                        v.trim().parse::<f32>().unwrap_or(f32::NAN)
                    }
                })
                .collect(),
            FeatureKind::Nominal => {
                let categories: BTreeSet<&str> = self
                    .values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !is_missing(v))
                    .collect();
                let codes: BTreeMap<&str, f32> = categories
                    .into_iter()
                    .enumerate()
                    .map(|(code, value)| (value, code as f32))
                    .collect();
                self.values
                    .iter()
                    .map(|v| codes.get(v.trim()).copied().unwrap_or(f32::NAN))
                    .collect()
            }
        }
    }
}

pub(crate) fn is_missing(value: &str) -> bool {
    let trimmed = value.trim();
    MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

/// Ordered rows with a unique identifier column, a nominal target column and
/// any number of feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub ids: Vec<String>,
    pub target: Vec<String>,
    pub features: Vec<FeatureColumn>,
}

impl Dataset {
    /// Build and validate a dataset.
    pub fn new(
        name: impl Into<String>,
        ids: Vec<String>,
        target: Vec<String>,
        features: Vec<FeatureColumn>,
    ) -> Result<Self> {
        let dataset = Dataset {
            name: name.into(),
            ids,
            target,
            features,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Check column lengths and identifier uniqueness.
    pub fn validate(&self) -> Result<()> {
        let n = self.ids.len();
        if self.target.len() != n {
            return Err(SweepError::Data(format!(
                "dataset '{}': target column has {} values for {} rows",
                self.name,
                self.target.len(),
                n
            )));
        }
        if let Some(col) = self.features.iter().find(|c| c.values.len() != n) {
            return Err(SweepError::Data(format!(
                "dataset '{}': feature column '{}' has {} values for {} rows",
                self.name,
                col.name,
                col.values.len(),
                n
            )));
        }
        let mut seen = HashSet::with_capacity(n);
        for id in &self.ids {
            if !seen.insert(id.as_str()) {
                return Err(SweepError::Data(format!(
                    "dataset '{}': duplicate identifier '{}'",
                    self.name, id
                )));
            }
        }
        Ok(())
    }

    /// Number of rows per distinct target value.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.target {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        let pick = |values: &[String]| rows.iter().map(|&r| values[r].clone()).collect();
        Dataset {
            name: self.name.clone(),
            ids: pick(&self.ids),
            target: pick(&self.target),
            features: self
                .features
                .iter()
                .map(|col| FeatureColumn {
                    name: col.name.clone(),
                    kind: col.kind,
                    values: pick(&col.values),
                })
                .collect(),
        }
    }

    /// Drop every row whose target value occurs fewer than `threshold` times.
    ///
    /// Returns the working dataset and the dropped classes with their counts.
    pub fn filter_rare_classes(&self, threshold: usize) -> (Dataset, Vec<(String, usize)>) {
        let counts = self.class_counts();
        let dropped: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count < threshold)
            .collect();

        if dropped.is_empty() {
            return (self.clone(), dropped);
        }

        for (label, count) in &dropped {
            log::warn!(
                "[{}] dropping class '{}' with {} rows (rarity threshold {})",
                self.name,
                label,
                count,
                threshold
            );
        }

        let rare: HashSet<&str> = dropped.iter().map(|(label, _)| label.as_str()).collect();
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&r| !rare.contains(self.target[r].as_str()))
            .collect();
        (self.select_rows(&keep), dropped)
    }

    /// Encode all feature columns into a row-major `f32` matrix.
    pub fn encode_features(&self) -> Array2<f32> {
        let n = self.n_rows();
        let n_features = self.features.len();
        let columns: Vec<Vec<f32>> = self.features.iter().map(FeatureColumn::encode).collect();
        let mut x = Array2::zeros(n, n_features);
        for (c, column) in columns.iter().enumerate() {
            for (r, &value) in column.iter().enumerate() {
                x[(r, c)] = value;
            }
        }
        x
    }
}

/// The distinct target values of a dataset, mapped to stable category codes.
///
/// Codes follow the sorted order of the labels, so the same dataset load
/// always yields the same mapping for train and test rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpace {
    labels: Vec<String>,
}

impl LabelSpace {
    pub fn from_targets<S: AsRef<str>>(targets: &[S]) -> Self {
        let labels: BTreeSet<&str> = targets.iter().map(|t| t.as_ref()).collect();
        Self {
            labels: labels.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn code(&self, label: &str) -> Option<usize> {
        self.labels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }

    /// Category codes for `targets`; unknown labels are a data error.
    pub fn encode<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<usize>> {
        targets
            .iter()
            .map(|t| {
                self.code(t.as_ref()).ok_or_else(|| {
                    SweepError::Data(format!("label '{}' is not in the label space", t.as_ref()))
                })
            })
            .collect()
    }
}
