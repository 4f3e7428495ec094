//! Deterministic train/test partitioning.
//!
//! The test rows are either selected by an explicit identifier list or drawn
//! per class with a seeded RNG so that class proportions carry over to both
//! sides of the split.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data_handling::Dataset;
use crate::error::{Result, SweepError};

/// How the test partition is chosen.
#[derive(Debug, Clone)]
pub enum PartitionMode {
    /// Rows whose identifier is in the set form the test partition.
    Explicit(Arc<HashSet<String>>),
    /// Seeded stratified sampling of `fraction` of the rows.
    Stratified { fraction: f64, seed: u64 },
}

/// Disjoint, jointly exhaustive row indices into the partitioned dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `dataset` into train and test rows.
///
/// Both partitions must be non-empty; an empty side is a data error.
pub fn partition(dataset: &Dataset, mode: &PartitionMode) -> Result<Partition> {
    let split = match mode {
        PartitionMode::Explicit(test_ids) => explicit_split(dataset, test_ids)?,
        PartitionMode::Stratified { fraction, seed } => {
            stratified_split(dataset, *fraction, *seed)?
        }
    };

    if split.train.is_empty() || split.test.is_empty() {
        return Err(SweepError::Data(format!(
            "dataset '{}': empty partition (train={}, test={})",
            dataset.name,
            split.train.len(),
            split.test.len()
        )));
    }

    log::debug!(
        "[{}] partitioned {} rows into train={} test={}",
        dataset.name,
        dataset.n_rows(),
        split.train.len(),
        split.test.len()
    );
    Ok(split)
}

fn explicit_split(dataset: &Dataset, test_ids: &HashSet<String>) -> Result<Partition> {
    let mut seen = HashSet::with_capacity(dataset.n_rows());
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (row, id) in dataset.ids.iter().enumerate() {
        if !seen.insert(id.as_str()) {
            return Err(SweepError::Data(format!(
                "dataset '{}': duplicate identifier '{}'",
                dataset.name, id
            )));
        }
        if test_ids.contains(id) {
            test.push(row);
        } else {
            train.push(row);
        }
    }

    let unmatched = test_ids.len().saturating_sub(test.len());
    if unmatched > 0 {
        log::debug!(
            "[{}] {} test identifiers are not present in the dataset",
            dataset.name,
            unmatched
        );
    }
    Ok(Partition { train, test })
}

fn stratified_split(dataset: &Dataset, fraction: f64, seed: u64) -> Result<Partition> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SweepError::Configuration(format!(
            "test fraction must be in (0, 1), got {}",
            fraction
        )));
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, label) in dataset.target.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(row);
    }

    let n = dataset.n_rows();
    let n_test = (fraction * n as f64).ceil() as usize;
    let allocation = allocate_test_rows(
        &by_class.values().map(Vec::len).collect::<Vec<_>>(),
        n_test,
    );

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_test.min(n));
    let mut test = Vec::with_capacity(n_test);
    for (mut rows, take) in by_class.into_values().zip(allocation) {
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..take]);
        train.extend_from_slice(&rows[take..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    Ok(Partition { train, test })
}

/// Share `n_test` rows between classes proportionally to their sizes.
///
/// Uses floor allocation followed by largest remainders (ties go to the
/// earlier class), and keeps at least one training row for every class with
/// more than one member.
fn allocate_test_rows(class_sizes: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = class_sizes.iter().sum();
    if n == 0 {
        return vec![0; class_sizes.len()];
    }
    let n_test = n_test.min(n);

    let cap = |size: usize| if size > 1 { size - 1 } else { size };
    let exact: Vec<f64> = class_sizes
        .iter()
        .map(|&size| size as f64 * n_test as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(class_sizes)
        .map(|(&e, &size)| (e.floor() as usize).min(cap(size)))
        .collect();

    let mut order: Vec<usize> = (0..class_sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remaining = n_test.saturating_sub(alloc.iter().sum());
    while remaining > 0 {
        let mut progressed = false;
        for &class in &order {
            if remaining == 0 {
                break;
            }
            if alloc[class] < cap(class_sizes[class]) {
                alloc[class] += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{FeatureColumn, FeatureKind};

    fn dataset(counts: &[(&str, usize)]) -> Dataset {
        let mut ids = Vec::new();
        let mut target = Vec::new();
        for (label, count) in counts {
            for i in 0..*count {
                ids.push(format!("{}{}", label, i));
                target.push(label.to_string());
            }
        }
        let n = ids.len();
        let col = FeatureColumn::new("f", FeatureKind::Numeric, vec!["0".to_string(); n]);
        Dataset::new("toy", ids, target, vec![col]).unwrap()
    }

    fn assert_disjoint_and_exhaustive(split: &Partition, n: usize) {
        let train: HashSet<usize> = split.train.iter().copied().collect();
        let test: HashSet<usize> = split.test.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), n);
        assert_eq!(split.train.len() + split.test.len(), n);
    }

    #[test]
    fn stratified_split_preserves_proportions() {
        let ds = dataset(&[("A", 50), ("B", 30), ("C", 20)]);
        let mode = PartitionMode::Stratified { fraction: 0.2, seed: 42 };
        let split = partition(&ds, &mode).unwrap();
        assert_disjoint_and_exhaustive(&split, 100);
        assert_eq!(split.test.len(), 20);

        let count = |label: &str| split.test.iter().filter(|&&r| ds.target[r] == label).count();
        assert_eq!(count("A"), 10);
        assert_eq!(count("B"), 6);
        assert_eq!(count("C"), 4);
    }

    #[test]
    fn stratified_split_is_reproducible() {
        let ds = dataset(&[("A", 17), ("B", 13)]);
        let mode = PartitionMode::Stratified { fraction: 0.3, seed: 7 };
        assert_eq!(partition(&ds, &mode).unwrap(), partition(&ds, &mode).unwrap());
    }

    #[test]
    fn explicit_split_ignores_unknown_ids() {
        let ds = dataset(&[("A", 5), ("B", 5)]);
        let ids: HashSet<String> = ["A0", "B3", "missing"].iter().map(|s| s.to_string()).collect();
        let split = partition(&ds, &PartitionMode::Explicit(Arc::new(ids))).unwrap();
        assert_disjoint_and_exhaustive(&split, 10);
        let test_ids: Vec<&str> = split.test.iter().map(|&r| ds.ids[r].as_str()).collect();
        assert_eq!(test_ids, vec!["A0", "B3"]);
        assert!(split.train.iter().all(|&r| ds.ids[r] != "A0" && ds.ids[r] != "B3"));
    }

    #[test]
    fn explicit_split_without_matches_is_empty_partition() {
        let ds = dataset(&[("A", 5)]);
        let ids: HashSet<String> = ["zzz".to_string()].into_iter().collect();
        let err = partition(&ds, &PartitionMode::Explicit(Arc::new(ids))).unwrap_err();
        assert!(matches!(err, SweepError::Data(_)));
    }

    #[test]
    fn explicit_split_rejects_duplicate_ids() {
        let mut ds = dataset(&[("A", 3)]);
        ds.ids[2] = ds.ids[0].clone();
        let ids: HashSet<String> = ["A1".to_string()].into_iter().collect();
        let err = partition(&ds, &PartitionMode::Explicit(Arc::new(ids))).unwrap_err();
        assert!(matches!(err, SweepError::Data(_)));
    }

    #[test]
    fn allocation_keeps_a_training_row_per_class() {
        assert_eq!(allocate_test_rows(&[2, 2], 4), vec![1, 1]);
        assert_eq!(allocate_test_rows(&[10, 10, 1], 3), vec![2, 1, 0]);
    }
}
