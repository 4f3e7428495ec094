//! Integration tests for partitioning, the rarity filter, label spaces and
//! probability alignment.

use std::collections::HashSet;
use std::sync::Arc;

use tabsweep_classifiers::data_handling::{Dataset, FeatureColumn, FeatureKind, LabelSpace};
use tabsweep_classifiers::config::ModelKind;
use tabsweep_classifiers::evaluation::alignment::{align_probabilities, one_hot};
use tabsweep_classifiers::evaluation::evaluate;
use tabsweep_classifiers::math::Array2;
use tabsweep_classifiers::models::{Classifier, ClassifierFactory, ModelRegistry};
use tabsweep_classifiers::partition::{partition, Partition, PartitionMode};
use tabsweep_classifiers::SweepError;

fn dataset(counts: &[(&str, usize)]) -> Dataset {
    let mut ids = Vec::new();
    let mut target = Vec::new();
    let mut sex = Vec::new();
    for (label, n) in counts {
        for i in 0..*n {
            ids.push(format!("{}{}", label, i));
            target.push(label.to_string());
            sex.push(if i % 2 == 0 { "M" } else { "F" }.to_string());
        }
    }
    let features = vec![FeatureColumn::new("Sex", FeatureKind::Nominal, sex)];
    Dataset::new("cohort", ids, target, features).unwrap()
}

fn assert_disjoint_and_exhaustive(split: &Partition, n: usize) {
    let train: HashSet<usize> = split.train.iter().copied().collect();
    let test: HashSet<usize> = split.test.iter().copied().collect();
    assert!(train.is_disjoint(&test));
    assert_eq!(train.len() + test.len(), n);
    assert!(train.union(&test).all(|&r| r < n));
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

#[test]
fn both_modes_are_disjoint_and_exhaustive() {
    let data = dataset(&[("A", 33), ("B", 21), ("C", 12)]);
    let ids: HashSet<String> = ["A0", "B3", "C11", "missing"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for mode in [
        PartitionMode::Stratified {
            fraction: 0.3,
            seed: 1,
        },
        PartitionMode::Explicit(Arc::new(ids)),
    ] {
        let split = partition(&data, &mode).unwrap();
        assert_disjoint_and_exhaustive(&split, data.n_rows());
    }
}

#[test]
fn explicit_ids_land_in_test_only() {
    let data = dataset(&[("A", 10), ("B", 10)]);
    let ids: HashSet<String> = ["A1", "B9", "nope"].iter().map(|s| s.to_string()).collect();
    let split = partition(&data, &PartitionMode::Explicit(Arc::new(ids))).unwrap();

    let test_ids: Vec<&str> = split.test.iter().map(|&r| data.ids[r].as_str()).collect();
    assert_eq!(test_ids, vec!["A1", "B9"]);
    assert!(split
        .train
        .iter()
        .all(|&r| data.ids[r] != "A1" && data.ids[r] != "B9"));
}

#[test]
fn explicit_ids_matching_every_row_leave_train_empty() {
    let data = dataset(&[("A", 2)]);
    let ids: HashSet<String> = data.ids.iter().cloned().collect();
    assert!(matches!(
        partition(&data, &PartitionMode::Explicit(Arc::new(ids))),
        Err(SweepError::Data(_))
    ));
}

#[test]
fn stratified_split_keeps_class_proportions() {
    let data = dataset(&[("A", 60), ("B", 30), ("C", 10)]);
    let split = partition(
        &data,
        &PartitionMode::Stratified {
            fraction: 0.2,
            seed: 42,
        },
    )
    .unwrap();
    let count = |rows: &[usize], label: &str| rows.iter().filter(|&&r| data.target[r] == label).count();
    assert_eq!(count(&split.test, "A"), 12);
    assert_eq!(count(&split.test, "B"), 6);
    assert_eq!(count(&split.test, "C"), 2);
}

// ---------------------------------------------------------------------------
// Rarity filter and label space
// ---------------------------------------------------------------------------

#[test]
fn rarity_filter_yields_two_class_problem() {
    let data = dataset(&[("A", 50), ("B", 40), ("C", 5)]);
    let (working, dropped) = data.filter_rare_classes(10);

    assert_eq!(dropped, vec![("C".to_string(), 5)]);
    assert_eq!(working.n_rows(), 90);
    assert!(working.class_counts().values().all(|&n| n >= 10));

    let space = LabelSpace::from_targets(working.target.as_slice());
    assert_eq!(space.labels(), &["A".to_string(), "B".to_string()]);
}

#[test]
fn label_space_does_not_depend_on_the_test_fold() {
    let data = dataset(&[("A", 40), ("B", 12), ("C", 12)]);
    let space = LabelSpace::from_targets(data.target.as_slice());
    // a fold holding only class A still binarizes over three labels
    let ids: HashSet<String> = (0..5).map(|i| format!("A{}", i)).collect();
    let split = partition(&data, &PartitionMode::Explicit(Arc::new(ids))).unwrap();
    let fold: Vec<&str> = split.test.iter().map(|&r| data.target[r].as_str()).collect();
    assert_eq!(LabelSpace::from_targets(fold.as_slice()).len(), 1);
    assert_eq!(space.len(), 3);

    let y = space.encode(data.target.as_slice()).unwrap();
    let x = data.encode_features();
    let train_x = x.select_rows(&split.train);
    let test_x = x.select_rows(&split.test);
    let train_y: Vec<usize> = split.train.iter().map(|&r| y[r]).collect();
    let test_y: Vec<usize> = split.test.iter().map(|&r| y[r]).collect();

    let onehot = one_hot(&test_y, space.len()).unwrap();
    assert_eq!(onehot.shape(), (5, 3));

    let mut classifier = ModelRegistry::default()
        .create(ModelKind::HistGb, space.len())
        .unwrap();
    classifier.fit(&train_x, &train_y).unwrap();
    let report = evaluate(
        classifier.as_ref(),
        &test_x,
        &test_y,
        &space,
        &data.feature_names(),
    )
    .unwrap();

    assert_eq!(report.labels.len(), 3);
    assert_eq!(report.confusion_matrix.n_classes, 3);
    assert_eq!(report.confusion_matrix.counts.len(), 3);
    assert!(report.confusion_matrix.counts.iter().all(|row| row.len() == 3));
    assert_eq!(report.confusion_matrix.total(), 5);
    // one class in the fold leaves ranking metrics undefined
    assert!(report.macro_auc.is_none());
    assert!(report.macro_pr_auc.is_none());
    assert!(report.undefined_metrics.contains(&"macro_auc".to_string()));
}

// ---------------------------------------------------------------------------
// Probability alignment
// ---------------------------------------------------------------------------

#[test]
fn unobserved_columns_are_exactly_zero() {
    // classifier saw codes 1 and 3 of a five-class label space
    let proba = Array2::from_shape_vec((3, 2), vec![0.25, 0.75, 0.5, 0.5, 1.0, 0.0]).unwrap();
    let aligned = align_probabilities(&proba, &[1, 3], 5).unwrap();

    assert_eq!(aligned.shape(), (3, 5));
    for row in 0..3 {
        for col in [0, 2, 4] {
            assert_eq!(aligned[(row, col)], 0.0);
        }
    }
    assert_eq!(aligned[(0, 3)], 0.75);
    assert_eq!(aligned[(2, 1)], 1.0);
}

#[test]
fn aligned_rows_are_not_renormalised() {
    // backend probabilities over its own classes that do not sum to one
    let proba = Array2::from_shape_vec((1, 2), vec![0.3, 0.4]).unwrap();
    let aligned = align_probabilities(&proba, &[0, 2], 3).unwrap();
    let sum: f64 = aligned.row_slice(0).iter().sum();
    assert!((sum - 0.7).abs() < 1e-12);
}
