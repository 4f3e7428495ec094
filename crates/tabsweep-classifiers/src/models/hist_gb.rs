//! Histogram-based gradient boosting with a softmax objective.
//!
//! Features are quantised once into at most 255 bins per column plus a
//! dedicated missing bin (bin 0). Each boosting round grows one depth-wise
//! regression tree per observed class on the softmax gradients, choosing
//! splits from per-bin gradient/hessian histograms.
use rayon::prelude::*;

use crate::config::{ModelConfig, ModelType};
use crate::error::{Result, SweepError};
use crate::math::Array2;
use crate::models::cancel::CancelToken;
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{
    argmax_classes, check_fit_input, check_predict_input, not_fitted, softmax_inplace,
};

const MISSING_BIN: u8 = 0;
const MIN_HESSIAN_TO_SPLIT: f64 = 1e-3;
const MIN_GAIN_TO_SPLIT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
struct HistParams {
    learning_rate: f64,
    max_depth: u32,
    num_boost_round: u32,
    max_bins: usize,
    min_samples_leaf: usize,
    l2_regularization: f64,
}

impl HistParams {
    fn from_config(config: &ModelConfig) -> Result<Self> {
        match &config.model_type {
            ModelType::HistGb {
                max_depth,
                num_boost_round,
                max_bins,
                min_samples_leaf,
                l2_regularization,
            } => Ok(HistParams {
                learning_rate: f64::from(config.learning_rate),
                max_depth: *max_depth,
                num_boost_round: *num_boost_round,
                max_bins: (*max_bins).clamp(2, 255),
                min_samples_leaf: (*min_samples_leaf).max(1),
                l2_regularization: l2_regularization.max(0.0),
            }),
            other => Err(SweepError::Configuration(format!(
                "Expected HistGb params, got {:?}",
                other.kind()
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        /// Rows with `bin <= threshold` go left; the missing bin always does.
        threshold: u8,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Default)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, bins: &[u8]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if bins[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Upper bin edges per feature, learnt from the training data.
#[derive(Debug, Clone, Default)]
struct BinMapper {
    edges: Vec<Vec<f32>>,
}

impl BinMapper {
    fn fit(x: &Array2<f32>, max_bins: usize) -> Self {
        let edges = (0..x.ncols())
            .map(|col| {
                let mut values: Vec<f32> =
                    x.column(col).into_iter().filter(|v| !v.is_nan()).collect();
                values.sort_by(|a, b| a.total_cmp(b));
                values.dedup();
                feature_edges(&values, max_bins)
            })
            .collect();
        BinMapper { edges }
    }

    fn n_bins(&self, feature: usize) -> usize {
        // missing bin + one bin per edge + the open-ended last bin
        self.edges[feature].len() + 2
    }

    fn bin(&self, feature: usize, value: f32) -> u8 {
        if value.is_nan() {
            return MISSING_BIN;
        }
        let edges = &self.edges[feature];
        (1 + edges.partition_point(|&e| e < value)) as u8
    }

    /// Column-major binned copy of `x`.
    fn transform(&self, x: &Array2<f32>) -> Vec<Vec<u8>> {
        (0..x.ncols())
            .map(|col| {
                (0..x.nrows())
                    .map(|row| self.bin(col, x[(row, col)]))
                    .collect()
            })
            .collect()
    }
}

/// Split points between sorted distinct values; quantiles when there are
/// more distinct values than bins.
fn feature_edges(distinct: &[f32], max_bins: usize) -> Vec<f32> {
    if distinct.len() <= 1 {
        return Vec::new();
    }
    if distinct.len() <= max_bins {
        return distinct
            .windows(2)
            .map(|w| w[0] + (w[1] - w[0]) / 2.0)
            .collect();
    }
    let mut edges: Vec<f32> = (1..max_bins)
        .map(|q| {
            let pos = q * (distinct.len() - 1) / max_bins;
            distinct[pos] + (distinct[pos + 1] - distinct[pos]) / 2.0
        })
        .collect();
    edges.dedup();
    edges
}

#[derive(Debug, Clone, Copy, Default)]
struct HistBin {
    grad: f64,
    hess: f64,
    count: usize,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: u8,
    gain: f64,
}

struct TreeGrower<'a> {
    binned: &'a [Vec<u8>],
    mapper: &'a BinMapper,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a HistParams,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl<'a> TreeGrower<'a> {
    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        -self.params.learning_rate * g / (h + self.params.l2_regularization)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.l2_regularization)
    }

    fn best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let min_leaf = self.params.min_samples_leaf;
        let parent_score = self.score(g_total, h_total);
        let mut best: Option<SplitCandidate> = None;

        for (feature, column) in self.binned.iter().enumerate() {
            let n_bins = self.mapper.n_bins(feature);
            if n_bins <= 2 {
                continue;
            }
            let mut hist = vec![HistBin::default(); n_bins];
            for &row in rows {
                let bin = &mut hist[column[row] as usize];
                bin.grad += self.grad[row];
                bin.hess += self.hess[row];
                bin.count += 1;
            }

            let mut left = HistBin::default();
            for (threshold, bin) in hist.iter().enumerate().take(n_bins - 1) {
                left.grad += bin.grad;
                left.hess += bin.hess;
                left.count += bin.count;
                let right_count = rows.len() - left.count;
                let right_hess = h_total - left.hess;
                if left.count < min_leaf || right_count < min_leaf {
                    continue;
                }
                if left.hess < MIN_HESSIAN_TO_SPLIT || right_hess < MIN_HESSIAN_TO_SPLIT {
                    continue;
                }
                let gain = self.score(left.grad, left.hess)
                    + self.score(g_total - left.grad, right_hess)
                    - parent_score;
                if gain > MIN_GAIN_TO_SPLIT && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: threshold as u8,
                        gain,
                    });
                }
            }
        }
        best
    }

    fn grow(&mut self, rows: Vec<usize>, depth: u32) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(g, h),
        });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf {
            return idx;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let column = &self.binned[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| column[r] <= split.threshold);
        self.gains[split.feature] += split.gain;

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

/// Histogram gradient boosting classifier.
pub struct HistGbClassifier {
    params: ModelConfig,
    classes: Vec<usize>,
    num_classes: usize,
    n_features: usize,
    mapper: BinMapper,
    base_scores: Vec<f64>,
    /// `trees[round][class]`
    trees: Vec<Vec<Tree>>,
    gains: Vec<f64>,
    fitted: bool,
}

impl HistGbClassifier {
    /// Classifier over a label space of `num_classes` category codes.
    pub fn new(params: ModelConfig, num_classes: usize) -> Self {
        HistGbClassifier {
            params,
            classes: Vec::new(),
            num_classes,
            n_features: 0,
            mapper: BinMapper::default(),
            base_scores: Vec::new(),
            trees: Vec::new(),
            gains: Vec::new(),
            fitted: false,
        }
    }

    fn raw_scores(&self, binned: &[Vec<u8>], n_rows: usize) -> Vec<Vec<f64>> {
        let mut row_bins = vec![0u8; self.n_features];
        (0..n_rows)
            .map(|row| {
                for (feature, column) in binned.iter().enumerate() {
                    row_bins[feature] = column[row];
                }
                let mut scores = self.base_scores.clone();
                for round in &self.trees {
                    for (k, tree) in round.iter().enumerate() {
                        scores[k] += tree.predict_row(&row_bins);
                    }
                }
                scores
            })
            .collect()
    }
}

impl Classifier for HistGbClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[usize]) -> Result<()> {
        self.fit_until(x, y, &CancelToken::default())
    }

    fn fit_until(&mut self, x: &Array2<f32>, y: &[usize], cancel: &CancelToken) -> Result<()> {
        let params = HistParams::from_config(&self.params)?;
        self.fitted = false;
        self.classes = check_fit_input(x, y, self.num_classes)?;
        self.n_features = x.ncols();
        self.trees.clear();
        self.gains = vec![0.0; x.ncols()];

        let n_rows = x.nrows();
        let n_classes = self.classes.len();
        let targets: Vec<usize> = y
            .iter()
            .map(|label| self.classes.binary_search(label).unwrap_or(0))
            .collect();

        let mut counts = vec![0usize; n_classes];
        targets.iter().for_each(|&k| counts[k] += 1);
        self.base_scores = counts
            .iter()
            .map(|&c| (c as f64 / n_rows as f64).ln())
            .collect();

        self.mapper = BinMapper::fit(x, params.max_bins);
        if n_classes < 2 {
            self.fitted = true;
            return Ok(());
        }
        let binned = self.mapper.transform(x);

        let mut scores: Vec<Vec<f64>> = vec![self.base_scores.clone(); n_rows];
        for round in 0..params.num_boost_round {
            cancel.check()?;
            let mut proba = scores.clone();
            proba.iter_mut().for_each(|row| softmax_inplace(row));

            let fitted: Vec<(Tree, Vec<f64>)> = (0..n_classes)
                .into_par_iter()
                .map(|k| {
                    let grad: Vec<f64> = (0..n_rows)
                        .map(|i| proba[i][k] - if targets[i] == k { 1.0 } else { 0.0 })
                        .collect();
                    let hess: Vec<f64> = (0..n_rows)
                        .map(|i| (proba[i][k] * (1.0 - proba[i][k])).max(1e-16))
                        .collect();
                    let mut grower = TreeGrower {
                        binned: &binned,
                        mapper: &self.mapper,
                        grad: &grad,
                        hess: &hess,
                        params: &params,
                        nodes: Vec::new(),
                        gains: vec![0.0; binned.len()],
                    };
                    grower.grow((0..n_rows).collect(), 0);
                    (Tree { nodes: grower.nodes }, grower.gains)
                })
                .collect();

            let mut round_trees = Vec::with_capacity(n_classes);
            for (tree, gains) in fitted {
                for (total, g) in self.gains.iter_mut().zip(gains) {
                    *total += g;
                }
                round_trees.push(tree);
            }

            let mut row_bins = vec![0u8; self.n_features];
            for (i, row_scores) in scores.iter_mut().enumerate() {
                for (feature, column) in binned.iter().enumerate() {
                    row_bins[feature] = column[i];
                }
                for (k, tree) in round_trees.iter().enumerate() {
                    row_scores[k] += tree.predict_row(&row_bins);
                }
            }
            self.trees.push(round_trees);
            log::trace!("histgb round {} complete", round + 1);
        }

        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(not_fitted(self.name()));
        }
        check_predict_input(x, self.n_features)?;

        let n_classes = self.classes.len();
        if n_classes == 1 {
            return Array2::from_shape_vec((x.nrows(), 1), vec![1.0; x.nrows()])
                .map_err(|e| SweepError::Model(e.to_string()));
        }

        let binned = self.mapper.transform(x);
        let mut rows = self.raw_scores(&binned, x.nrows());
        rows.iter_mut().for_each(|row| softmax_inplace(row));
        Array2::from_rows(rows, n_classes).map_err(|e| SweepError::Model(e.to_string()))
    }

    fn classes(&self) -> &[usize] {
        &self.classes
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        if !self.fitted {
            return None;
        }
        let total: f64 = self.gains.iter().sum();
        if total > 0.0 {
            Some(self.gains.iter().map(|g| g / total).collect())
        } else {
            Some(vec![0.0; self.gains.len()])
        }
    }

    fn name(&self) -> &str {
        "histgb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;

    fn small_config() -> ModelConfig {
        ModelConfig::new(
            0.3,
            ModelType::HistGb {
                max_depth: 3,
                num_boost_round: 20,
                max_bins: 16,
                min_samples_leaf: 2,
                l2_regularization: 1.0,
            },
        )
    }

    /// Class is decided by the first feature; the second is noise-free constant.
    fn three_class_data() -> (Array2<f32>, Vec<usize>) {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for i in 0..60 {
            let class = i % 3;
            data.push(class as f32 * 5.0 + (i % 7) as f32 * 0.1);
            data.push(0.5);
            y.push(class);
        }
        (Array2::from_shape_vec((60, 2), data).unwrap(), y)
    }

    #[test]
    fn learns_a_separable_problem() {
        let (x, y) = three_class_data();
        let mut model = HistGbClassifier::new(small_config(), 4);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.shape(), (60, 3));
        for row in 0..60 {
            assert!((proba.row_slice(row).iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn importances_favour_the_informative_feature() {
        let (x, y) = three_class_data();
        let mut model = HistGbClassifier::new(small_config(), 4);
        model.fit(&x, &y).unwrap();
        let importances = model.feature_importances().unwrap();
        assert_eq!(importances.len(), 2);
        assert!(importances[0] > 0.99);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn observed_classes_may_be_a_subset_of_the_label_space() {
        let (x, y) = three_class_data();
        let y: Vec<usize> = y.iter().map(|&c| if c == 1 { 3 } else { c }).collect();
        let mut model = HistGbClassifier::new(small_config(), 4);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.classes(), &[0, 2, 3]);
        assert_eq!(model.predict_proba(&x).unwrap().ncols(), 3);
    }

    #[test]
    fn missing_values_use_their_own_bin() {
        let x = Array2::from_shape_vec(
            (8, 1),
            vec![f32::NAN, f32::NAN, f32::NAN, f32::NAN, 1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let y = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let params = ModelConfig::new(
            0.5,
            ModelType::HistGb {
                max_depth: 2,
                num_boost_round: 10,
                max_bins: 8,
                min_samples_leaf: 1,
                l2_regularization: 0.0,
            },
        );
        let mut model = HistGbClassifier::new(params, 2);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn quantile_edges_are_capped_by_max_bins() {
        let distinct: Vec<f32> = (0..1000).map(|v| v as f32).collect();
        let edges = feature_edges(&distinct, 16);
        assert!(edges.len() <= 15);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn cancellation_is_checked_between_rounds() {
        let (x, y) = three_class_data();
        let mut model = HistGbClassifier::new(small_config(), 3);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            model.fit_until(&x, &y, &cancel),
            Err(SweepError::Cancelled)
        ));
        assert!(model.predict(&x).is_err());

        model.fit_until(&x, &y, &CancelToken::new()).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn labels_beyond_the_configured_label_space_fail() {
        let (x, y) = three_class_data();
        let mut model = HistGbClassifier::new(small_config(), 2);
        assert!(matches!(model.fit(&x, &y), Err(SweepError::Model(_))));
    }

    #[test]
    fn wrong_params_are_a_configuration_error() {
        let mut model = HistGbClassifier::new(ModelConfig::default_for(ModelKind::Gbdt), 2);
        let x = Array2::from_shape_vec((2, 1), vec![0.0, 1.0]).unwrap();
        assert!(matches!(model.fit(&x, &[0, 1]), Err(SweepError::Configuration(_))));
    }
}
