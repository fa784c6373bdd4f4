use anyhow::bail;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            min_samples_split: 2,
            max_depth: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitChoice {
    feature: usize,
    threshold: f64,
    cost: f64,
}

/// CART tree with squared-error splits and mean-valued leaves. On a 0/1
/// target the leaf mean is the positive class frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn grow(
        x: ArrayView2<'_, f64>,
        y: &[f64],
        samples: Vec<usize>,
        max_features: usize,
        config: &ForestConfig,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf(0.0)];
        let mut pending = vec![(0usize, samples, 0usize)];

        while let Some((at, idx, depth)) = pending.pop() {
            let value = mean(y, &idx);
            let splittable = idx.len() >= config.min_samples_split
                && config.max_depth.is_none_or(|d| depth < d)
                && !is_pure(y, &idx);
            let choice = if splittable {
                best_split(x, y, &idx, max_features, rng)
            } else {
                None
            };

            let Some(choice) = choice else {
                nodes[at] = Node::Leaf(value);
                continue;
            };

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
                .iter()
                .copied()
                .partition(|&i| x[[i, choice.feature]] <= choice.threshold);
            let left = nodes.len();
            nodes.push(Node::Leaf(0.0));
            let right = nodes.len();
            nodes.push(Node::Leaf(0.0));
            nodes[at] = Node::Split {
                feature: choice.feature,
                threshold: choice.threshold,
                left,
                right,
            };
            pending.push((left, left_idx, depth + 1));
            pending.push((right, right_idx, depth + 1));
        }

        Self { nodes }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes[at] {
                Node::Leaf(v) => return v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

fn mean(y: &[f64], idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return 0.0;
    }
    idx.iter().map(|&i| y[i]).sum::<f64>() / idx.len() as f64
}

fn is_pure(y: &[f64], idx: &[usize]) -> bool {
    let Some(&first) = idx.first() else {
        return true;
    };
    idx.iter().all(|&i| (y[i] - y[first]).abs() <= f64::EPSILON)
}

fn best_split(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    idx: &[usize],
    max_features: usize,
    rng: &mut StdRng,
) -> Option<SplitChoice> {
    let n_features = x.ncols();
    // Visit features in random order; constant ones do not count towards
    // max_features, so a node only becomes a leaf when no feature varies.
    let order_of_features = rand::seq::index::sample(rng, n_features, n_features);

    let mut best: Option<SplitChoice> = None;
    let mut visited = 0;
    let mut order = idx.to_vec();
    for feature in order_of_features.iter() {
        if visited >= max_features && best.is_some() {
            break;
        }
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let (Some(&lo), Some(&hi)) = (order.first(), order.last()) else {
            break;
        };
        if x[[lo, feature]] == x[[hi, feature]] {
            continue;
        }
        visited += 1;

        let n = order.len() as f64;
        let total: f64 = order.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..order.len() - 1 {
            let yi = y[order[k]];
            left_sum += yi;
            left_sq += yi * yi;

            let here = x[[order[k], feature]];
            let next = x[[order[k + 1], feature]];
            if here == next {
                continue;
            }

            let left_n = (k + 1) as f64;
            let right_n = n - left_n;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let cost = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.is_none_or(|b| cost < b.cost) {
                let mid = here + (next - here) / 2.0;
                let threshold = if mid < next { mid } else { here };
                best = Some(SplitChoice {
                    feature,
                    threshold,
                    cost,
                });
            }
        }
    }
    best
}

/// Bagged ensemble of [`DecisionTree`]s. Each tree draws a bootstrap sample
/// and considers `sqrt(n_features)` candidate features per split.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(x: &Array2<f64>, y: &[f64], config: &ForestConfig) -> anyhow::Result<Self> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 {
            bail!("cannot fit a forest on zero rows");
        }
        if n_rows != y.len() {
            bail!("feature rows ({n_rows}) and targets ({}) differ", y.len());
        }
        if n_features == 0 {
            bail!("cannot fit a forest on zero features");
        }
        if config.n_trees == 0 {
            bail!("forest needs at least one tree");
        }

        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let trees: Vec<DecisionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                let bootstrap: Vec<usize> =
                    (0..n_rows).map(|_| rng.random_range(0..n_rows)).collect();
                DecisionTree::grow(x.view(), y, bootstrap, max_features, config, &mut rng)
            })
            .collect();

        Ok(Self { trees, n_features })
    }

    #[cfg(test)]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean leaf value across trees, clamped to `[0, 1]`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> anyhow::Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            bail!(
                "expected {} feature columns, got {}",
                self.n_features,
                x.ncols()
            );
        }
        let n_trees = self.trees.len() as f64;
        Ok(x.outer_iter()
            .map(|row| {
                let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                (total / n_trees).clamp(0.0, 1.0)
            })
            .collect())
    }
}
