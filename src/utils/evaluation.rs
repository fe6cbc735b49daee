use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Per-class ROC areas of one train/test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEvaluation {
    per_class_auc: Vec<f64>,
    accuracy: f64,
}

impl ClassEvaluation {
    /// Build from class-probability predictions on a test set.
    pub fn from_probabilities(y_true: &[usize], proba: ArrayView2<f64>, n_classes: usize) -> Self {
        let mut per_class_auc = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let labels: Vec<bool> = y_true.iter().map(|&y| y == class).collect();
            let scores: Vec<f64> = if class < proba.ncols() {
                proba.column(class).to_vec()
            } else {
                vec![0.0; y_true.len()]
            };
            per_class_auc.push(calculate_auroc(&labels, &scores));
        }

        let correct = y_true
            .iter()
            .enumerate()
            .filter(|&(i, &y)| argmax(proba.row(i).iter().copied()) == Some(y))
            .count();
        let accuracy = if y_true.is_empty() { 0.0 } else { correct as f64 / y_true.len() as f64 };

        Self { per_class_auc, accuracy }
    }

    /// Use precomputed areas, e.g. from an external evaluator.
    pub fn from_class_aucs(per_class_auc: Vec<f64>) -> Self {
        Self { per_class_auc, accuracy: 0.0 }
    }

    pub fn area_under_roc(&self, class: usize) -> f64 {
        self.per_class_auc.get(class).copied().unwrap_or(0.5)
    }

    /// Arithmetic mean of the per-class areas over `n_classes` classes.
    pub fn mean_auc(&self, n_classes: usize) -> f64 {
        if n_classes == 0 {
            return 0.5;
        }
        (0..n_classes).map(|c| self.area_under_roc(c)).sum::<f64>() / n_classes as f64
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

pub(crate) fn argmax(values: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged.
/// Returns 0.5 when only one class is present.
pub fn calculate_auroc(true_labels: &[bool], scores: &[f64]) -> f64 {
    let n_pos = true_labels.iter().filter(|&&l| l).count();
    let n_neg = true_labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie block
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = true_labels
        .iter()
        .zip(ranks.iter())
        .filter(|&(&l, _)| l)
        .map(|(_, &r)| r)
        .sum();
    let n_pos = n_pos as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}
