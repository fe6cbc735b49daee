use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{MetaFeatError, Result};
use crate::models::base_model::{check_training_input, Classifier};

/// One-vs-rest linear SVM trained with Pegasos sub-gradient steps.
/// Margins are squashed with a logistic function to give class scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    lambda: f64,
    epochs: usize,
    seed: u64,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// One weight vector per class, bias last.
    weights: Vec<Vec<f64>>,
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearSvm {
    pub fn new() -> Self {
        LinearSvm {
            lambda: 1e-2,
            epochs: 20,
            seed: 1,
            means: Vec::new(),
            scales: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs.max(1);
        self
    }

    fn standardize(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut z = x.to_owned();
        for (j, mut col) in z.columns_mut().into_iter().enumerate() {
            // Missing values sit at the column mean
            col.mapv_inplace(|v| if v.is_finite() { (v - self.means[j]) / self.scales[j] } else { 0.0 });
        }
        z
    }

    fn margin(w: &[f64], sample: &[f64]) -> f64 {
        dot(&w[..sample.len()], sample) + w[w.len() - 1]
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl Classifier for LinearSvm {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        check_training_input("SVM", &x, y, n_classes)?;
        let n_samples = y.len();
        let n_features = x.ncols();

        let (means, scales): (Vec<f64>, Vec<f64>) = x
            .columns()
            .into_iter()
            .map(|c| {
                let present: Vec<f64> = c.iter().copied().filter(|v| v.is_finite()).collect();
                if present.is_empty() {
                    return (0.0, 1.0);
                }
                let n = present.len() as f64;
                let mean = present.iter().sum::<f64>() / n;
                let sd = (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                (mean, if sd > 1e-12 { sd } else { 1.0 })
            })
            .unzip();
        self.means = means;
        self.scales = scales;
        let z = self.standardize(&x);
        // Constant 1.0 appended so the bias is learned like any other weight
        let rows: Vec<Vec<f64>> = z
            .rows()
            .into_iter()
            .map(|r| r.iter().copied().chain(std::iter::once(1.0)).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut weights = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let mut w = vec![0.0; n_features + 1];
            let steps = self.epochs * n_samples;
            for t in 1..=steps {
                let i = rng.gen_range(0..n_samples);
                let target = if y[i] == class { 1.0 } else { -1.0 };
                let eta = 1.0 / (self.lambda * t as f64);
                let violated = target * dot(&w, &rows[i]) < 1.0;

                w.iter_mut().for_each(|wj| *wj *= 1.0 - eta * self.lambda);
                if violated {
                    for (wj, xj) in w.iter_mut().zip(rows[i].iter()) {
                        *wj += eta * target * xj;
                    }
                }
            }
            weights.push(w);
        }
        self.weights = weights;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(MetaFeatError::ModelNotFitted);
        }
        if x.ncols() != self.means.len() {
            return Err(MetaFeatError::training(
                "SVM",
                format!("expected {} features, got {}", self.means.len(), x.ncols()),
            ));
        }
        let z = self.standardize(&x);
        let mut proba = Array2::zeros((x.nrows(), self.weights.len()));
        for (i, row) in z.rows().into_iter().enumerate() {
            let sample = row.to_vec();
            let scores: Vec<f64> = self
                .weights
                .iter()
                .map(|w| 1.0 / (1.0 + (-Self::margin(w, &sample)).exp()))
                .collect();
            let total: f64 = scores.iter().sum();
            for (c, s) in scores.iter().enumerate() {
                proba[[i, c]] = if total > 0.0 { s / total } else { 1.0 / scores.len() as f64 };
            }
        }
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn separates_linear_classes() {
        let x = array![[-2.0, 1.0], [-1.5, 0.0], [-1.0, -1.0], [1.0, 1.0], [1.5, 0.0], [2.0, -1.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut svm = LinearSvm::new().with_seed(5);
        svm.fit(x.view(), &y, 2).unwrap();
        assert_eq!(svm.predict(x.view()).unwrap(), y.to_vec());
    }

    #[test]
    fn constant_feature_does_not_blow_up() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = [0, 0, 1, 1];
        let mut svm = LinearSvm::new().with_epochs(5);
        svm.fit(x.view(), &y, 2).unwrap();
        let proba = svm.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn missing_values_score_as_the_column_mean() {
        let x = array![[-2.0, 1.0], [-1.5, f64::NAN], [-1.0, -1.0], [1.0, 1.0], [f64::NAN, 0.0], [2.0, -1.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut svm = LinearSvm::new().with_seed(5);
        svm.fit(x.view(), &y, 2).unwrap();
        let proba = svm.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
    }
}
