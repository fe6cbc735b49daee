//! Leave-one-dataset-out meta-classifier.
//!
//! The background model for a dataset is a random forest trained on the
//! text artifacts of every other dataset in the instances directory. It is
//! cached in the background directory and reused on later calls.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ExclusionPolicy, MetaFeatConfig};
use crate::data::attributes::AttributeRow;
use crate::data::matrix::{FeatureMatrix, FeatureMatrixBuilder};
use crate::error::{MetaFeatError, Result};
use crate::models::base_model::Classifier;
use crate::models::random_forest::RandomForest;
use crate::storage::instance_cache::{text_artifact_name, TEXT_EXTENSION};
use crate::utils::arff::{append_arff, arff_shape, read_arff_file};

const MODEL_PREFIX: &str = "_background_";
const MODEL_SUFFIX: &str = "_classifier_obj";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundModel {
    dataset: String,
    n_features: usize,
    forest: RandomForest,
}

impl BackgroundModel {
    /// Dataset this model was built for (and excludes).
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.forest.predict_proba(x)
    }

    /// Probability of the positive label for each row of `matrix`. A
    /// trailing label column is ignored.
    pub fn score_matrix(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        let x = if matrix.n_cols() == self.n_features + 1 {
            matrix.features()
        } else if matrix.n_cols() == self.n_features {
            matrix.data().view()
        } else {
            return Err(MetaFeatError::Dataset(format!(
                "background model for {} expects {} features, got {}",
                self.dataset,
                self.n_features,
                matrix.n_cols()
            )));
        };
        let proba = self.predict_proba(x)?;
        let positive = proba.ncols().saturating_sub(1).min(1);
        Ok(proba.column(positive).to_vec())
    }

    /// Score candidate rows one at a time.
    pub fn score_rows(&self, rows: &[AttributeRow]) -> Result<Vec<f64>> {
        let builder = FeatureMatrixBuilder::default();
        rows.iter()
            .map(|row| {
                let single = builder.build_single(row)?;
                Ok(self.score_matrix(&single)?[0])
            })
            .collect()
    }
}

/// Which text artifacts went into a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
    /// Files the exact and substring rules disagree on.
    pub ambiguous: Vec<String>,
    /// Files with no attributes or no data rows.
    pub empty: Vec<String>,
    /// Files whose attribute count differs from the first included file.
    pub incompatible: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackgroundModelBuilder {
    instances_dir: PathBuf,
    background_dir: PathBuf,
    policy: ExclusionPolicy,
    n_trees: usize,
    num_threads: usize,
    seed: u64,
}

impl BackgroundModelBuilder {
    pub fn new(config: &MetaFeatConfig) -> Self {
        Self {
            instances_dir: config.instances_dir.clone(),
            background_dir: config.background_dir.clone(),
            policy: config.exclusion_policy,
            n_trees: config.background_trees,
            num_threads: config.num_threads,
            seed: config.random_seed,
        }
    }

    pub fn with_policy(mut self, policy: ExclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model_path(&self, dataset: &str) -> PathBuf {
        self.background_dir
            .join(format!("{}{}{}", MODEL_PREFIX, dataset, MODEL_SUFFIX))
    }

    /// Transient merged training file next to the model.
    pub fn merge_path(&self, dataset: &str) -> PathBuf {
        let mut name = self.model_path(dataset).into_os_string();
        name.push(".");
        name.push(TEXT_EXTENSION);
        PathBuf::from(name)
    }

    pub fn build(&self, dataset: &str) -> Result<BackgroundModel> {
        self.build_with_report(dataset).map(|(model, _)| model)
    }

    /// Like [`build`](Self::build); the report is `None` when a cached
    /// model was reused.
    pub fn build_with_report(&self, dataset: &str) -> Result<(BackgroundModel, Option<MergeReport>)> {
        let path = self.model_path(dataset);
        let mut keep_existing = false;
        if path.is_file() {
            match Self::read_model(&path) {
                Ok(model) => {
                    info!(dataset, path = %path.display(), "reusing background model");
                    return Ok((model, None));
                }
                Err(e) => {
                    warn!(dataset, path = %path.display(), error = %e, "error reading background model, retraining");
                    keep_existing = true;
                }
            }
        }

        let merge_path = self.merge_path(dataset);
        let report = self.merge_artifacts(dataset, &merge_path)?;
        if report.included.is_empty() {
            return Err(MetaFeatError::Dataset(format!(
                "no instance matrices available for the background model of {}",
                dataset
            )));
        }

        let merged = read_arff_file(&merge_path);
        if let Err(e) = fs::remove_file(&merge_path) {
            warn!(path = %merge_path.display(), error = %e, "could not remove merged training file");
        }
        let merged = merged?;
        let model = self.train(dataset, &merged)?;

        if !keep_existing {
            fs::create_dir_all(&self.background_dir)?;
            let staging = merge_path.with_extension("tmp");
            let mut file = File::create(&staging)?;
            file.write_all(&bincode::serialize(&model)?)?;
            file.sync_all()?;
            fs::rename(&staging, &path)?;
        }
        info!(dataset, files = report.included.len(), rows = merged.n_rows(), "background model trained");
        Ok((model, Some(report)))
    }

    /// Concatenate every eligible text artifact into `target`. The header
    /// comes from the first non-empty file only; files that are empty or
    /// disagree with it on the attribute count are left out.
    pub fn merge_artifacts(&self, dataset: &str, target: &Path) -> Result<MergeReport> {
        let own_artifact = text_artifact_name(dataset);
        let mut files: Vec<PathBuf> = fs::read_dir(&self.instances_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.as_path() != target)
            .collect();
        files.sort();

        let mut report = MergeReport::default();
        let mut writer: Option<BufWriter<File>> = None;
        let mut n_attributes = 0;
        for file in files {
            let name = match file.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if file.extension().and_then(|e| e.to_str()) != Some(TEXT_EXTENSION) {
                debug!(file = %name, "skipping file");
                continue;
            }

            let by_substring = name.contains(dataset);
            let by_exact = name == own_artifact;
            if by_substring != by_exact {
                if self.policy == ExclusionPolicy::Exact {
                    warn!(dataset, file = %name, "substring exclusion would have left this file out");
                }
                report.ambiguous.push(name.clone());
            }
            let excluded = match self.policy {
                ExclusionPolicy::Exact => by_exact,
                ExclusionPolicy::Substring => by_substring,
            };
            if excluded {
                debug!(dataset, file = %name, "skipping file");
                report.excluded.push(name);
                continue;
            }

            let shape = arff_shape(&file)?;
            if shape.is_empty() {
                warn!(dataset, file = %name, "skipping empty instance matrix");
                report.empty.push(name);
                continue;
            }
            let include_header = writer.is_none();
            if include_header {
                n_attributes = shape.attributes;
            } else if shape.attributes != n_attributes {
                warn!(
                    dataset,
                    file = %name,
                    expected = n_attributes,
                    found = shape.attributes,
                    "skipping instance matrix with a different attribute count"
                );
                report.incompatible.push(name);
                continue;
            }
            if include_header {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                writer = Some(BufWriter::new(File::create(target)?));
            }
            if let Some(out) = writer.as_mut() {
                append_arff(out, &file, include_header)?;
            }
            report.included.push(name);
        }

        if let Some(mut out) = writer {
            out.flush()?;
        }
        Ok(report)
    }

    fn train(&self, dataset: &str, merged: &FeatureMatrix) -> Result<BackgroundModel> {
        let n_classes = merged.label_cardinality();
        if n_classes == 0 || merged.is_empty() {
            return Err(MetaFeatError::training(
                "RandomForest",
                "merged training data has no rows or no nominal label",
            ));
        }
        let mut forest = RandomForest::new(self.n_trees)
            .with_num_threads(self.num_threads)
            .with_seed(self.seed);
        forest.fit(merged.features(), &merged.label_codes(), n_classes)?;
        Ok(BackgroundModel {
            dataset: dataset.to_string(),
            n_features: merged.n_cols() - 1,
            forest,
        })
    }

    fn read_model(path: &Path) -> Result<BackgroundModel> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        bincode::deserialize(&bytes).map_err(|e| MetaFeatError::CacheCorruption {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
