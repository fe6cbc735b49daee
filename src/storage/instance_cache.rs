//! On-disk cache of per-dataset candidate matrices.
//!
//! Each dataset owns two artifacts in the instances directory: a bincode
//! file that is authoritative for loading and an ARFF file that feeds the
//! background model merge.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::MetaFeatConfig;
use crate::data::matrix::FeatureMatrix;
use crate::error::{MetaFeatError, Result};
use crate::pipeline::manager::{MatrixStore, StoreOutcome};
use crate::utils::arff::write_arff_file;

pub const INSTANCES_SUFFIX: &str = "_candidateAttributesData";
pub const BINARY_EXTENSION: &str = "bin";
pub const TEXT_EXTENSION: &str = "arff";

/// `{dataset}_candidateAttributesData.arff`
pub fn text_artifact_name(dataset: &str) -> String {
    format!("{}{}.{}", dataset, INSTANCES_SUFFIX, TEXT_EXTENSION)
}

#[derive(Debug, Clone)]
pub struct InstanceMatrixCache {
    dir: PathBuf,
}

impl InstanceMatrixCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &MetaFeatConfig) -> Self {
        Self::new(&config.instances_dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn binary_path(&self, dataset: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", dataset, INSTANCES_SUFFIX, BINARY_EXTENSION))
    }

    pub fn text_path(&self, dataset: &str) -> PathBuf {
        self.dir.join(text_artifact_name(dataset))
    }

    fn read_binary(path: &Path) -> Result<FeatureMatrix> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        bincode::deserialize(&bytes).map_err(|e| MetaFeatError::CacheCorruption {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Sibling of `path` used while the artifact is being written.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

impl MatrixStore for InstanceMatrixCache {
    fn load(&self, dataset: &str) -> Result<Option<FeatureMatrix>> {
        let path = self.binary_path(dataset);
        if !path.is_file() {
            return Ok(None);
        }
        match Self::read_binary(&path) {
            Ok(matrix) => Ok(Some(matrix)),
            Err(e) => {
                warn!(dataset, path = %path.display(), error = %e, "error reading cached instances, regenerating");
                Ok(None)
            }
        }
    }

    fn store(&self, dataset: &str, matrix: &FeatureMatrix) -> Result<StoreOutcome> {
        let binary = self.binary_path(dataset);
        if binary.exists() {
            debug!(dataset, path = %binary.display(), "binary artifact exists, not overwriting");
            return Ok(StoreOutcome::AlreadyPresent);
        }
        fs::create_dir_all(&self.dir)?;

        let text = self.text_path(dataset);
        let text_staging = staging_path(&text);
        let binary_staging = staging_path(&binary);

        write_arff_file(matrix, &text_staging)?;
        let bytes = bincode::serialize(matrix)?;
        let mut file = File::create(&binary_staging)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        // Text first: a visible binary always has its text partner.
        fs::rename(&text_staging, &text)?;
        fs::rename(&binary_staging, &binary)?;
        debug!(dataset, rows = matrix.n_rows(), "cached candidate matrix");
        Ok(StoreOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::matrix::ColumnDescriptor;
    use ndarray::array;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::new(
            "trainingSet",
            vec![ColumnDescriptor::real("0"), ColumnDescriptor::categorical("1", 2)],
            array![[0.25, 1.0], [0.75, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InstanceMatrixCache::new(dir.path());
        assert!(cache.load("iris").unwrap().is_none());

        assert_eq!(cache.store("iris", &matrix()).unwrap(), StoreOutcome::Written);
        assert!(cache.text_path("iris").is_file());
        assert_eq!(cache.load("iris").unwrap(), Some(matrix()));
        assert!(!staging_path(&cache.binary_path("iris")).exists());
    }

    #[test]
    fn existing_artifact_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InstanceMatrixCache::new(dir.path());
        cache.store("iris", &matrix()).unwrap();
        let first = fs::read(cache.binary_path("iris")).unwrap();

        let other = FeatureMatrix::new("trainingSet", vec![ColumnDescriptor::real("0")], array![[9.0]]).unwrap();
        assert_eq!(cache.store("iris", &other).unwrap(), StoreOutcome::AlreadyPresent);
        assert_eq!(fs::read(cache.binary_path("iris")).unwrap(), first);
    }

    #[test]
    fn corrupt_binary_is_a_miss_and_stays_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InstanceMatrixCache::new(dir.path());
        fs::write(cache.binary_path("wine"), b"not bincode").unwrap();

        assert!(cache.load("wine").unwrap().is_none());
        assert_eq!(fs::read(cache.binary_path("wine")).unwrap(), b"not bincode");
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InstanceMatrixCache::new(dir.path().join("nested").join("instances"));
        cache.store("glass", &matrix()).unwrap();
        assert!(cache.binary_path("glass").is_file());
    }
}
