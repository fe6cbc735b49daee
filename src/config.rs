//! Run configuration, threaded explicitly through every component.
//!
//! Values are read from Java-style `key=value` properties text so existing
//! pipeline configuration files can be reused unchanged.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{MetaFeatError, Result};
use crate::models::base_model::{ClassifierKind, ClassifierParams};

pub const INSTANCES_DIR_KEY: &str = "DatasetInstancesFilesLocation";
pub const BACKGROUND_DIR_KEY: &str = "backgroundClassifierLocation";
pub const CLASSIFIERS_KEY: &str = "classifiersForMLAttributesGeneration";
pub const MAX_SOURCE_ATTS_KEY: &str = "maxNumOfAttsInOperatorSource";
pub const NUM_THREADS_KEY: &str = "numOfThreads";
pub const EVALUATION_THREADS_KEY: &str = "evaluationThreads";
pub const EXCLUSION_POLICY_KEY: &str = "backgroundExclusionPolicy";
pub const BACKGROUND_TREES_KEY: &str = "backgroundTrees";
pub const RANDOM_SEED_KEY: &str = "randomSeed";
pub const GENERATION_ATTEMPTS_KEY: &str = "candidateGenerationAttempts";

/// Environment variable naming the properties file used by [`MetaFeatConfig::load_default`].
pub const CONFIG_ENV: &str = "METAFEAT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.properties";

/// Which cached matrices are left out of a dataset's background model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionPolicy {
    /// Leave out only the artifact of the dataset itself.
    Exact,
    /// Leave out every artifact whose file name contains the dataset name.
    Substring,
}

impl FromStr for ExclusionPolicy {
    type Err = MetaFeatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(ExclusionPolicy::Exact),
            "substring" => Ok(ExclusionPolicy::Substring),
            other => Err(MetaFeatError::Configuration(format!(
                "unknown {}: {}",
                EXCLUSION_POLICY_KEY, other
            ))),
        }
    }
}

impl fmt::Display for ExclusionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionPolicy::Exact => f.write_str("exact"),
            ExclusionPolicy::Substring => f.write_str("substring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaFeatConfig {
    /// Directory holding per-dataset matrix artifacts.
    pub instances_dir: PathBuf,
    /// Directory holding background models.
    pub background_dir: PathBuf,
    /// Classifiers every candidate is evaluated with.
    pub classifiers: Vec<ClassifierKind>,
    /// Upper bound on operator-assignment source arity.
    pub max_operator_source_atts: usize,
    /// Internal parallelism of ensemble classifiers.
    pub num_threads: usize,
    /// Candidate evaluations run at once; 0 means one per core.
    pub evaluation_threads: usize,
    pub exclusion_policy: ExclusionPolicy,
    pub background_trees: usize,
    pub random_seed: u64,
    pub generation_attempts: usize,
}

impl MetaFeatConfig {
    pub fn new(instances_dir: impl Into<PathBuf>, background_dir: impl Into<PathBuf>) -> Self {
        Self {
            instances_dir: instances_dir.into(),
            background_dir: background_dir.into(),
            classifiers: vec![ClassifierKind::J48],
            max_operator_source_atts: 2,
            num_threads: 1,
            evaluation_threads: 0,
            exclusion_policy: ExclusionPolicy::Exact,
            background_trees: 100,
            random_seed: 1,
            generation_attempts: 2,
        }
    }

    pub fn with_classifiers(mut self, classifiers: Vec<ClassifierKind>) -> Self {
        self.classifiers = classifiers;
        self
    }

    pub fn with_exclusion_policy(mut self, policy: ExclusionPolicy) -> Self {
        self.exclusion_policy = policy;
        self
    }

    pub fn with_evaluation_threads(mut self, n: usize) -> Self {
        self.evaluation_threads = n;
        self
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_background_trees(mut self, n: usize) -> Self {
        self.background_trees = n.max(1);
        self
    }

    pub fn from_properties_str(text: &str) -> Result<Self> {
        let props = parse_properties(text);
        let required = |key: &str| {
            props
                .get(key)
                .ok_or_else(|| MetaFeatError::Configuration(format!("missing required property {}", key)))
        };

        let mut config = Self::new(required(INSTANCES_DIR_KEY)?, required(BACKGROUND_DIR_KEY)?);
        config.classifiers = ClassifierKind::parse_list(required(CLASSIFIERS_KEY)?)?;
        if config.classifiers.is_empty() {
            return Err(MetaFeatError::Configuration(format!("{} lists no classifiers", CLASSIFIERS_KEY)));
        }
        config.max_operator_source_atts = parse_number(MAX_SOURCE_ATTS_KEY, required(MAX_SOURCE_ATTS_KEY)?)?;
        config.num_threads = parse_number(NUM_THREADS_KEY, required(NUM_THREADS_KEY)?)?;

        if let Some(v) = props.get(EVALUATION_THREADS_KEY) {
            config.evaluation_threads = parse_number(EVALUATION_THREADS_KEY, v)?;
        }
        if let Some(v) = props.get(EXCLUSION_POLICY_KEY) {
            config.exclusion_policy = v.parse()?;
        }
        if let Some(v) = props.get(BACKGROUND_TREES_KEY) {
            config.background_trees = parse_number::<usize>(BACKGROUND_TREES_KEY, v)?.max(1);
        }
        if let Some(v) = props.get(RANDOM_SEED_KEY) {
            config.random_seed = parse_number(RANDOM_SEED_KEY, v)?;
        }
        if let Some(v) = props.get(GENERATION_ATTEMPTS_KEY) {
            config.generation_attempts = parse_number::<usize>(GENERATION_ATTEMPTS_KEY, v)?.max(1);
        }
        Ok(config)
    }

    pub fn from_properties_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            MetaFeatError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_properties_str(&text)
    }

    /// Load from `$METAFEAT_CONFIG`, falling back to `./config.properties`.
    pub fn load_default() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_properties_file(path)
    }

    pub fn classifier_params(&self) -> ClassifierParams {
        ClassifierParams {
            num_threads: self.num_threads,
            n_trees: self.background_trees,
            seed: self.random_seed,
        }
    }

    /// Effective number of concurrent candidate evaluations.
    pub fn evaluation_parallelism(&self) -> usize {
        if self.evaluation_threads == 0 {
            num_cpus::get()
        } else {
            self.evaluation_threads
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MetaFeatError::Configuration(format!("{} is not a valid number: {}", key, value)))
}

/// `key=value` or `key: value` lines; `#` and `!` start comments.
fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(|c| c == '=' || c == ':')?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}
