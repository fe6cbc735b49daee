mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use common::*;
use metafeat_rust::config::MetaFeatConfig;
use metafeat_rust::data::dataset::Dataset;
use metafeat_rust::models::ClassifierKind;
use metafeat_rust::pipeline::assembler::{FailureSummary, TrainingSetAssembler};
use metafeat_rust::pipeline::collaborators::TrainTestEvaluator;
use metafeat_rust::pipeline::manager::CandidateAttributeManager;

fn config() -> MetaFeatConfig {
    MetaFeatConfig::new("unused-instances", "unused-background").with_evaluation_threads(4)
}

#[test]
fn end_to_end_labels_and_single_store() {
    let config = config();
    let ds = toy_dataset("toy", 2);
    let catalogue = StubCatalogue::new(&[], &["Add", "Mul", "Sub"]);
    let evaluator = ScriptedEvaluator::new(0.70, &[("Add", 0.75), ("Mul", 0.72), ("Sub", 0.705)]);
    let store = CountingStore::default();
    let manager = CandidateAttributeManager::new(&config, collaborators(&catalogue, &evaluator), &store);

    let first = manager.load_or_generate(&ds).unwrap();
    assert!(!first.is_cached());
    let matrix = first.matrix();
    assert_eq!(matrix.n_rows(), 3);

    let mut labels = matrix.label_codes();
    labels.sort_unstable();
    assert_eq!(labels, vec![0, 1, 1]);
    assert_eq!(store.stores.load(Ordering::SeqCst), 1);

    // arity, isDiscrete, numOfInstances, numOfColumns, Classifier, label
    assert_eq!(matrix.n_cols(), 6);
    assert_eq!(matrix.columns()[4].cardinality(), Some(3));
    assert!(matrix.data().column(4).iter().all(|&v| v == 0.0));
    assert_eq!(matrix.label_cardinality(), 2);

    let calls = evaluator.calls.load(Ordering::SeqCst);
    let second = manager.dataset_instances(&ds).unwrap();
    assert_eq!(second.n_rows(), 3);
    assert_eq!(store.stores.load(Ordering::SeqCst), 1);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), calls);
}

#[test]
fn concurrent_evaluations_keep_every_successful_row() {
    let config = config().with_evaluation_threads(8);
    let ds = toy_dataset("wide", 11);
    let evaluator = ScriptedEvaluator::new(0.6, &[("Add", 0.8)]);

    for _ in 0..3 {
        let catalogue = StubCatalogue::new(&[], &["Add", "Fail"]);
        let assembled = TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator))
            .assemble(&ds)
            .unwrap();
        let FailureSummary { evaluated, positive, failed_candidates, .. } = &assembled.summary;

        assert_eq!(catalogue.generated.load(Ordering::SeqCst), 55 + 55 * 2);
        assert_eq!(*evaluated, 55);
        assert_eq!(*positive, 55);
        assert_eq!(failed_candidates.len(), 55);
        assert!(failed_candidates.iter().all(|f| f.assignment.starts_with("Fail(")));

        let matrix = &assembled.matrix;
        assert_eq!(matrix.data().dim(), (55, 6));
        assert_eq!(matrix.coercion_failures(), 0);
        assert!(matrix.data().column(0).iter().all(|&arity| arity == 2.0));
        assert!(matrix.label_codes().iter().all(|&l| l == 1));
    }
}

#[test]
fn candidates_run_on_a_pool_of_the_configured_size() {
    let ds = toy_dataset("toy", 3);
    for threads in [3, 0] {
        let config = config().with_evaluation_threads(threads);
        let catalogue = StubCatalogue::new(&[], &["Add"]);
        let evaluator = ScriptedEvaluator::new(0.5, &[]);
        TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator))
            .assemble(&ds)
            .unwrap();
        assert!(evaluator.pool_sizes.lock().contains(&config.evaluation_parallelism()));
    }
    assert_eq!(config().with_evaluation_threads(0).evaluation_parallelism(), num_cpus::get());
}

#[test]
fn nan_columns_train_every_classifier() {
    let config = config()
        .with_classifiers(vec![ClassifierKind::J48, ClassifierKind::Svm, ClassifierKind::RandomForest])
        .with_background_trees(5);
    let ds = toy_dataset("toy", 2);
    let catalogue = StubCatalogue::new(&[], &["Ratio"]);
    let evaluator = TrainTestEvaluator::new(config.classifier_params());

    let assembled = TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator))
        .assemble(&ds)
        .unwrap();
    assert_eq!(assembled.matrix.n_rows(), 3);
    assert!(assembled.summary.failed_candidates.is_empty());
}

#[test]
fn failed_baseline_skips_only_that_classifier() {
    let config = config().with_classifiers(vec![ClassifierKind::J48, ClassifierKind::Svm]);
    let ds = toy_dataset("toy", 2);
    let catalogue = StubCatalogue::new(&[], &["Add", "Mul", "Sub"]);
    let evaluator = ScriptedEvaluator::new(0.5, &[]).failing_for(ClassifierKind::Svm);

    let assembled = TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator))
        .assemble(&ds)
        .unwrap();
    assert_eq!(assembled.matrix.n_rows(), 3);
    assert_eq!(assembled.summary.skipped_classifiers.len(), 1);
    assert_eq!(assembled.summary.skipped_classifiers[0].classifier, "SVM");
    assert!(!assembled.summary.is_clean());
}

#[test]
fn flaky_generation_is_retried_once() {
    let ds = toy_dataset("toy", 2);
    let evaluator = ScriptedEvaluator::new(0.5, &[]);

    let catalogue = StubCatalogue::new(&[], &["Flaky"]);
    let assembled = TrainingSetAssembler::new(&config(), collaborators(&catalogue, &evaluator))
        .assemble(&ds)
        .unwrap();
    assert_eq!(assembled.summary.evaluated, 1);
    assert_eq!(catalogue.generated.load(Ordering::SeqCst), 2);

    let mut single_attempt = config();
    single_attempt.generation_attempts = 1;
    let catalogue = StubCatalogue::new(&[], &["Flaky"]);
    let assembled = TrainingSetAssembler::new(&single_attempt, collaborators(&catalogue, &evaluator))
        .assemble(&ds)
        .unwrap();
    assert_eq!(assembled.summary.evaluated, 0);
    assert_eq!(assembled.summary.failed_candidates.len(), 1);
    assert!(assembled.matrix.is_empty());
}

#[test]
fn unary_outputs_feed_non_unary_enumeration() {
    let config = config();
    let ds = toy_dataset("toy", 2);
    let catalogue = StubCatalogue::new(&["Discretize"], &["Add"]);
    let evaluator = ScriptedEvaluator::new(0.5, &[]);
    let assembler = TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator));

    let mut summary = FailureSummary::default();
    let universe = assembler.candidate_universe(&ds, &mut summary).unwrap();
    let names: HashSet<String> = universe.iter().map(|oa| oa.name()).collect();
    // 4 columns on the replica give 6 pairs, plus the 2 unary assignments
    assert_eq!(universe.len(), 8);
    assert!(names.contains("Add(c0,Discretize(c0))"));
    assert!(names.contains("Discretize(c1)"));
    assert!(summary.skipped_unary_columns.is_empty());
    assert_eq!(ds.columns().len(), 2);

    let assembled = assembler.assemble(&ds).unwrap();
    assert_eq!(assembled.summary.evaluated, 8);
    let discrete_flags: Vec<f64> = assembled.matrix.data().column(1).to_vec();
    assert_eq!(discrete_flags.iter().filter(|&&f| f == 1.0).count(), 2);
}

#[test]
fn real_classifiers_produce_one_row_per_classifier_and_candidate() {
    let config = config()
        .with_classifiers(vec![ClassifierKind::J48, ClassifierKind::Svm, ClassifierKind::RandomForest])
        .with_background_trees(5)
        .with_num_threads(2);
    let ds = toy_dataset("toy", 2);
    let catalogue = StubCatalogue::new(&[], &["Add", "Mul"]);
    let evaluator = TrainTestEvaluator::new(config.classifier_params());

    let assembled = TrainingSetAssembler::new(&config, collaborators(&catalogue, &evaluator))
        .assemble(&ds)
        .unwrap();
    assert_eq!(assembled.matrix.n_rows(), 6);
    let codes: HashSet<u64> = assembled.matrix.data().column(4).iter().map(|&c| c as u64).collect();
    assert_eq!(codes, HashSet::from([0, 1, 2]));
}
