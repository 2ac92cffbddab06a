use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use burn::backend::{Autodiff, NdArray};
use burn_textcnn::{
    datasets::{split, Split},
    embeddings::{EmbeddingLookup, WordVectors},
    pipelines::{
        text_classification::{
            Classifier, ClassifierConfig, Evaluation, Lifecycle, Progress, Provenance, Trainer,
            TrainingConfig, TrainingListener,
        },
        PipelineError,
    },
};
use pretty_assertions::assert_eq;

type TestBackend = Autodiff<NdArray>;

fn embeddings() -> Arc<dyn EmbeddingLookup> {
    Arc::new(
        WordVectors::from_pairs(
            4,
            vec![
                ("suka", vec![1.0, 0.8, 0.0, 0.1]),
                ("senang", vec![0.9, 1.0, 0.1, 0.0]),
                ("bagus", vec![0.8, 0.9, 0.0, 0.2]),
                ("benci", vec![0.0, 0.1, 1.0, 0.9]),
                ("buruk", vec![0.1, 0.0, 0.9, 1.0]),
                ("jelek", vec![0.2, 0.1, 0.8, 0.9]),
                ("sekali", vec![0.3, 0.3, 0.3, 0.3]),
                ("film", vec![0.5, 0.0, 0.5, 0.0]),
            ],
        )
        .unwrap(),
    )
}

fn corpus() -> Vec<String> {
    [
        "suka sekali__label__yes",
        "senang film__label__yes",
        "bagus sekali__label__yes",
        "film bagus__label__yes",
        "suka film__label__yes",
        "benci sekali__label__no",
        "buruk film__label__no",
        "jelek sekali__label__no",
        "film jelek__label__no",
        "benci film__label__no",
        "tanpa label__label__ ",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn training_split() -> Split {
    split(&corpus(), 0.2, "__label__", 12345).unwrap()
}

fn config() -> TrainingConfig {
    TrainingConfig::new(
        ClassifierConfig::new()
            .with_embedding_dim(4)
            .with_max_seq_length(5)
            .with_feature_maps(2)
            .with_kernel_sizes(vec![1, 2, 3]),
    )
    .with_batch_size(4)
    .with_num_epochs(2)
    .with_log_every(1)
}

fn checkpoint_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "burn-textcnn-{}-{}",
        name,
        std::process::id()
    ));

    let _ = fs::remove_dir_all(&path);

    path
}

fn classifier(path: &PathBuf) -> Classifier<TestBackend> {
    let device = Default::default();
    let trainer = Trainer::<TestBackend>::new(config(), embeddings(), path, device);

    Classifier::new(trainer, embeddings(), Default::default())
}

#[derive(Default)]
struct Recorded {
    iterations: Vec<Progress>,
    evaluations: Vec<(Progress, usize)>,
}

struct Recorder(Arc<Mutex<Recorded>>);

impl TrainingListener for Recorder {
    fn on_iteration(&mut self, progress: &Progress, score: f64) {
        assert!(score.is_finite());

        self.0.lock().unwrap().iterations.push(*progress);
    }

    fn on_epoch_end(&mut self, progress: &Progress, evaluation: &Evaluation) {
        self.0
            .lock()
            .unwrap()
            .evaluations
            .push((*progress, evaluation.total()));
    }
}

#[test]
fn test_malformed_lines_are_kept_out_of_the_split() {
    let split = training_split();

    assert_eq!(split.malformed, vec!["tanpa label__label__ ".to_string()]);
    assert_eq!(split.train_x.len() + split.test_x.len(), 10);
    assert_eq!(split.test_x.len(), 2);
}

#[test]
fn test_second_run_restores_instead_of_training() {
    let path = checkpoint_path("restore");
    let split = training_split();

    let mut first = classifier(&path);
    assert_eq!(first.ensure_model(&split).unwrap(), Provenance::Trained);
    assert!(first.model().unwrap().is_persisted());
    assert!(matches!(first.state(), Lifecycle::Trained(_)));

    let mut second = classifier(&path);
    assert_eq!(second.ensure_model(&split).unwrap(), Provenance::Restored);
    assert!(matches!(second.state(), Lifecycle::Restored(_)));

    // Loading is idempotent once a model is held
    assert_eq!(second.ensure_model(&split).unwrap(), Provenance::Restored);

    for text in ["suka sekali", "jelek film", "kata asing", ""] {
        assert_eq!(first.predict(text).unwrap(), second.predict(text).unwrap());

        let expected = first.predict_proba(text).unwrap();
        let actual = second.predict_proba(text).unwrap();

        for ((expected_label, expected_p), (actual_label, actual_p)) in expected.iter().zip(&actual)
        {
            assert_eq!(expected_label, actual_label);
            assert!((expected_p - actual_p).abs() < 1e-6);
        }
    }

    fs::remove_dir_all(&path).unwrap();
}

#[test]
fn test_predict_returns_a_training_label() {
    let path = checkpoint_path("labels");
    let split = training_split();

    let mut classifier = classifier(&path);
    classifier.ensure_model(&split).unwrap();

    for text in ["suka", "benci sekali", "tidak dikenal", "suka benci film sekali bagus jelek"] {
        let label = classifier.predict(text).unwrap();

        assert!(split.labels.contains(&label), "unexpected label {label}");
    }

    let probabilities = classifier.predict_proba("suka").unwrap();
    let labels: Vec<&str> = probabilities.iter().map(|(l, _)| l.as_str()).collect();

    assert_eq!(labels, vec!["no", "yes"]);
    assert!((probabilities.iter().map(|(_, p)| p).sum::<f32>() - 1.0).abs() < 1e-5);

    fs::remove_dir_all(&path).unwrap();
}

#[test]
fn test_unloaded_classifier_refuses_to_predict() {
    let path = checkpoint_path("unloaded");

    let classifier = classifier(&path);

    assert!(matches!(classifier.state(), Lifecycle::Unloaded));
    assert_eq!(classifier.predict("suka"), Err(PipelineError::Unloaded));
}

#[test]
fn test_restore_without_checkpoint_stays_unloaded() {
    let path = checkpoint_path("restore-only");

    let mut classifier = classifier(&path);

    assert!(!classifier.restore().unwrap());
    assert!(matches!(classifier.state(), Lifecycle::Unloaded));
}

#[test]
fn test_corrupt_checkpoint_is_retrained() {
    let path = checkpoint_path("corrupt");
    let split = training_split();

    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("manifest.json"), "not a manifest").unwrap();

    let mut classifier = classifier(&path);

    assert_eq!(classifier.ensure_model(&split).unwrap(), Provenance::Trained);
    assert!(classifier.model().unwrap().is_persisted());

    fs::remove_dir_all(&path).unwrap();
}

#[test]
fn test_listeners_observe_every_step_and_epoch() {
    let path = checkpoint_path("listeners");
    let split = training_split();
    let recorded = Arc::new(Mutex::new(Recorded::default()));

    let mut trainer = Trainer::<TestBackend>::new(config(), embeddings(), &path, Default::default())
        .with_listener(Box::new(Recorder(recorded.clone())));

    let trained = trainer.train(&split).unwrap();
    assert_eq!(trained.provenance(), Provenance::Trained);

    let recorded = recorded.lock().unwrap();

    // 8 training examples in batches of 4, for 2 epochs
    assert_eq!(recorded.iterations.len(), 4);
    assert_eq!(recorded.iterations.last().unwrap().iteration, 4);
    assert_eq!(recorded.iterations.last().unwrap().epoch, 2);

    assert_eq!(recorded.evaluations.len(), 2);
    assert_eq!(recorded.evaluations[0].0.epoch, 1);
    assert_eq!(recorded.evaluations[0].1, 2);

    fs::remove_dir_all(&path).unwrap();
}

#[test]
fn test_unwritable_checkpoint_still_returns_the_trained_model() {
    let blocker = checkpoint_path("blocked");
    let _ = fs::remove_file(&blocker);
    fs::write(&blocker, "not a directory").unwrap();

    let path = blocker.join("ckpt");
    let split = training_split();

    let mut trainer = Trainer::<TestBackend>::new(config(), embeddings(), &path, Default::default());

    let trained = trainer.train(&split).unwrap();

    assert_eq!(trained.provenance(), Provenance::Trained);
    assert!(!trained.is_persisted());
    assert!(trained
        .config()
        .id2label
        .values()
        .all(|label| split.labels.contains(label)));

    fs::remove_file(&blocker).unwrap();
}

#[test]
fn test_invalid_config_fails_before_training() {
    let path = checkpoint_path("invalid");
    let split = training_split();

    let mut trainer = Trainer::<TestBackend>::new(
        config().with_batch_size(0),
        embeddings(),
        &path,
        Default::default(),
    );

    assert!(trainer.train(&split).is_err());
    assert!(!path.exists());
}

#[test]
fn test_embedding_dimension_mismatch_is_rejected() {
    let path = checkpoint_path("dimension");
    let split = training_split();

    let mut config = config();
    config.model.embedding_dim = 7;

    let mut trainer = Trainer::<TestBackend>::new(config, embeddings(), &path, Default::default());

    let err = trainer.fit(&split).unwrap_err();

    assert_eq!(
        err.downcast_ref::<PipelineError>(),
        Some(&PipelineError::EmbeddingDimension {
            expected: 7,
            found: 4
        })
    );
}
