/// Classifier and training configuration
pub mod config;

/// The computation graph
pub mod graph;

/// The convolutional classifier
pub mod model;

/// Batcher
pub mod batcher;

/// Text Classification Items
pub mod item;

/// Evaluation statistics
pub mod evaluation;

/// Checkpoint persistence
pub mod checkpoint;

/// Training
pub mod training;

/// Inference
pub mod inference;

/// The restore-or-train pipeline
pub mod pipeline;

pub use batcher::{Batcher, SentenceEncoder};
pub use config::{ClassifierConfig, ConfigError, Pooling, TrainingConfig};
pub use evaluation::Evaluation;
pub use inference::{Predictor, Provenance, TrainedModel};
pub use item::Item;
pub use model::Model;
pub use pipeline::{Classifier, Lifecycle};
pub use training::{Progress, ScoreLogger, Trainer, TrainingListener};
