use std::collections::{BTreeMap, BTreeSet};

use burn::{
    config::Config,
    nn::{conv::Conv2dConfig, DropoutConfig, Initializer, LinearConfig},
    tensor::backend::Backend,
    LearningRate,
};

use crate::{
    datasets::split::DEFAULT_SEPARATOR,
    utils::classes::{enumerate_labels, invert_map},
};

use super::{graph::Graph, Model};

/// How the token axis is reduced after the convolution branches are merged
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Pooling {
    /// Keep the strongest activation of each channel
    Max,

    /// Average each channel over all token positions
    Avg,
}

/// The classifier architecture, including the class labels it predicts
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Size of each pretrained token vector
    #[config(default = 300)]
    pub embedding_dim: usize,

    /// Sentences are truncated or zero-padded to this many tokens
    #[config(default = 256)]
    pub max_seq_length: usize,

    /// Number of feature maps produced by each convolution branch
    #[config(default = 100)]
    pub feature_maps: usize,

    /// The n-gram height of each parallel convolution branch
    #[config(default = "vec![3, 4, 5]")]
    pub kernel_sizes: Vec<usize>,

    /// Reduction applied over the token axis
    #[config(default = "Pooling::Max")]
    pub pooling: Pooling,

    /// Dropout applied to the pooled features during training
    #[config(default = 0.5)]
    pub dropout: f64,

    /// Negative slope of the leaky ReLU after each convolution
    #[config(default = 0.01)]
    pub leaky_relu_slope: f64,

    /// Weight initialization for convolution and output layers
    #[config(
        default = "Initializer::KaimingNormal { gain: std::f64::consts::SQRT_2, fan_out_only: false }"
    )]
    pub initializer: Initializer,

    /// A map from class ids to class name labels
    #[config(default = "BTreeMap::new()")]
    pub id2label: BTreeMap<usize, String>,
}

impl ClassifierConfig {
    /// Attach a stable label enumeration derived from the given label set
    pub fn with_labels(self, labels: &BTreeSet<String>) -> Self {
        self.with_id2label(enumerate_labels(labels))
    }

    /// Total number of classes
    pub fn n_classes(&self) -> usize {
        self.id2label.len()
    }

    /// A reverse map from class name labels to class ids
    pub fn label2id(&self) -> BTreeMap<String, usize> {
        invert_map(self.id2label.clone())
    }

    /// Width of the merged, pooled feature vector
    pub fn merged_features(&self) -> usize {
        self.feature_maps * self.kernel_sizes.len()
    }

    /// The computation graph described by this configuration
    pub fn graph(&self) -> Graph {
        Graph::text_cnn(self.kernel_sizes.len(), self.pooling.clone())
    }

    /// Check the architecture hyperparameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dim == 0 {
            return Err(ConfigError::invalid("embedding_dim", "must be positive"));
        }

        if self.max_seq_length == 0 {
            return Err(ConfigError::invalid("max_seq_length", "must be positive"));
        }

        if self.feature_maps == 0 {
            return Err(ConfigError::invalid("feature_maps", "must be positive"));
        }

        if self.kernel_sizes.is_empty() {
            return Err(ConfigError::invalid(
                "kernel_sizes",
                "at least one convolution branch is required",
            ));
        }

        for &kernel_size in &self.kernel_sizes {
            if kernel_size == 0 || kernel_size > self.max_seq_length {
                return Err(ConfigError::invalid(
                    "kernel_sizes",
                    format!(
                        "kernel size {kernel_size} must be between 1 and the max sequence length {}",
                        self.max_seq_length
                    ),
                ));
            }
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::invalid(
                "dropout",
                format!("must be in [0, 1), got {}", self.dropout),
            ));
        }

        if self.leaky_relu_slope < 0.0 {
            return Err(ConfigError::invalid(
                "leaky_relu_slope",
                "must not be negative",
            ));
        }

        self.graph()
            .validate()
            .map_err(|err| ConfigError::invalid("graph", err.to_string()))
    }

    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let branches = self
            .kernel_sizes
            .iter()
            .map(|&kernel_size| {
                Conv2dConfig::new([1, self.feature_maps], [kernel_size, self.embedding_dim])
                    .with_stride([1, self.embedding_dim])
                    .with_initializer(self.initializer.clone())
                    .init(device)
            })
            .collect();

        let dropout = DropoutConfig::new(self.dropout).init();

        let output = LinearConfig::new(self.merged_features(), self.n_classes())
            .with_initializer(self.initializer.clone())
            .init(device);

        Model {
            branches,
            dropout,
            output,
            kernel_sizes: self.kernel_sizes.clone(),
            max_pool: self.pooling == Pooling::Max,
            leaky_relu_slope: self.leaky_relu_slope,
            n_classes: self.n_classes(),
        }
    }
}

/// Define configuration struct for the experiment
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Batch size
    #[config(default = 32)]
    pub batch_size: usize,

    /// Number of epochs
    #[config(default = 1)]
    pub num_epochs: usize,

    /// Fixed Adam learning rate
    #[config(default = 1e-2)]
    pub learning_rate: LearningRate,

    /// L2 penalty applied through the optimizer
    #[config(default = 1e-4)]
    pub l2: f64,

    /// Adam epsilon
    #[config(default = 1e-8)]
    pub adam_epsilon: f32,

    /// Seed for splitting, shuffling and weight initialization
    #[config(default = 12345)]
    pub seed: u64,

    /// Data loader worker threads
    #[config(default = 1)]
    pub num_workers: usize,

    /// Log the mini-batch loss every this many iterations (0 disables)
    #[config(default = 100)]
    pub log_every: usize,

    /// Fraction of each label group held out for evaluation
    #[config(default = 0.2)]
    pub test_fraction: f64,

    /// Separator between text and label in corpus lines
    #[config(default = "DEFAULT_SEPARATOR.to_string()")]
    pub separator: String,

    /// The classifier architecture
    pub model: ClassifierConfig,
}

impl TrainingConfig {
    /// Check every hyperparameter before any training work begins
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be positive"));
        }

        if self.num_epochs == 0 {
            return Err(ConfigError::invalid("num_epochs", "must be positive"));
        }

        if self.num_workers == 0 {
            return Err(ConfigError::invalid("num_workers", "must be positive"));
        }

        if !(self.learning_rate > 0.0) {
            return Err(ConfigError::invalid(
                "learning_rate",
                format!("must be positive, got {}", self.learning_rate),
            ));
        }

        if self.l2 < 0.0 {
            return Err(ConfigError::invalid("l2", "must not be negative"));
        }

        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::invalid(
                "test_fraction",
                format!(
                    "must be between 0 and 1 (exclusive), got {}",
                    self.test_fraction
                ),
            ));
        }

        if self.separator.is_empty() {
            return Err(ConfigError::invalid("separator", "must not be empty"));
        }

        self.model.validate()
    }
}

/// Config Error
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A hyperparameter is out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending setting
        field: &'static str,

        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Reject a setting
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
