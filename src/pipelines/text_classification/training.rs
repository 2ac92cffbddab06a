use std::{path::PathBuf, sync::Arc};

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::{AutodiffModule, Module},
    optim::{decay::WeightDecayConfig, AdamConfig, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
    train::{TrainStep, ValidStep},
};

use crate::{
    datasets::{Dataset, Split},
    embeddings::EmbeddingLookup,
    pipelines::PipelineError,
};

use super::{
    batcher::Train,
    checkpoint::{self, CheckpointError},
    evaluation::Evaluation,
    inference::{Provenance, TrainedModel},
    model::predicted_classes,
    Batcher, ClassifierConfig, Model, TrainingConfig,
};

/// Where a training run currently is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    /// 1-based epoch number
    pub epoch: usize,

    /// Total number of epochs in the run
    pub num_epochs: usize,

    /// Optimizer steps taken so far, across epochs
    pub iteration: usize,
}

/// Observes a training run
pub trait TrainingListener: Send {
    /// Called after every optimizer step with the mini-batch loss
    fn on_iteration(&mut self, progress: &Progress, score: f64);

    /// Called after each epoch with the statistics on the test set
    fn on_epoch_end(&mut self, _progress: &Progress, _evaluation: &Evaluation) {}
}

/// Logs the mini-batch loss every `every` iterations
#[derive(Clone, Debug)]
pub struct ScoreLogger {
    every: usize,
}

impl ScoreLogger {
    /// A logger reporting every `every` iterations. Zero disables it.
    pub fn new(every: usize) -> Self {
        Self { every }
    }
}

impl TrainingListener for ScoreLogger {
    fn on_iteration(&mut self, progress: &Progress, score: f64) {
        if self.every > 0 && progress.iteration % self.every == 0 {
            log::info!("Score at iteration {} is {:.6}", progress.iteration, score);
        }
    }
}

/// State owned by a single training run
struct TrainingContext<'a> {
    seed: u64,
    progress: Progress,
    listeners: &'a mut [Box<dyn TrainingListener>],
}

impl<'a> TrainingContext<'a> {
    fn new(seed: u64, num_epochs: usize, listeners: &'a mut [Box<dyn TrainingListener>]) -> Self {
        Self {
            seed,
            progress: Progress {
                num_epochs,
                ..Default::default()
            },
            listeners,
        }
    }

    fn start_epoch(&mut self, epoch: usize) {
        self.progress.epoch = epoch;
    }

    fn iteration_done(&mut self, score: f64) {
        self.progress.iteration += 1;

        for listener in self.listeners.iter_mut() {
            listener.on_iteration(&self.progress, score);
        }
    }

    fn epoch_done(&mut self, evaluation: &Evaluation) {
        for listener in self.listeners.iter_mut() {
            listener.on_epoch_end(&self.progress, evaluation);
        }
    }
}

/// Trains a classifier, or restores a previously trained one from its checkpoint
pub struct Trainer<B: AutodiffBackend> {
    /// Hyperparameters for the run
    config: TrainingConfig,

    /// Token vectors used to encode every sentence
    embeddings: Arc<dyn EmbeddingLookup>,

    /// Directory holding the checkpoint bundle
    checkpoint: PathBuf,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    device: B::Device,

    /// Observers notified during training
    listeners: Vec<Box<dyn TrainingListener>>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Creates a trainer reporting the score every `config.log_every` iterations
    pub fn new(
        config: TrainingConfig,
        embeddings: Arc<dyn EmbeddingLookup>,
        checkpoint: impl Into<PathBuf>,
        device: B::Device,
    ) -> Self {
        let listeners: Vec<Box<dyn TrainingListener>> =
            vec![Box::new(ScoreLogger::new(config.log_every))];

        Self {
            config,
            embeddings,
            checkpoint: checkpoint.into(),
            device,
            listeners,
        }
    }

    /// Register an additional listener
    pub fn with_listener(mut self, listener: Box<dyn TrainingListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The hyperparameters for this trainer
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The checkpoint directory
    pub fn checkpoint(&self) -> &PathBuf {
        &self.checkpoint
    }

    /// Restore the model saved at the checkpoint path, if there is one
    pub fn try_restore(&self) -> Result<Option<TrainedModel<B::InnerBackend>>, CheckpointError> {
        let restored = checkpoint::restore::<B::InnerBackend>(
            &self.checkpoint,
            self.embeddings.dimension(),
            &self.device,
        )?;

        Ok(restored.map(|(config, model)| {
            TrainedModel::new(
                config,
                model,
                self.checkpoint.clone(),
                Provenance::Restored,
                true,
            )
        }))
    }

    /// Restore from the checkpoint, or train from scratch and persist the result.
    ///
    /// An unreadable checkpoint is treated like a missing one. A failure to
    /// persist is logged and leaves the returned model usable.
    pub fn train(&mut self, split: &Split) -> anyhow::Result<TrainedModel<B::InnerBackend>> {
        self.config.validate()?;

        match self.try_restore() {
            Ok(Some(trained)) => {
                log::info!(
                    "Restored model from {}, skipping training",
                    self.checkpoint.display()
                );

                return Ok(trained);
            }
            Ok(None) => log::info!(
                "No checkpoint at {}, training from scratch",
                self.checkpoint.display()
            ),
            Err(err) => log::warn!(
                "Unable to restore checkpoint from {}: {}. Training from scratch",
                self.checkpoint.display(),
                err
            ),
        }

        let (config, model) = self.fit(split)?;

        let persisted = match checkpoint::save(&self.checkpoint, &config, &model) {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "Unable to save checkpoint to {}: {}",
                    self.checkpoint.display(),
                    err
                );

                false
            }
        };

        Ok(TrainedModel::new(
            config,
            model,
            self.checkpoint.clone(),
            Provenance::Trained,
            persisted,
        ))
    }

    /// Train a fresh model on the split, evaluating on the test set after each epoch
    pub fn fit(
        &mut self,
        split: &Split,
    ) -> anyhow::Result<(ClassifierConfig, Model<B::InnerBackend>)> {
        self.config.validate()?;

        let config = &self.config;

        B::seed(config.seed);

        let model_config = config.model.clone().with_labels(&split.labels);

        if model_config.n_classes() == 0 {
            return Err(anyhow!("No labels were found in the training data"));
        }

        if model_config.embedding_dim != self.embeddings.dimension() {
            return Err(PipelineError::EmbeddingDimension {
                expected: model_config.embedding_dim,
                found: self.embeddings.dimension(),
            }
            .into());
        }

        let train = split.train();

        if train.is_empty() {
            return Err(anyhow!("The training set is empty"));
        }

        let mut model: Model<B> = model_config.init(&self.device);

        log_summary(&model);

        // Initialize batchers for training and testing data
        let batcher_train =
            Batcher::<B>::new(self.embeddings.clone(), &model_config, self.device.clone());
        let batcher_test = Batcher::<B::InnerBackend>::new(
            self.embeddings.clone(),
            &model_config,
            self.device.clone(),
        );

        // Initialize data loaders for training and testing data
        let dataloader_train: Arc<dyn DataLoader<Train<B>>> = DataLoaderBuilder::new(batcher_train)
            .batch_size(config.batch_size)
            .shuffle(config.seed)
            .num_workers(config.num_workers)
            .build(Dataset::new(train));

        let dataloader_test: Arc<dyn DataLoader<Train<B::InnerBackend>>> =
            DataLoaderBuilder::new(batcher_test)
                .batch_size(config.batch_size)
                .num_workers(config.num_workers)
                .build(Dataset::new(split.test()));

        // Initialize optimizer, with L2 regularization applied as weight decay
        let mut optim = AdamConfig::new()
            .with_epsilon(config.adam_epsilon)
            .with_weight_decay(Some(WeightDecayConfig::new(config.l2 as _)))
            .init();

        let learning_rate = config.learning_rate;
        let num_epochs = config.num_epochs;

        let mut context = TrainingContext::new(config.seed, num_epochs, &mut self.listeners);

        log::info!(
            "Training on {} examples for {} epochs (seed {})",
            split.train_x.len(),
            num_epochs,
            context.seed
        );

        for epoch in 1..=num_epochs {
            context.start_epoch(epoch);

            for batch in dataloader_train.iter() {
                let output = TrainStep::step(&model, batch);
                let score = output.item.loss.clone().into_scalar().elem::<f64>();

                model = optim.step(learning_rate, model, output.grads);

                context.iteration_done(score);
            }

            let evaluation = evaluate(
                &model.valid(),
                dataloader_test.as_ref(),
                &model_config,
            );

            log::info!(
                "Epoch {}/{} evaluation:\n{}",
                epoch,
                num_epochs,
                evaluation
            );

            context.epoch_done(&evaluation);
        }

        Ok((model_config, model.valid()))
    }
}

/// Run a model over every batch of a labeled data loader and tally its predictions
pub fn evaluate<B: Backend>(
    model: &Model<B>,
    dataloader: &dyn DataLoader<Train<B>>,
    config: &ClassifierConfig,
) -> Evaluation {
    let mut evaluation = Evaluation::new(&config.id2label);

    for batch in dataloader.iter() {
        let output = ValidStep::step(model, batch);

        let predicted = class_ids(predicted_classes(output.output));
        let actual = class_ids(output.targets);

        evaluation.record_all(&actual, &predicted);
    }

    evaluation
}

fn class_ids<B: Backend>(tensor: Tensor<B, 1, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .convert::<i64>()
        .value
        .into_iter()
        .map(|id| id as usize)
        .collect()
}

fn log_summary<B: Backend>(model: &Model<B>) {
    let params = model.node_params();
    let width = params.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    for (name, count) in &params {
        log::info!("{:<width$} {:>10} params", name, count);
    }

    log::info!("{:<width$} {:>10} params", "total", model.num_params());
}
