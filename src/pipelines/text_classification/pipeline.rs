use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;

use crate::{datasets::Split, embeddings::EmbeddingLookup, pipelines::PipelineError};

use super::{
    checkpoint::CheckpointError,
    inference::{Predictor, Provenance, TrainedModel},
    training::Trainer,
};

/// The model held by a [`Classifier`]
#[derive(Debug)]
pub enum Lifecycle<B: AutodiffBackend> {
    /// Nothing trained or restored yet
    Unloaded,

    /// Loaded from the checkpoint
    Restored(TrainedModel<B::InnerBackend>),

    /// Trained in this process
    Trained(TrainedModel<B::InnerBackend>),
}

impl<B: AutodiffBackend> Lifecycle<B> {
    fn model(&self) -> Option<&TrainedModel<B::InnerBackend>> {
        match self {
            Lifecycle::Unloaded => None,
            Lifecycle::Restored(model) | Lifecycle::Trained(model) => Some(model),
        }
    }
}

impl<B: AutodiffBackend> From<TrainedModel<B::InnerBackend>> for Lifecycle<B> {
    fn from(model: TrainedModel<B::InnerBackend>) -> Self {
        match model.provenance() {
            Provenance::Restored => Lifecycle::Restored(model),
            Provenance::Trained => Lifecycle::Trained(model),
        }
    }
}

/// Text classification with a restore-or-train lifecycle
pub struct Classifier<B: AutodiffBackend> {
    trainer: Trainer<B>,
    predictor: Predictor<B::InnerBackend>,
    state: Lifecycle<B>,
}

impl<B: AutodiffBackend> Classifier<B> {
    /// Creates an unloaded classifier
    pub fn new(trainer: Trainer<B>, embeddings: Arc<dyn EmbeddingLookup>, device: B::Device) -> Self {
        Self {
            trainer,
            predictor: Predictor::new(embeddings, device),
            state: Lifecycle::Unloaded,
        }
    }

    /// Load the model from the checkpoint without ever training.
    ///
    /// Returns `false` and stays unloaded when there is no checkpoint.
    pub fn restore(&mut self) -> Result<bool, CheckpointError> {
        if self.state.model().is_some() {
            return Ok(true);
        }

        match self.trainer.try_restore()? {
            Some(model) => {
                self.state = model.into();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Make sure a model is loaded, restoring it or training it on the split.
    ///
    /// Once loaded, later calls do nothing and report the same provenance.
    pub fn ensure_model(&mut self, split: &Split) -> anyhow::Result<Provenance> {
        if let Some(model) = self.state.model() {
            return Ok(model.provenance());
        }

        let model = self.trainer.train(split)?;
        let provenance = model.provenance();

        self.state = model.into();

        Ok(provenance)
    }

    /// The most probable label for `text`
    pub fn predict(&self, text: &str) -> Result<String, PipelineError> {
        let model = self.state.model().ok_or(PipelineError::Unloaded)?;

        self.predictor.predict(text, model)
    }

    /// Class probabilities for `text`, in class id order
    pub fn predict_proba(&self, text: &str) -> Result<Vec<(String, f32)>, PipelineError> {
        let model = self.state.model().ok_or(PipelineError::Unloaded)?;

        self.predictor.predict_proba(text, model)
    }

    /// The current lifecycle state
    pub fn state(&self) -> &Lifecycle<B> {
        &self.state
    }

    /// The trained or restored model, if any
    pub fn model(&self) -> Option<&TrainedModel<B::InnerBackend>> {
        self.state.model()
    }
}
