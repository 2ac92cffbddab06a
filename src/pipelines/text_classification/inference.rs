use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::tensor::backend::Backend;

use crate::{
    embeddings::EmbeddingLookup,
    pipelines::PipelineError,
    utils::{classes::argmax, tensors::to_vec},
};

use super::{batcher::Infer, batcher::SentenceEncoder, ClassifierConfig, Model};

/// How a [`TrainedModel`] came to be
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Trained from scratch in this process
    Trained,

    /// Loaded from an existing checkpoint
    Restored,
}

/// A classifier ready for inference, together with its configuration and labels
#[derive(Debug)]
pub struct TrainedModel<B: Backend> {
    config: ClassifierConfig,
    model: Model<B>,
    checkpoint: PathBuf,
    provenance: Provenance,
    persisted: bool,
}

impl<B: Backend> TrainedModel<B> {
    /// Wrap a model
    pub fn new(
        config: ClassifierConfig,
        model: Model<B>,
        checkpoint: PathBuf,
        provenance: Provenance,
        persisted: bool,
    ) -> Self {
        Self {
            config,
            model,
            checkpoint,
            provenance,
            persisted,
        }
    }

    /// The architecture and label enumeration
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// The learned network
    pub fn model(&self) -> &Model<B> {
        &self.model
    }

    /// The checkpoint directory this model belongs to
    pub fn checkpoint(&self) -> &Path {
        &self.checkpoint
    }

    /// Whether this model was trained or restored
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Whether the checkpoint on disk holds this model
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }
}

/// Encodes texts and decodes a trained model's output to labels
#[derive(Clone)]
pub struct Predictor<B: Backend> {
    embeddings: Arc<dyn EmbeddingLookup>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Creates a new predictor
    pub fn new(embeddings: Arc<dyn EmbeddingLookup>, device: B::Device) -> Self {
        Self { embeddings, device }
    }

    /// Class probabilities for a single text, paired with their labels in class id order
    pub fn predict_proba(
        &self,
        text: &str,
        trained: &TrainedModel<B>,
    ) -> Result<Vec<(String, f32)>, PipelineError> {
        let config = trained.config();

        if config.embedding_dim != self.embeddings.dimension() {
            return Err(PipelineError::EmbeddingDimension {
                expected: config.embedding_dim,
                found: self.embeddings.dimension(),
            });
        }

        // Encode with the same sentence length the model was trained with
        let encoder = SentenceEncoder::new(self.embeddings.clone(), config.max_seq_length);
        let input = Infer::new(encoder.encode_batch(&[text], &self.device));

        let probabilities = to_vec(trained.model().infer(input));

        Ok(config
            .id2label
            .values()
            .cloned()
            .zip(probabilities)
            .collect())
    }

    /// The most probable label for a single text.
    ///
    /// When several labels share the highest probability, the one with the
    /// lowest class id wins.
    pub fn predict(&self, text: &str, trained: &TrainedModel<B>) -> Result<String, PipelineError> {
        let scores = self.predict_proba(text, trained)?;

        for (label, probability) in &scores {
            log::debug!("P({}) = {}", label, probability);
        }

        let probabilities: Vec<f32> = scores.iter().map(|(_, p)| *p).collect();

        argmax(&probabilities)
            .and_then(|index| scores.into_iter().nth(index))
            .map(|(label, _)| label)
            .ok_or(PipelineError::NoClasses)
    }
}
