use std::{collections::BTreeMap, fmt, sync::Arc};

use burn::{
    data::dataloader,
    tensor::{backend::Backend, Data, ElementConversion, Int, Tensor},
};
use derive_new::new;

use crate::{embeddings::EmbeddingLookup, utils::tensors::pad_to};

use super::{ClassifierConfig, Item};

/// Turns sentences into fixed-length sequences of pretrained token vectors
#[derive(Clone)]
pub struct SentenceEncoder {
    /// Token vector table
    embeddings: Arc<dyn EmbeddingLookup>,

    /// Sentences keep at most this many known tokens
    max_seq_length: usize,
}

impl SentenceEncoder {
    /// Creates a new encoder
    pub fn new(embeddings: Arc<dyn EmbeddingLookup>, max_seq_length: usize) -> Self {
        Self {
            embeddings,
            max_seq_length,
        }
    }

    /// The width of each token vector
    pub fn dimension(&self) -> usize {
        self.embeddings.dimension()
    }

    /// The number of token positions in an encoded sentence
    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    /// Flattened vectors of the known tokens of a sentence, in order.
    ///
    /// Out-of-vocabulary tokens are dropped before truncation, so the result
    /// holds at most `max_seq_length` vectors and may be empty.
    pub fn encode(&self, text: &str) -> Vec<f32> {
        text.split_whitespace()
            .filter_map(|token| self.embeddings.lookup(token))
            .take(self.max_seq_length)
            .flatten()
            .copied()
            .collect()
    }

    /// Encode a batch into a `[batch_size, max_seq_length, dimension]` tensor, zero-padded
    pub fn encode_batch<B: Backend, S: AsRef<str>>(
        &self,
        texts: &[S],
        device: &B::Device,
    ) -> Tensor<B, 3> {
        let rows = texts.iter().map(|text| self.encode(text.as_ref())).collect();

        pad_to(rows, self.max_seq_length, self.dimension(), device)
    }
}

impl fmt::Debug for SentenceEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentenceEncoder")
            .field("dimension", &self.dimension())
            .field("max_seq_length", &self.max_seq_length)
            .finish()
    }
}

/// An inference batch of encoded sentences
#[derive(Clone, Debug, new)]
pub struct Infer<B: Backend> {
    /// Token vectors: [batch_size, max_seq_length, embedding_dim]
    pub embeddings: Tensor<B, 3>,
}

/// A training batch for text classification
#[derive(Clone, Debug, new)]
pub struct Train<B: Backend> {
    /// Encoded sentences
    pub input: Infer<B>,

    /// Class ids for the batch
    pub targets: Tensor<B, 1, Int>,
}

/// Struct for batching text classification items
#[derive(Clone, Debug)]
pub struct Batcher<B: Backend> {
    /// Sentence encoder shared by every batch
    encoder: SentenceEncoder,

    /// A map from class names to their corresponding ids
    label2id: BTreeMap<String, usize>,

    /// Device on which to perform computation (e.g., CPU or CUDA device)
    device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Creates a new batcher
    pub fn new(
        embeddings: Arc<dyn EmbeddingLookup>,
        config: &ClassifierConfig,
        device: B::Device,
    ) -> Self {
        Self {
            encoder: SentenceEncoder::new(embeddings, config.max_seq_length),
            label2id: config.label2id(),
            device,
        }
    }
}

/// Implement Batcher trait for Batcher struct for inference
impl<B: Backend> dataloader::batcher::Batcher<String, Infer<B>> for Batcher<B> {
    /// Collects a vector of texts into an inference batch
    fn batch(&self, items: Vec<String>) -> Infer<B> {
        Infer::new(self.encoder.encode_batch(&items, &self.device))
    }
}

/// Implement Batcher trait for Batcher struct for training
impl<B: Backend, I: Item> dataloader::batcher::Batcher<I, Train<B>> for Batcher<B> {
    /// Collects a vector of text classification items into a training batch
    fn batch(&self, items: Vec<I>) -> Train<B> {
        let mut inputs = Vec::with_capacity(items.len());
        let mut class_id_list = Vec::with_capacity(items.len());

        for item in &items {
            let Some(class_id) = self.label2id.get(item.class_label()) else {
                log::warn!("Skipping item with unknown label {:?}", item.class_label());
                continue;
            };

            inputs.push(item.input().to_string());
            class_id_list.push((*class_id as i64).elem::<B::IntElem>());
        }

        let batch_size = class_id_list.len();
        let targets = Tensor::from_data(
            Data::new(class_id_list, [batch_size].into()),
            &self.device,
        );

        Train {
            input: self.batch(inputs),
            targets,
        }
    }
}
