use burn::data::dataset::{self, Dataset as _, InMemDataset};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::pipelines::text_classification;

/// Stratified train/test splitting
pub mod split;

pub use split::{split, Split};

/// Define a struct for labeled text classification items
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct LabeledExample {
    /// The text for classification
    pub text: String,

    /// The class name of the text
    pub label: String,
}

impl text_classification::Item for LabeledExample {
    fn input(&self) -> &str {
        &self.text
    }

    fn class_label(&self) -> &str {
        &self.label
    }
}

/// An in-memory dataset of labeled examples
pub struct Dataset {
    /// Underlying In-Memory dataset
    dataset: InMemDataset<LabeledExample>,
}

impl dataset::Dataset<LabeledExample> for Dataset {
    /// Returns a specific item from the dataset
    fn get(&self, index: usize) -> Option<LabeledExample> {
        self.dataset.get(index)
    }

    /// Returns the length of the dataset
    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl Dataset {
    /// Constructs the dataset from a list of examples
    pub fn new(items: Vec<LabeledExample>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }
}
