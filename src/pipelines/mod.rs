/// Text Classification
pub mod text_classification;

/// Pipeline Error
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Inference was requested before a model was trained or restored
    #[error("no model is loaded; train or restore one before predicting")]
    Unloaded,

    /// The embeddings do not match the dimension the model expects
    #[error("the model expects {expected}-dimensional embeddings, but {found} were provided")]
    EmbeddingDimension {
        /// The dimension the model was built for
        expected: usize,

        /// The dimension of the provided embeddings
        found: usize,
    },

    /// The model has no classes to choose from
    #[error("the model has no class labels")]
    NoClasses,
}
