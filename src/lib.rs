//! # Burn TextCNN
//!
//! A multi-branch convolutional text classifier over pretrained word vectors.
#![forbid(unsafe_code)]

/// Pipelines
pub mod pipelines;

/// Datasets
pub mod datasets;

/// Word embeddings
pub mod embeddings;

/// Utilities
pub mod utils;

/// Error macros
#[macro_use]
extern crate anyhow;
