use burn::{
    module::Module,
    nn::{conv::Conv2d, loss::CrossEntropyLossConfig, Dropout, Linear},
    tensor::{
        activation::{leaky_relu, softmax},
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::utils::tensors::pad_axis;

use super::{
    batcher::{Infer, Train},
    config::Pooling,
    graph::{Executor, Graph, Layer},
};

/// A multi-branch convolutional sentence classifier
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    /// One convolution per n-gram size, each spanning the full embedding width
    pub branches: Vec<Conv2d<B>>,

    /// Dropout on the pooled features
    pub dropout: Dropout,

    /// Linear layer projecting pooled features to class logits
    pub output: Linear<B>,

    /// The n-gram height of each branch, used for "same" padding
    pub kernel_sizes: Vec<usize>,

    /// Max pooling when true, average pooling otherwise
    pub max_pool: bool,

    /// Negative slope of the leaky ReLU
    pub leaky_relu_slope: f64,

    /// Total number of classes
    pub n_classes: usize,
}

/// Define model behavior
impl<B: Backend> Model<B> {
    /// The topology this model evaluates
    pub fn graph(&self) -> Graph {
        let pooling = if self.max_pool {
            Pooling::Max
        } else {
            Pooling::Avg
        };

        Graph::text_cnn(self.branches.len(), pooling)
    }

    /// Compute class logits for a `[batch_size, seq_length, embedding_dim]` batch
    pub fn forward(&self, embeddings: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, seq_length, embedding_dim] = embeddings.dims();

        let input = embeddings.reshape([batch_size, 1, seq_length, embedding_dim]);

        self.graph().execute(self, input)
    }

    /// Defines forward pass for training
    pub fn forward_classification(&self, item: Train<B>) -> ClassificationOutput<B> {
        let output = self.forward(item.input.embeddings);
        let targets = item.targets.to_device(&output.device());

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput {
            loss,
            output,
            targets,
        }
    }

    /// Defines forward pass for inference, returning class probabilities
    pub fn infer(&self, input: Infer<B>) -> Tensor<B, 2> {
        softmax(self.forward(input.embeddings), 1)
    }

    /// Trainable parameter count of each graph node, in evaluation order
    pub fn node_params(&self) -> Vec<(String, usize)> {
        self.graph()
            .nodes()
            .iter()
            .map(|node| {
                let params = match &node.layer {
                    Layer::Convolution { branch } => self
                        .branches
                        .get(*branch)
                        .map(|conv| conv.num_params())
                        .unwrap_or_default(),
                    Layer::Dense => self.output.num_params(),
                    _ => 0,
                };

                (node.name.clone(), params)
            })
            .collect()
    }
}

impl<B: Backend> Executor<B> for Model<B> {
    fn convolution(&self, branch: usize, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let (Some(conv), Some(&kernel_size)) =
            (self.branches.get(branch), self.kernel_sizes.get(branch))
        else {
            unreachable!(
                "graph references convolution branch {} but the model has {}",
                branch,
                self.branches.len()
            );
        };

        // Pad the token axis so every branch keeps the input sequence length
        let before = (kernel_size - 1) / 2;
        let after = kernel_size - 1 - before;

        leaky_relu(
            conv.forward(pad_axis(input, 2, before, after)),
            self.leaky_relu_slope,
        )
    }

    fn global_pool(&self, pooling: &Pooling, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, seq_length, width] = input.dims();

        // Reduce over the last axis, which every backend supports in the backward pass
        let input = input.reshape([batch_size, channels, seq_length * width]);

        let pooled = match pooling {
            Pooling::Max => input.max_dim(2),
            Pooling::Avg => input.mean_dim(2),
        };

        self.dropout
            .forward(pooled.reshape([batch_size, channels]))
    }

    fn dense(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.output.forward(input)
    }
}

/// Define training step
impl<B: AutodiffBackend> TrainStep<Train<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, item: Train<B>) -> TrainOutput<ClassificationOutput<B>> {
        // Run forward pass, calculate gradients and return them along with the output
        let output = self.forward_classification(item);
        let grads = output.loss.backward();

        TrainOutput::new(self, grads, output)
    }
}

/// Define validation step
impl<B: Backend> ValidStep<Train<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, item: Train<B>) -> ClassificationOutput<B> {
        // Run forward pass and return the output
        self.forward_classification(item)
    }
}

/// Predicted class ids for a batch of logits or probabilities
pub fn predicted_classes<B: Backend>(scores: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [batch_size, _n_classes] = scores.dims();

    scores.argmax(1).reshape([batch_size])
}
