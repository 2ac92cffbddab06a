//! The classifier topology as data: a list of typed nodes with declared inputs,
//! evaluated in order by [`Graph::execute`].

use std::collections::HashSet;

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use super::config::Pooling;

/// The name of the graph input node
pub static INPUT: &str = "input";

/// A node operation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Layer {
    /// The encoded sentence as a single-channel grid: [batch_size, 1, seq_length, embedding_dim]
    Input,

    /// An n-gram convolution branch, using the parameters of branch `branch`
    Convolution {
        /// Index of the branch parameters
        branch: usize,
    },

    /// Concatenate all inputs along the channel axis
    Merge,

    /// Collapse the token axis of each channel, then apply dropout
    GlobalPool {
        /// The reduction to use
        pooling: Pooling,
    },

    /// Fully connected projection to class logits
    Dense,
}

/// The shape family of the value a node produces
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    /// [batch_size, channels, seq_length, width]
    Grid,

    /// [batch_size, features]
    Features,
}

impl Layer {
    fn output_kind(&self) -> Kind {
        match self {
            Layer::Input | Layer::Convolution { .. } | Layer::Merge => Kind::Grid,
            Layer::GlobalPool { .. } | Layer::Dense => Kind::Features,
        }
    }

    fn input_kind(&self) -> Option<Kind> {
        match self {
            Layer::Input => None,
            Layer::Convolution { .. } | Layer::Merge | Layer::GlobalPool { .. } => Some(Kind::Grid),
            Layer::Dense => Some(Kind::Features),
        }
    }

    fn arity(&self) -> (usize, usize) {
        match self {
            Layer::Input => (0, 0),
            Layer::Merge => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// A named node and the indexes of the nodes it reads from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name
    pub name: String,

    /// The operation
    pub layer: Layer,

    /// Indexes of earlier nodes feeding this one
    pub inputs: Vec<usize>,
}

/// A validated directed acyclic graph, stored in evaluation order
#[derive(Clone, Debug, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Build a graph from nodes given as `(name, layer, input names)`.
    ///
    /// Inputs must name earlier nodes, so the node order is also the
    /// evaluation order. The last node is the graph output.
    pub fn from_layers<'a, I>(layers: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (&'a str, Layer, Vec<&'a str>)>,
    {
        let mut nodes: Vec<Node> = Vec::new();

        for (name, layer, input_names) in layers {
            if nodes.iter().any(|node| node.name == name) {
                return Err(GraphError::DuplicateName(name.to_string()));
            }

            let inputs = input_names
                .iter()
                .map(|input| {
                    nodes
                        .iter()
                        .position(|node| node.name == *input)
                        .ok_or_else(|| GraphError::UnknownInput {
                            node: name.to_string(),
                            input: input.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            nodes.push(Node {
                name: name.to_string(),
                layer,
                inputs,
            });
        }

        let graph = Self { nodes };
        graph.validate()?;

        Ok(graph)
    }

    /// Parallel n-gram convolutions over the input, merged, pooled and projected to classes
    pub fn text_cnn(n_branches: usize, pooling: Pooling) -> Self {
        let mut nodes = vec![Node {
            name: INPUT.to_string(),
            layer: Layer::Input,
            inputs: vec![],
        }];

        for branch in 0..n_branches {
            nodes.push(Node {
                name: format!("cnn{}", branch + 1),
                layer: Layer::Convolution { branch },
                inputs: vec![0],
            });
        }

        let merge = nodes.len();
        nodes.push(Node {
            name: "merge".to_string(),
            layer: Layer::Merge,
            inputs: (1..merge).collect(),
        });

        nodes.push(Node {
            name: "globalPool".to_string(),
            layer: Layer::GlobalPool { pooling },
            inputs: vec![merge],
        });

        nodes.push(Node {
            name: "out".to_string(),
            layer: Layer::Dense,
            inputs: vec![merge + 1],
        });

        Self { nodes }
    }

    /// The nodes in evaluation order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Check names, input references, arity and value shapes of every node
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut names = HashSet::new();

        for (index, node) in self.nodes.iter().enumerate() {
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateName(node.name.clone()));
            }

            if (index == 0) != (node.layer == Layer::Input) {
                return Err(GraphError::Input(node.name.clone()));
            }

            let (min, max) = node.layer.arity();
            if node.inputs.len() < min || node.inputs.len() > max {
                return Err(GraphError::Arity {
                    node: node.name.clone(),
                    found: node.inputs.len(),
                });
            }

            for &input in &node.inputs {
                let Some(source) = self.nodes[..index].get(input) else {
                    return Err(GraphError::UnknownInput {
                        node: node.name.clone(),
                        input: input.to_string(),
                    });
                };

                if Some(source.layer.output_kind()) != node.layer.input_kind() {
                    return Err(GraphError::Shape {
                        node: node.name.clone(),
                        input: source.name.clone(),
                    });
                }
            }
        }

        match self.nodes.last() {
            Some(node) if node.layer.output_kind() == Kind::Features => Ok(()),
            Some(node) => Err(GraphError::Output(node.name.clone())),
            None => Err(GraphError::Empty),
        }
    }

    /// Evaluate every node in order and return the output of the last one
    pub fn execute<B: Backend, E: Executor<B>>(
        &self,
        executor: &E,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let mut values: Vec<Value<B>> = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let inputs: Vec<Value<B>> = node
                .inputs
                .iter()
                .map(|&index| values[index].clone())
                .collect();

            let value = match &node.layer {
                Layer::Input => Value::Grid(input.clone()),
                Layer::Merge => {
                    Value::Grid(Tensor::cat(inputs.into_iter().map(Value::into_grid).collect(), 1))
                }
                Layer::Convolution { branch } => {
                    Value::Grid(executor.convolution(*branch, single_input(node, inputs).into_grid()))
                }
                Layer::GlobalPool { pooling } => Value::Features(
                    executor.global_pool(pooling, single_input(node, inputs).into_grid()),
                ),
                Layer::Dense => {
                    Value::Features(executor.dense(single_input(node, inputs).into_features()))
                }
            };

            values.push(value);
        }

        match values.pop() {
            Some(output) => output.into_features(),
            None => unreachable!("executed a graph without nodes"),
        }
    }
}

/// The sole input of a convolution, pooling or dense node
fn single_input<B: Backend>(node: &Node, inputs: Vec<Value<B>>) -> Value<B> {
    match <[Value<B>; 1]>::try_from(inputs) {
        Ok([value]) => value,
        Err(inputs) => unreachable!(
            "node {:?} takes one input but was given {}",
            node.name,
            inputs.len()
        ),
    }
}

/// Parameterized operations a [`Graph`] delegates to
pub trait Executor<B: Backend> {
    /// Run convolution branch `branch` over a grid
    fn convolution(&self, branch: usize, input: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Reduce the token axis of a grid to one value per channel
    fn global_pool(&self, pooling: &Pooling, input: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Project features to class logits
    fn dense(&self, input: Tensor<B, 2>) -> Tensor<B, 2>;
}

#[derive(Clone, Debug)]
enum Value<B: Backend> {
    Grid(Tensor<B, 4>),
    Features(Tensor<B, 2>),
}

impl<B: Backend> Value<B> {
    fn into_grid(self) -> Tensor<B, 4> {
        match self {
            Value::Grid(tensor) => tensor,
            Value::Features(tensor) => {
                let [batch_size, features] = tensor.dims();
                tensor.reshape([batch_size, features, 1, 1])
            }
        }
    }

    fn into_features(self) -> Tensor<B, 2> {
        match self {
            Value::Grid(tensor) => tensor.flatten(1, 3),
            Value::Features(tensor) => tensor,
        }
    }
}

/// Graph Error
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The graph has no nodes
    #[error("the graph has no nodes")]
    Empty,

    /// Two nodes share a name
    #[error("duplicate node name {0}")]
    DuplicateName(String),

    /// The input node is missing or not first
    #[error("node {0}: the graph must start with exactly one input node")]
    Input(String),

    /// A node reads from a node that does not precede it
    #[error("node {node} reads from unknown node {input}")]
    UnknownInput {
        /// The reading node
        node: String,

        /// The missing input
        input: String,
    },

    /// A node has the wrong number of inputs
    #[error("node {node} has {found} inputs")]
    Arity {
        /// The offending node
        node: String,

        /// How many inputs it declares
        found: usize,
    },

    /// A node reads a value of the wrong shape family
    #[error("node {node} cannot read the output of {input}")]
    Shape {
        /// The reading node
        node: String,

        /// The incompatible input
        input: String,
    },

    /// The last node does not produce class scores
    #[error("output node {0} must produce a feature vector")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;

    type TestBackend = NdArray;

    /// Sums the grid over its last two axes and passes everything else through
    struct Summing;

    impl Executor<TestBackend> for Summing {
        fn convolution(&self, branch: usize, input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 4> {
            input.add_scalar(branch as f32)
        }

        fn global_pool(&self, _pooling: &Pooling, input: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            input.sum_dim(3).sum_dim(2).flatten(1, 3)
        }

        fn dense(&self, input: Tensor<TestBackend, 2>) -> Tensor<TestBackend, 2> {
            input
        }
    }

    #[test]
    fn test_text_cnn_topology() {
        let graph = Graph::text_cnn(3, Pooling::Max);

        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_str()).collect();

        assert_eq!(
            names,
            vec!["input", "cnn1", "cnn2", "cnn3", "merge", "globalPool", "out"]
        );
        assert_eq!(graph.nodes()[4].inputs, vec![1, 2, 3]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_from_layers_matches_text_cnn() {
        let graph = Graph::from_layers(vec![
            ("input", Layer::Input, vec![]),
            ("cnn1", Layer::Convolution { branch: 0 }, vec!["input"]),
            ("cnn2", Layer::Convolution { branch: 1 }, vec!["input"]),
            ("merge", Layer::Merge, vec!["cnn1", "cnn2"]),
            (
                "globalPool",
                Layer::GlobalPool {
                    pooling: Pooling::Avg,
                },
                vec!["merge"],
            ),
            ("out", Layer::Dense, vec!["globalPool"]),
        ])
        .unwrap();

        assert_eq!(graph, Graph::text_cnn(2, Pooling::Avg));
    }

    #[test]
    fn test_rejects_forward_references() {
        let result = Graph::from_layers(vec![
            ("input", Layer::Input, vec![]),
            ("merge", Layer::Merge, vec!["cnn1"]),
        ]);

        assert_eq!(
            result,
            Err(GraphError::UnknownInput {
                node: "merge".to_string(),
                input: "cnn1".to_string()
            })
        );
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let result = Graph::from_layers(vec![
            ("input", Layer::Input, vec![]),
            ("out", Layer::Dense, vec!["input"]),
        ]);

        assert!(matches!(result, Err(GraphError::Shape { .. })));
    }

    #[test]
    fn test_rejects_grid_output() {
        let result = Graph::from_layers(vec![
            ("input", Layer::Input, vec![]),
            ("cnn1", Layer::Convolution { branch: 0 }, vec!["input"]),
        ]);

        assert_eq!(result, Err(GraphError::Output("cnn1".to_string())));
    }

    #[test]
    fn test_execute_merges_branches_on_channels() {
        let device = Default::default();
        let graph = Graph::text_cnn(3, Pooling::Max);

        let input = Tensor::<TestBackend, 4>::ones([2, 1, 4, 1], &device);
        let output = graph.execute(&Summing, input);

        assert_eq!(output.dims(), [2, 3]);
        assert_eq!(
            output.into_data().convert::<f32>().value,
            vec![4.0, 8.0, 12.0, 4.0, 8.0, 12.0]
        );
    }

    #[test]
    #[should_panic(expected = "takes one input but was given 0")]
    fn test_execute_refuses_unvalidated_arity() {
        let device = Default::default();
        let graph = Graph {
            nodes: vec![
                Node {
                    name: "input".to_string(),
                    layer: Layer::Input,
                    inputs: vec![],
                },
                Node {
                    name: "out".to_string(),
                    layer: Layer::Dense,
                    inputs: vec![],
                },
            ],
        };

        graph.execute(&Summing, Tensor::<TestBackend, 4>::ones([1, 1, 2, 1], &device));
    }
}
