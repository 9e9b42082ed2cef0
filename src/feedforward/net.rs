//! Network topology, parameter storage, and forward inference.

use std::fmt;

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::algebra::{sigmoid, Matrix, SizeMismatch, Vector};
use super::trainer::Trainer;

/// A dense sigmoid network.
///
/// The topology is the ordered list of layer widths `node_counts[0..=L]`:
/// `node_counts[0]` is the input width, `node_counts[L]` the output width,
/// and every layer `i` in `[0, L)` owns one weight matrix of shape
/// `node_counts[i+1] × node_counts[i]` and one bias vector of length
/// `node_counts[i+1]`. The invariants are enforced once at construction,
/// so inference and training only validate their per-call inputs.
#[derive(Debug)]
pub struct Network {
    /// Number of nodes in each layer, inputs included.
    pub(super) node_counts: Vec<usize>,

    /// One rectangular weight matrix per layer.
    pub(super) weights: Vec<Matrix>,

    /// One bias vector per layer.
    pub(super) biases: Vec<Vector>,
}

impl Network {
    /// Builds a network from explicit parameters, validating every
    /// topology invariant.
    ///
    /// # Arguments
    /// * `node_counts` - layer widths, inputs included;
    /// * `biases` - one bias vector per layer;
    /// * `weights` - one weight matrix per layer.
    ///
    /// # Returns
    /// * `Ok(Network)` when the counts and shapes all agree;
    /// * `Err(NewNetworkError)` naming the first violated invariant.
    pub fn new(
        node_counts: Vec<usize>,
        biases: Vec<Vector>,
        weights: Vec<Matrix>,
    ) -> Result<Network, NewNetworkError> {
        if node_counts.is_empty() {
            return Err(NewNetworkError::EmptyTopology);
        }
        let layer_count = node_counts.len() - 1;

        if biases.len() != layer_count {
            return Err(NewNetworkError::LayerCountMismatch(SizeMismatch {
                expected: layer_count,
                got: biases.len(),
            }));
        }
        if weights.len() != layer_count {
            return Err(NewNetworkError::WeightCountMismatch(SizeMismatch {
                expected: layer_count,
                got: weights.len(),
            }));
        }

        for (layer, weight) in weights.iter().enumerate() {
            if !weight.is_rectangular() {
                return Err(NewNetworkError::NonRectangularWeight { layer });
            }
            let expected = (node_counts[layer + 1], node_counts[layer]);
            let got = (weight.height(), weight.width());
            if expected != got {
                return Err(NewNetworkError::BadWeightShape {
                    layer,
                    expected,
                    got,
                });
            }
        }
        for (layer, bias) in biases.iter().enumerate() {
            if bias.len() != node_counts[layer + 1] {
                return Err(NewNetworkError::BadBiasLength {
                    layer,
                    mismatch: SizeMismatch {
                        expected: node_counts[layer + 1],
                        got: bias.len(),
                    },
                });
            }
        }

        Ok(Network {
            node_counts,
            weights,
            biases,
        })
    }

    /// Builds a network of the given topology with every weight and bias
    /// drawn independently from the standard normal distribution.
    ///
    /// # Examples
    /// ```
    /// use rand::rngs::StdRng;
    /// use rand::SeedableRng;
    /// # use srsnet::feedforward::Network;
    /// let mut rng = StdRng::seed_from_u64(7);
    /// let net = Network::from_node_counts(&[4, 8, 2], &mut rng).unwrap();
    /// assert_eq!(net.layer_count(), 2);
    /// ```
    pub fn from_node_counts<R>(node_counts: &[usize], rng: &mut R) -> Result<Network, NewNetworkError>
    where
        R: Rng + ?Sized,
    {
        if node_counts.is_empty() {
            return Err(NewNetworkError::EmptyTopology);
        }
        let layer_count = node_counts.len() - 1;

        let mut biases = Vec::with_capacity(layer_count);
        let mut weights = Vec::with_capacity(layer_count);
        for layer in 0..layer_count {
            let (input_width, output_width) = (node_counts[layer], node_counts[layer + 1]);
            biases.push(Vector::from_fn(output_width, |_| StandardNormal.sample(rng)));
            weights.push(Matrix::from_fn(output_width, input_width, |_, _| {
                StandardNormal.sample(rng)
            }));
        }

        Ok(Network {
            node_counts: node_counts.to_vec(),
            weights,
            biases,
        })
    }

    /// Builds a randomly initialized network whose layer widths are the
    /// row lengths of `layout`, typically a hand-authored (and possibly
    /// ragged) parsed matrix.
    pub fn from_layout<R>(layout: &Matrix, rng: &mut R) -> Result<Network, NewNetworkError>
    where
        R: Rng + ?Sized,
    {
        let node_counts: Vec<usize> = layout.iter().map(Vector::len).collect();
        Network::from_node_counts(&node_counts, rng)
    }

    /// Layer widths, inputs included.
    pub fn node_counts(&self) -> &[usize] {
        &self.node_counts
    }

    /// Number of trainable layers.
    pub fn layer_count(&self) -> usize {
        self.node_counts.len() - 1
    }

    pub fn input_size(&self) -> usize {
        self.node_counts[0]
    }

    pub fn output_size(&self) -> usize {
        self.node_counts[self.node_counts.len() - 1]
    }

    pub fn weights(&self) -> &[Matrix] {
        &self.weights
    }

    pub fn biases(&self) -> &[Vector] {
        &self.biases
    }

    /// Runs the input through every layer: `z = W·a + b`, `a = sigmoid(z)`.
    ///
    /// Deterministic for fixed parameters, with no side effects. A network
    /// with zero layers returns the input unchanged.
    ///
    /// # Returns
    /// * `Ok(Vector)` holding the output layer's activation;
    /// * `Err(FeedForwardError::BadInput)` when the input length does not
    ///   match the declared input width.
    pub fn feed_forward(&self, input: &Vector) -> Result<Vector, FeedForwardError> {
        if input.len() != self.input_size() {
            return Err(FeedForwardError::BadInput(SizeMismatch {
                expected: self.input_size(),
                got: input.len(),
            }));
        }

        let mut activation = input.clone();
        for (weight, bias) in self.weights.iter().zip(self.biases.iter()) {
            let mut z = Vector::zeros(bias.len());
            affine_into(weight, &activation, bias, &mut z);
            z.apply(sigmoid);
            activation = z;
        }
        Ok(activation)
    }

    /// Consumes the network and allocates the scratch buffers needed for
    /// training. Consuming prevents a second concurrent trainer over the
    /// same parameters; [`Trainer::into_network`] hands the network back.
    pub fn into_trainer(self) -> Trainer {
        Trainer::build(self)
    }
}

/// Writes `weight · input + bias` into `out`. Shapes are the caller's
/// invariant; every user runs behind construction-time validation.
pub(super) fn affine_into(weight: &Matrix, input: &Vector, bias: &Vector, out: &mut Vector) {
    for i in 0..out.len() {
        let row = &weight[i];
        let mut sum = bias[i];
        for j in 0..input.len() {
            sum += row[j] * input[j];
        }
        out[i] = sum;
    }
}

/// Error raised when constructing a [`Network`] from inconsistent parts.
#[derive(Debug, Clone, PartialEq)]
pub enum NewNetworkError {
    /// The layer-width list was empty.
    EmptyTopology,
    /// The bias count disagrees with the declared layer count.
    LayerCountMismatch(SizeMismatch),
    /// The weight-matrix count disagrees with the declared layer count.
    WeightCountMismatch(SizeMismatch),
    /// A layer's weight matrix has the wrong dimensions.
    BadWeightShape {
        layer: usize,
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// A layer's bias vector has the wrong length.
    BadBiasLength { layer: usize, mismatch: SizeMismatch },
    /// A layer's weight matrix is ragged.
    NonRectangularWeight { layer: usize },
}

impl fmt::Display for NewNetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NewNetworkError::EmptyTopology => {
                write!(f, "a network needs at least an input layer width")
            }
            NewNetworkError::LayerCountMismatch(mismatch) => {
                write!(f, "bias vectors do not cover the layers: {}", mismatch)
            }
            NewNetworkError::WeightCountMismatch(mismatch) => {
                write!(f, "weight matrices do not cover the layers: {}", mismatch)
            }
            NewNetworkError::BadWeightShape {
                layer,
                expected,
                got,
            } => write!(
                f,
                "layer {} weight matrix is {}x{}, the topology needs {}x{}",
                layer, got.0, got.1, expected.0, expected.1
            ),
            NewNetworkError::BadBiasLength { layer, mismatch } => {
                write!(f, "layer {} bias length is wrong: {}", layer, mismatch)
            }
            NewNetworkError::NonRectangularWeight { layer } => {
                write!(f, "layer {} weight matrix is not rectangular", layer)
            }
        }
    }
}

impl std::error::Error for NewNetworkError {}

/// Error raised by [`Network::feed_forward`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedForwardError {
    /// The input length does not match the network's input width.
    BadInput(SizeMismatch),
}

impl fmt::Display for FeedForwardError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeedForwardError::BadInput(mismatch) => {
                write!(f, "input does not fit the input layer: {}", mismatch)
            }
        }
    }
}

impl std::error::Error for FeedForwardError {}
