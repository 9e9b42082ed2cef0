//! Backpropagation and the mini-batch gradient-descent loop.

use std::fmt;

use itertools::izip;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::algebra::{sigmoid, sigmoid_prime_from, Matrix, SizeMismatch, Vector};
use super::net::{affine_into, Network};

/// Network trainer.
///
/// Training needs per-layer working state beyond the network parameters:
/// the recorded forward pass (pre-activations and activations), the
/// per-layer error terms, and the gradient accumulators. All of it is
/// allocated once here, when [`Network::into_trainer`] consumes the
/// network, and reused for every sample afterwards; nothing is allocated
/// inside the training loop. Consuming the network also makes a second
/// concurrent trainer over the same parameters unrepresentable.
///
/// A session looks like:
/// * `let mut trainer = net.into_trainer();`
/// * one or more [`Trainer::train`] calls (or manual
///   [`Trainer::back_propagate`] / [`Trainer::apply_update`] driving);
/// * [`Trainer::into_network`] to get the trained network back.
pub struct Trainer {
    net: Network,

    /// Recorded pre-activation `z = W·a + b` per layer.
    zs: Vec<Vector>,

    /// Recorded activations; `activations[0]` is a copy of the sample
    /// input, `activations[l + 1] = sigmoid(zs[l])`.
    activations: Vec<Vector>,

    /// Per-layer error terms of the sample most recently propagated.
    deltas: Vec<Vector>,

    /// Gradient accumulators, shaped like the biases. Hold the *sum* of
    /// per-sample gradients since the last [`Trainer::apply_update`].
    nabla_biases: Vec<Vector>,

    /// Gradient accumulators, shaped like the weights.
    nabla_weights: Vec<Matrix>,

    /// Number of samples summed into the accumulators.
    sample_count: usize,
}

impl Trainer {
    /// Consumes a network and allocates every scratch buffer for it.
    pub(super) fn build(net: Network) -> Trainer {
        let counts = net.node_counts().to_vec();
        let layer_count = counts.len() - 1;

        let zs: Vec<Vector> = (0..layer_count)
            .map(|layer| Vector::zeros(counts[layer + 1]))
            .collect();
        let deltas = zs.clone();
        let nabla_biases = zs.clone();
        let activations: Vec<Vector> = counts.iter().map(|&width| Vector::zeros(width)).collect();
        let nabla_weights: Vec<Matrix> = net.weights().iter().map(Matrix::zeros_like).collect();

        Trainer {
            net,
            zs,
            activations,
            deltas,
            nabla_biases,
            nabla_weights,
            sample_count: 0,
        }
    }

    /// The contained network.
    pub fn network(&self) -> &Network {
        &self.net
    }

    /// Mutable access to the contained network.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.net
    }

    /// Consumes the trainer, dropping the scratch buffers, and returns the
    /// network. Gradients accumulated but not yet applied are lost.
    pub fn into_network(self) -> Network {
        self.net
    }

    /// Sum of per-sample bias gradients accumulated so far, per layer.
    pub fn nabla_biases(&self) -> &[Vector] {
        &self.nabla_biases
    }

    /// Sum of per-sample weight gradients accumulated so far, per layer.
    pub fn nabla_weights(&self) -> &[Matrix] {
        &self.nabla_weights
    }

    /// Number of samples summed into the accumulators.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Zeroes the gradient accumulators and the sample counter without
    /// touching the network parameters.
    pub fn reset_gradients(&mut self) {
        for nabla in &mut self.nabla_biases {
            nabla.fill_zero();
        }
        for nabla in &mut self.nabla_weights {
            nabla.fill_zero();
        }
        self.sample_count = 0;
    }

    /// Runs one sample forward, then backpropagates the quadratic-cost
    /// error, *adding* this sample's gradients into the accumulators.
    ///
    /// The forward pass records every layer's pre-activation and
    /// activation. The output-layer error is
    /// `(a_L - target) ⊙ σ'(z_{L-1})`; earlier layers follow
    /// `delta_l = (W_{l+1}ᵀ · delta_{l+1}) ⊙ σ'(z_l)`, and each layer
    /// contributes `delta_l` to its bias gradient and the outer product
    /// `delta_l · a_lᵀ` to its weight gradient. `σ'` is taken from the
    /// recorded activations (`σ'(z) = a·(1-a)`), skipping a second
    /// exponential per node.
    ///
    /// # Returns
    /// * `Ok(())` once the accumulators hold this sample's contribution;
    /// * `Err(TrainError::BadInput)` / `Err(TrainError::BadTarget)` when
    ///   the sample does not fit the network's input/output widths.
    pub fn back_propagate(&mut self, input: &Vector, target: &Vector) -> Result<(), TrainError> {
        if input.len() != self.net.input_size() {
            return Err(TrainError::BadInput(SizeMismatch {
                expected: self.net.input_size(),
                got: input.len(),
            }));
        }
        if target.len() != self.net.output_size() {
            return Err(TrainError::BadTarget(SizeMismatch {
                expected: self.net.output_size(),
                got: target.len(),
            }));
        }

        let layer_count = self.net.layer_count();
        self.activations[0].copy_from(input);
        if layer_count == 0 {
            // Identity network: nothing to differentiate.
            self.sample_count += 1;
            return Ok(());
        }

        // Forward pass, recording z and a for every layer.
        for l in 0..layer_count {
            affine_into(
                &self.net.weights[l],
                &self.activations[l],
                &self.net.biases[l],
                &mut self.zs[l],
            );
            let (z, activation) = (&self.zs[l], &mut self.activations[l + 1]);
            for (a, &pre) in izip!(activation.iter_mut(), z.iter()) {
                *a = sigmoid(pre);
            }
        }

        // Backward pass.
        for l in (0..layer_count).rev() {
            if l + 1 == layer_count {
                // Output-layer error from the quadratic cost.
                let (delta, output) = (&mut self.deltas[l], &self.activations[l + 1]);
                for (d, &a, &t) in izip!(delta.iter_mut(), output.iter(), target.iter()) {
                    *d = (a - t) * sigmoid_prime_from(a);
                }
            } else {
                let (head, tail) = self.deltas.split_at_mut(l + 1);
                let (delta, delta_next) = (&mut head[l], &tail[0]);
                let weight_next = &self.net.weights[l + 1];
                let activation = &self.activations[l + 1];
                for i in 0..delta.len() {
                    let mut sum = 0.0;
                    for (k, &d_next) in delta_next.iter().enumerate() {
                        sum += weight_next[k][i] * d_next;
                    }
                    delta[i] = sum * sigmoid_prime_from(activation[i]);
                }
            }

            // This layer's contribution to the gradient sums.
            let delta = &self.deltas[l];
            let previous = &self.activations[l];
            let (nabla_bias, nabla_weight) = (&mut self.nabla_biases[l], &mut self.nabla_weights[l]);
            for i in 0..delta.len() {
                nabla_bias[i] += delta[i];
                let row = &mut nabla_weight[i];
                for (j, &a) in previous.iter().enumerate() {
                    row[j] += delta[i] * a;
                }
            }
        }

        self.sample_count += 1;
        Ok(())
    }

    /// Applies the accumulated gradients as one descent step:
    /// `param -= (eta / samples) * nabla`, i.e. the learning rate times
    /// the arithmetic mean of the per-sample gradients. Afterwards the
    /// accumulators are zero and the counter is reset. Does nothing when
    /// no samples were accumulated.
    pub fn apply_update(&mut self, eta: f64) {
        if self.sample_count == 0 {
            return;
        }
        let step = eta / self.sample_count as f64;

        for (weight, nabla) in izip!(self.net.weights.iter_mut(), self.nabla_weights.iter_mut()) {
            for (row, nabla_row) in izip!(weight.iter_mut(), nabla.iter_mut()) {
                for (value, gradient) in izip!(row.iter_mut(), nabla_row.iter_mut()) {
                    *value -= step * *gradient;
                    *gradient = 0.0;
                }
            }
        }
        for (bias, nabla) in izip!(self.net.biases.iter_mut(), self.nabla_biases.iter_mut()) {
            for (value, gradient) in izip!(bias.iter_mut(), nabla.iter_mut()) {
                *value -= step * *gradient;
                *gradient = 0.0;
            }
        }
        self.sample_count = 0;
    }

    /// Trains on the given pairs by mini-batch stochastic gradient descent.
    ///
    /// Every pair is validated against the network's input/output widths
    /// before anything runs. `on_epoch` is invoked once before the first
    /// epoch (baseline) and once after each epoch; it receives the current
    /// network and its result is ignored. Each epoch shuffles the data
    /// with the supplied generator and walks it in consecutive batches of
    /// `batch_size`; a final shorter batch is still processed, its update
    /// averaged over its own length.
    ///
    /// # Arguments
    /// * `pairs` - training samples as (input, target) vectors;
    /// * `eta` - learning rate;
    /// * `epochs` - number of passes over the shuffled data;
    /// * `batch_size` - samples averaged per parameter update;
    /// * `rng` - shuffle source, injectable for reproducible runs;
    /// * `on_epoch` - reporting hook.
    pub fn train<R, F>(
        &mut self,
        pairs: &[(Vector, Vector)],
        eta: f64,
        epochs: usize,
        batch_size: usize,
        rng: &mut R,
        mut on_epoch: F,
    ) -> Result<(), TrainError>
    where
        R: Rng + ?Sized,
        F: FnMut(&Network),
    {
        if batch_size == 0 {
            return Err(TrainError::BadBatchSize(0));
        }
        let (input_size, output_size) = (self.net.input_size(), self.net.output_size());
        for (index, (input, target)) in pairs.iter().enumerate() {
            if input.len() != input_size {
                return Err(TrainError::BadSampleInput {
                    index,
                    mismatch: SizeMismatch {
                        expected: input_size,
                        got: input.len(),
                    },
                });
            }
            if target.len() != output_size {
                return Err(TrainError::BadSampleTarget {
                    index,
                    mismatch: SizeMismatch {
                        expected: output_size,
                        got: target.len(),
                    },
                });
            }
        }

        let mut order: Vec<usize> = (0..pairs.len()).collect();

        on_epoch(&self.net);
        for epoch in 0..epochs {
            order.shuffle(rng);
            for batch in order.chunks(batch_size) {
                for &index in batch {
                    let (input, target) = &pairs[index];
                    self.back_propagate(input, target)?;
                }
                self.apply_update(eta);
            }
            debug!("epoch {}/{} applied", epoch + 1, epochs);
            on_epoch(&self.net);
        }
        Ok(())
    }
}

/// Error raised by [`Trainer::back_propagate`] and [`Trainer::train`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrainError {
    /// A sample input does not fit the network's input width.
    BadInput(SizeMismatch),
    /// A sample target does not fit the network's output width.
    BadTarget(SizeMismatch),
    /// Pair at `index` has a misshapen input.
    BadSampleInput { index: usize, mismatch: SizeMismatch },
    /// Pair at `index` has a misshapen target.
    BadSampleTarget { index: usize, mismatch: SizeMismatch },
    /// The batch size must be at least one.
    BadBatchSize(usize),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainError::BadInput(mismatch) => {
                write!(f, "sample input does not fit the network: {}", mismatch)
            }
            TrainError::BadTarget(mismatch) => {
                write!(f, "sample target does not fit the network: {}", mismatch)
            }
            TrainError::BadSampleInput { index, mismatch } => {
                write!(f, "pair {} input does not fit the network: {}", index, mismatch)
            }
            TrainError::BadSampleTarget { index, mismatch } => {
                write!(f, "pair {} target does not fit the network: {}", index, mismatch)
            }
            TrainError::BadBatchSize(got) => {
                write!(f, "batch size must be at least 1, got {}", got)
            }
        }
    }
}

impl std::error::Error for TrainError {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn single_neuron(weight: f64, bias: f64) -> Network {
        Network::new(
            vec![1, 1],
            vec![Vector::from(vec![bias])],
            vec![Matrix::from_rows(vec![Vector::from(vec![weight])])],
        )
        .unwrap()
    }

    #[test]
    fn single_sample_gradient_matches_hand_derivation() {
        // w = 0.5, b = -0.25, x = 2.0, t = 0.3:
        //   z = 0.75, a = sigmoid(z)
        //   delta = (a - t) * a * (1 - a)
        //   nabla_w = delta * x, nabla_b = delta
        let mut trainer = single_neuron(0.5, -0.25).into_trainer();
        trainer
            .back_propagate(&Vector::from(vec![2.0]), &Vector::from(vec![0.3]))
            .unwrap();

        let a = sigmoid(0.75);
        let delta = (a - 0.3) * a * (1.0 - a);
        assert_relative_eq!(trainer.nabla_biases()[0][0], delta, epsilon = 1e-12);
        assert_relative_eq!(trainer.nabla_weights()[0][0][0], delta * 2.0, epsilon = 1e-12);
        assert_eq!(trainer.sample_count(), 1);
    }

    #[test]
    fn two_layer_gradient_matches_hand_derivation() {
        // 1 -> 1 -> 1 chain with all-explicit parameters.
        let (w0, b0, w1, b1) = (0.8, 0.1, -1.2, 0.4);
        let net = Network::new(
            vec![1, 1, 1],
            vec![Vector::from(vec![b0]), Vector::from(vec![b1])],
            vec![
                Matrix::from_rows(vec![Vector::from(vec![w0])]),
                Matrix::from_rows(vec![Vector::from(vec![w1])]),
            ],
        )
        .unwrap();
        let (x, t) = (1.5, 0.9);

        let mut trainer = net.into_trainer();
        trainer
            .back_propagate(&Vector::from(vec![x]), &Vector::from(vec![t]))
            .unwrap();

        let a1 = sigmoid(w0 * x + b0);
        let a2 = sigmoid(w1 * a1 + b1);
        let delta1 = (a2 - t) * a2 * (1.0 - a2);
        let delta0 = w1 * delta1 * a1 * (1.0 - a1);

        assert_relative_eq!(trainer.nabla_biases()[1][0], delta1, epsilon = 1e-12);
        assert_relative_eq!(trainer.nabla_weights()[1][0][0], delta1 * a1, epsilon = 1e-12);
        assert_relative_eq!(trainer.nabla_biases()[0][0], delta0, epsilon = 1e-12);
        assert_relative_eq!(trainer.nabla_weights()[0][0][0], delta0 * x, epsilon = 1e-12);
    }

    #[test]
    fn accumulated_batch_mean_equals_mean_of_per_sample_gradients() {
        let samples = vec![
            (Vector::from(vec![0.3, -1.1]), Vector::from(vec![0.2])),
            (Vector::from(vec![1.4, 0.6]), Vector::from(vec![0.9])),
            (Vector::from(vec![-0.7, 0.2]), Vector::from(vec![0.5])),
        ];
        let mut rng = StdRng::seed_from_u64(21);
        let net = Network::from_node_counts(&[2, 3, 1], &mut rng).unwrap();
        let mut trainer = net.into_trainer();

        // Per-sample gradients, one at a time.
        let mut individual: Vec<Vec<Matrix>> = Vec::new();
        for (input, target) in &samples {
            trainer.back_propagate(input, target).unwrap();
            individual.push(trainer.nabla_weights().to_vec());
            trainer.reset_gradients();
        }

        // Whole batch accumulated at once.
        for (input, target) in &samples {
            trainer.back_propagate(input, target).unwrap();
        }
        assert_eq!(trainer.sample_count(), samples.len());

        let count = samples.len() as f64;
        for layer in 0..trainer.network().layer_count() {
            let summed = &trainer.nabla_weights()[layer];
            for i in 0..summed.height() {
                for j in 0..summed.width() {
                    let mean_of_singles: f64 = individual
                        .iter()
                        .map(|gradients| gradients[layer][i][j])
                        .sum::<f64>()
                        / count;
                    assert_relative_eq!(
                        summed[i][j] / count,
                        mean_of_singles,
                        epsilon = 1e-12
                    );
                }
            }
        }
    }

    #[test]
    fn apply_update_takes_the_mean_step_and_clears() {
        let mut trainer = single_neuron(0.0, 0.0).into_trainer();
        // Two identical samples: mean gradient equals each one's gradient.
        let (input, target) = (Vector::from(vec![1.0]), Vector::from(vec![1.0]));
        trainer.back_propagate(&input, &target).unwrap();
        trainer.back_propagate(&input, &target).unwrap();

        let a = sigmoid(0.0);
        let delta = (a - 1.0) * a * (1.0 - a);
        trainer.apply_update(2.0);

        let net = trainer.network();
        assert_relative_eq!(net.weights()[0][0][0], -2.0 * delta, epsilon = 1e-12);
        assert_relative_eq!(net.biases()[0][0], -2.0 * delta, epsilon = 1e-12);
        assert_eq!(trainer.sample_count(), 0);
        assert_relative_eq!(trainer.nabla_weights()[0][0][0], 0.0);
        assert_relative_eq!(trainer.nabla_biases()[0][0], 0.0);
    }

    #[test]
    fn apply_update_without_samples_is_a_no_op() {
        let mut trainer = single_neuron(0.7, -0.2).into_trainer();
        trainer.apply_update(10.0);
        assert_relative_eq!(trainer.network().weights()[0][0][0], 0.7);
        assert_relative_eq!(trainer.network().biases()[0][0], -0.2);
    }

    #[test]
    fn train_validates_everything_up_front() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = Network::from_node_counts(&[2, 1], &mut rng).unwrap();
        let mut trainer = net.into_trainer();

        let good = (Vector::from(vec![0.0, 0.0]), Vector::from(vec![0.0]));
        let bad_input = (Vector::from(vec![0.0]), Vector::from(vec![0.0]));
        let bad_target = (Vector::from(vec![0.0, 0.0]), Vector::from(vec![0.0, 0.0]));

        let err = trainer
            .train(&[good.clone()], 0.1, 1, 0, &mut rng, |_| {})
            .unwrap_err();
        assert_eq!(err, TrainError::BadBatchSize(0));

        let err = trainer
            .train(
                &[good.clone(), bad_input],
                0.1,
                1,
                1,
                &mut rng,
                |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, TrainError::BadSampleInput { index: 1, .. }));

        let err = trainer
            .train(&[bad_target], 0.1, 1, 1, &mut rng, |_| {})
            .unwrap_err();
        assert!(matches!(err, TrainError::BadSampleTarget { index: 0, .. }));

        // Nothing was applied by the failed calls.
        assert_eq!(trainer.sample_count(), 0);
    }

    #[test]
    fn on_epoch_runs_once_per_epoch_plus_baseline() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = Network::from_node_counts(&[1, 1], &mut rng).unwrap();
        let mut trainer = net.into_trainer();
        let pairs = vec![(Vector::from(vec![0.5]), Vector::from(vec![0.5]))];

        let mut calls = 0;
        trainer
            .train(&pairs, 0.1, 5, 2, &mut rng, |_| calls += 1)
            .unwrap();
        assert_eq!(calls, 6);
    }

    #[test]
    fn training_is_reproducible_for_a_fixed_seed() {
        let pairs = vec![
            (Vector::from(vec![0.1, 0.9]), Vector::from(vec![0.3])),
            (Vector::from(vec![0.8, 0.2]), Vector::from(vec![0.7])),
            (Vector::from(vec![0.4, 0.4]), Vector::from(vec![0.5])),
        ];
        let run = || {
            let mut init_rng = StdRng::seed_from_u64(33);
            let net = Network::from_node_counts(&[2, 4, 1], &mut init_rng).unwrap();
            let mut trainer = net.into_trainer();
            let mut shuffle_rng = StdRng::seed_from_u64(77);
            trainer
                .train(&pairs, 0.5, 20, 2, &mut shuffle_rng, |_| {})
                .unwrap();
            trainer.into_network()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.weights(), b.weights());
        assert_eq!(a.biases(), b.biases());
    }

    #[test]
    fn partial_final_batch_is_processed() {
        // Three samples with batch size 2: the final single-sample batch
        // must still move the parameters.
        let pairs = vec![
            (Vector::from(vec![1.0]), Vector::from(vec![0.9])),
            (Vector::from(vec![1.0]), Vector::from(vec![0.9])),
            (Vector::from(vec![1.0]), Vector::from(vec![0.9])),
        ];
        let mut trainer = single_neuron(0.0, 0.0).into_trainer();
        let mut rng = StdRng::seed_from_u64(4);
        trainer.train(&pairs, 1.0, 1, 2, &mut rng, |_| {}).unwrap();

        // Identical samples: after the 2-batch the parameters moved by the
        // full per-sample step once, after the 1-batch once more.
        let a0 = sigmoid(0.0);
        let delta0 = (a0 - 0.9) * a0 * (1.0 - a0);
        let after_first = -delta0; // eta = 1.0, mean of two equal gradients
        let z1 = after_first * 1.0 + after_first;
        let a1 = sigmoid(z1);
        let delta1 = (a1 - 0.9) * a1 * (1.0 - a1);
        let expected_weight = after_first - delta1;

        assert_relative_eq!(
            trainer.network().weights()[0][0][0],
            expected_weight,
            epsilon = 1e-12
        );
    }
}
