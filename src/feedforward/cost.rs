//! Cost functions and the epoch reporting helper.

use std::fmt;

use itertools::izip;
use tracing::info;

use super::algebra::{SizeMismatch, Vector};
use super::net::{FeedForwardError, Network};

/// Quadratic cost over a set of pairs: the squared elementwise differences
/// between `feed_forward(input)` and `target`, summed across all pairs and
/// divided by `2 * pairs.len()`. An empty set costs `0.0`.
///
/// # Returns
/// * `Ok(f64)` with the cost;
/// * `Err(CostError)` when a pair does not fit the network's widths.
pub fn mean_squared_cost(net: &Network, pairs: &[(Vector, Vector)]) -> Result<f64, CostError> {
    if pairs.is_empty() {
        return Ok(0.0);
    }

    let mut total = 0.0;
    for (input, target) in pairs {
        let output = net.feed_forward(input)?;
        if target.len() != output.len() {
            return Err(CostError::BadTarget(SizeMismatch {
                expected: output.len(),
                got: target.len(),
            }));
        }
        total += izip!(output.iter(), target.iter())
            .map(|(&out, &want)| {
                let diff = out - want;
                diff * diff
            })
            .sum::<f64>();
    }
    Ok(total / (2.0 * pairs.len() as f64))
}

/// Fraction of output units whose thresholded prediction disagrees with the
/// thresholded target, both cut at `0.5`, across all pairs. An empty set
/// (or a network with no output units) reports `0.0`.
pub fn classification_error_rate(
    net: &Network,
    pairs: &[(Vector, Vector)],
) -> Result<f64, CostError> {
    let mut mismatched = 0usize;
    let mut total = 0usize;
    for (input, target) in pairs {
        let output = net.feed_forward(input)?;
        if target.len() != output.len() {
            return Err(CostError::BadTarget(SizeMismatch {
                expected: output.len(),
                got: target.len(),
            }));
        }
        for (&out, &want) in izip!(output.iter(), target.iter()) {
            total += 1;
            if (out > 0.5) != (want > 0.5) {
                mismatched += 1;
            }
        }
    }
    if total == 0 {
        return Ok(0.0);
    }
    Ok(mismatched as f64 / total as f64)
}

/// Builds a reporting hook for [`crate::feedforward::Trainer::train`] that
/// logs both costs over `pairs` on every `every`-th invocation (the first
/// one included, so the baseline report is always emitted).
pub fn cost_logger(pairs: Vec<(Vector, Vector)>, every: usize) -> impl FnMut(&Network) {
    let every = every.max(1);
    let mut calls = 0usize;
    move |net: &Network| {
        if calls % every == 0 {
            let cost = mean_squared_cost(net, &pairs).unwrap_or(f64::NAN);
            let rate = classification_error_rate(net, &pairs).unwrap_or(f64::NAN);
            info!(
                "report {}: cost = {:.6}, classification error rate = {:.4}",
                calls, cost, rate
            );
        }
        calls += 1;
    }
}

/// Error raised by the cost functions.
#[derive(Debug, Clone, PartialEq)]
pub enum CostError {
    /// A pair's input does not fit the network's input width.
    BadInput(SizeMismatch),
    /// A pair's target does not fit the network's output width.
    BadTarget(SizeMismatch),
}

impl From<FeedForwardError> for CostError {
    fn from(err: FeedForwardError) -> CostError {
        match err {
            FeedForwardError::BadInput(mismatch) => CostError::BadInput(mismatch),
        }
    }
}

impl fmt::Display for CostError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CostError::BadInput(mismatch) => {
                write!(f, "pair input does not fit the network: {}", mismatch)
            }
            CostError::BadTarget(mismatch) => {
                write!(f, "pair target does not fit the network: {}", mismatch)
            }
        }
    }
}

impl std::error::Error for CostError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedforward::Matrix;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Identity network: zero layers, output == input. Keeps expected
    /// costs exact.
    fn passthrough(width: usize) -> Network {
        let mut rng = StdRng::seed_from_u64(0);
        Network::from_node_counts(&[width], &mut rng).unwrap()
    }

    #[test]
    fn mean_squared_cost_of_exact_predictions_is_zero() {
        let net = passthrough(2);
        let pairs = vec![(
            Vector::from(vec![0.25, 0.75]),
            Vector::from(vec![0.25, 0.75]),
        )];
        assert_relative_eq!(mean_squared_cost(&net, &pairs).unwrap(), 0.0);
    }

    #[test]
    fn mean_squared_cost_halves_the_mean_squared_distance() {
        let net = passthrough(1);
        let pairs = vec![
            (Vector::from(vec![1.0]), Vector::from(vec![0.0])),
            (Vector::from(vec![0.0]), Vector::from(vec![2.0])),
        ];
        // (1 + 4) / (2 * 2)
        assert_relative_eq!(mean_squared_cost(&net, &pairs).unwrap(), 1.25);
    }

    #[test]
    fn empty_pair_list_costs_nothing() {
        let net = passthrough(1);
        assert_relative_eq!(mean_squared_cost(&net, &[]).unwrap(), 0.0);
        assert_relative_eq!(classification_error_rate(&net, &[]).unwrap(), 0.0);
    }

    #[test]
    fn classification_error_rate_counts_threshold_disagreements() {
        let net = passthrough(2);
        let pairs = vec![
            // Both units agree with their targets across the 0.5 cut.
            (Vector::from(vec![0.9, 0.1]), Vector::from(vec![0.66, 0.33])),
            // One unit of two disagrees.
            (Vector::from(vec![0.9, 0.9]), Vector::from(vec![0.66, 0.33])),
        ];
        assert_relative_eq!(
            classification_error_rate(&net, &pairs).unwrap(),
            0.25
        );
    }

    #[test]
    fn cost_functions_reject_misshapen_pairs() {
        let net = passthrough(2);
        let short_input = vec![(Vector::from(vec![0.5]), Vector::from(vec![0.5, 0.5]))];
        assert!(matches!(
            mean_squared_cost(&net, &short_input),
            Err(CostError::BadInput(_))
        ));

        let short_target = vec![(Vector::from(vec![0.5, 0.5]), Vector::from(vec![0.5]))];
        assert!(matches!(
            classification_error_rate(&net, &short_target),
            Err(CostError::BadTarget(_))
        ));
    }

    #[test]
    fn cost_over_a_real_layer_uses_the_forward_pass() {
        // Single neuron w=1, b=0 maps 2.0 to sigmoid(2.0).
        let net = Network::new(
            vec![1, 1],
            vec![Vector::from(vec![0.0])],
            vec![Matrix::from_rows(vec![Vector::from(vec![1.0])])],
        )
        .unwrap();
        let pairs = vec![(Vector::from(vec![2.0]), Vector::from(vec![0.0]))];
        let expected = 0.8807970780f64.powi(2) / 2.0;
        assert_relative_eq!(
            mean_squared_cost(&net, &pairs).unwrap(),
            expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn cost_logger_is_callable_as_a_hook() {
        let net = passthrough(1);
        let pairs = vec![(Vector::from(vec![0.4]), Vector::from(vec![0.4]))];
        let mut hook = cost_logger(pairs, 2);
        // No subscriber installed; the hook must still run quietly.
        hook(&net);
        hook(&net);
        hook(&net);
    }
}
