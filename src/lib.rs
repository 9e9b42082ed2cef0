//! Feedforward neural-network engine for recall prediction experiments.
//!
//! The [`feedforward`] module holds the whole numeric core: dense vector and
//! matrix primitives, a sigmoid network with per-layer weight matrices and
//! bias vectors, a backpropagation trainer with preallocated scratch
//! buffers, and the cost functions used to watch training progress.
//!
//! The [`synthetic`] module generates spaced-repetition review interactions
//! from a simple memory model and encodes them into the fixed-shape
//! training pairs the engine consumes, so that training can be exercised
//! without any external data source.
//!
//! All randomness (parameter initialization, shuffling, synthetic sampling)
//! flows through caller-supplied [`rand::Rng`] values, so seeded runs are
//! reproducible end to end.

pub mod feedforward;
pub mod synthetic;
