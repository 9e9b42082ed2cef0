//! Dense sigmoid network: algebra primitives, forward inference, and
//! mini-batch gradient-descent training

mod algebra;
mod cost;
mod net;
mod trainer;

pub use algebra::*;
pub use cost::*;
pub use net::*;
pub use trainer::*;
