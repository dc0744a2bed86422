//! Building blocks for transformer layers.
//!
//! This crate hosts the dense projections, normalisation, and feed-forward
//! components that the encoder and decoder stacks assemble from Candle
//! primitives. Inputs follow the `(batch, seq, hidden)` convention
//! throughout.

pub mod checks;
pub mod dropout;
pub mod feedforward;
pub mod linear;
pub mod norm;

pub use dropout::DropoutMode;
pub use feedforward::{FeedForward, FeedForwardConfig};
pub use linear::{Linear, LinearConfig};
pub use norm::{LayerNorm, NormPlacement, ParseNormPlacementError};
