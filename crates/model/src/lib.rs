//! Sequence-to-sequence transformer for neural machine translation.
//!
//! The [`Transformer`] composition root wires an [`Encoder`] and a
//! [`Decoder`] together with a precomputed causal mask and drives both
//! teacher-forced training passes and greedy autoregressive generation.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod transformer;

pub use config::TransformerConfig;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use layers::DropoutMode;
pub use transformer::Transformer;
