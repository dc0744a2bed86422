//! Attention primitives for the encoder-decoder translation model.
//!
//! The crate provides boolean mask construction (causal and padding) and a
//! multi-head scaled dot-product attention layer that serves both
//! self-attention and cross-attention. Masks use dtype `u8` where `1` marks
//! a position that may be attended and `0` one that is blocked; the
//! conversion to additive `-inf` scores happens inside the attention layer
//! immediately before the softmax.

pub mod masks;
pub mod multi_head;

pub use masks::{combine_target_mask, padding_mask, CausalMask};
pub use multi_head::MultiHeadAttention;
