//! Token and positional embeddings for the translation model.

pub mod positional;
pub mod token;

pub use positional::SinusoidalEncoding;
pub use token::{TokenEmbedding, TokenEmbeddingConfig};
