//! Layer normalisation and sublayer placement policy.
//!
//! Normalisation happens along the last axis of `(batch, seq, hidden)`
//! inputs while preserving the original layout. Statistics are promoted to
//! `f32` before the output is cast back, mirroring the attention crate's
//! reduction behaviour.

use std::str::FromStr;

use candle_core::{DType, Device, Error, Result, Tensor, D};
use thiserror::Error as ThisError;

use crate::checks;

/// Where normalisation runs relative to a residual sublayer.
///
/// `Before` is the pre-norm layout (normalise the sublayer input, add the
/// raw residual); `After` is the original post-norm layout (normalise the
/// sum of residual and sublayer output).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormPlacement {
    Before,
    After,
}

/// Raised when a placement string is neither `before` nor `after`.
#[derive(Debug, ThisError)]
#[error("unrecognised norm placement `{0}`, expected `before` or `after`")]
pub struct ParseNormPlacementError(String);

impl FromStr for NormPlacement {
    type Err = ParseNormPlacementError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(ParseNormPlacementError(other.to_string())),
        }
    }
}

impl std::fmt::Display for NormPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// Standard LayerNorm with learnable scale and bias.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    hidden_size: usize,
    epsilon: f64,
    weight: Tensor,
    bias: Tensor,
}

impl LayerNorm {
    /// Constructs a LayerNorm with scale = 1 and bias = 0.
    pub fn new(hidden_size: usize, device: &Device) -> Result<Self> {
        if hidden_size == 0 {
            return Err(Error::Msg("layer norm requires hidden_size > 0".into()));
        }
        Ok(Self {
            hidden_size,
            epsilon: 1e-5,
            weight: Tensor::ones(hidden_size, DType::F32, device)?,
            bias: Tensor::zeros(hidden_size, DType::F32, device)?,
        })
    }

    /// Applies the normalisation to a hidden state tensor.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.hidden_size)?;

        let hidden_size = self.hidden_size as f64;
        let compute = hidden.to_dtype(DType::F32)?;
        let mean = (compute.sum_keepdim(D::Minus1)? / hidden_size)?;
        let centred = compute.broadcast_sub(&mean)?;
        let variance = (centred.sqr()?.sum_keepdim(D::Minus1)? / hidden_size)?;
        let denom = (variance + self.epsilon)?.sqrt()?;
        let normalised = centred.broadcast_div(&denom)?;

        normalised
            .broadcast_mul(&self.weight)?
            .broadcast_add(&self.bias)
    }
}
