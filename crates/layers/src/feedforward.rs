//! Position-wise feed-forward network.
//!
//! The classic two-projection expansion: `d_model -> d_ff -> d_model` with a
//! ReLU in between and optional dropout on the activated hidden state.

use candle_core::{Device, Error, Result, Tensor};

use crate::dropout::DropoutMode;
use crate::linear::{Linear, LinearConfig};

/// Configuration for a position-wise feed-forward block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardConfig {
    /// Model hidden dimension (input and output width).
    pub d_model: usize,
    /// Inner expansion dimension.
    pub d_ff: usize,
    /// Dropout probability applied after the activation; `None` disables it.
    pub dropout: Option<f32>,
}

impl FeedForwardConfig {
    pub fn new(d_model: usize, d_ff: usize) -> Self {
        Self {
            d_model,
            d_ff,
            dropout: None,
        }
    }
}

/// Two-layer MLP applied independently at every position.
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    expand: Linear,
    contract: Linear,
}

impl FeedForward {
    pub fn new(config: FeedForwardConfig, device: &Device) -> Result<Self> {
        if config.d_model == 0 || config.d_ff == 0 {
            return Err(Error::Msg(
                "feed-forward requires non-zero d_model and d_ff".into(),
            ));
        }
        if let Some(p) = config.dropout {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::Msg(format!(
                    "feed-forward dropout must be in [0, 1), got {p}"
                )));
            }
        }
        let expand = Linear::xavier(LinearConfig::new(config.d_model, config.d_ff), device)?;
        let contract = Linear::xavier(LinearConfig::new(config.d_ff, config.d_model), device)?;
        Ok(Self {
            config,
            expand,
            contract,
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    /// Applies the expansion, activation, and contraction. `mode` gates the
    /// dropout between the two projections.
    pub fn forward(&self, hidden: &Tensor, mode: DropoutMode) -> Result<Tensor> {
        let inner = self.expand.forward(hidden)?.relu()?;
        let inner = mode.apply(&inner, self.config.dropout)?;
        self.contract.forward(&inner)
    }
}
