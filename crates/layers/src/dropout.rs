//! Dropout policy shared by every stochastic sublayer.

use candle_core::{Result, Tensor};
use candle_nn::ops;

/// Whether dropout is active for a forward pass.
///
/// `Enabled` is the training behaviour; `Disabled` turns every dropout site
/// into the identity so evaluation and generation stay deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropoutMode {
    /// Dropout is active and uses each component's configured probability.
    Enabled,
    /// Dropout is disabled (e.g. during evaluation).
    Disabled,
}

impl DropoutMode {
    /// Applies dropout with probability `p` when the mode is `Enabled`;
    /// otherwise returns the input unchanged. `None` or `0.0` is a no-op in
    /// either mode.
    pub fn apply(self, tensor: &Tensor, p: Option<f32>) -> Result<Tensor> {
        match (self, p) {
            (Self::Enabled, Some(p)) if p > 0.0 => ops::dropout(tensor, p),
            _ => Ok(tensor.clone()),
        }
    }
}
