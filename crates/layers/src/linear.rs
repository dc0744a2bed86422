//! Dense affine projection.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` (or `(rows,
//! in_dim)`) and return tensors with the last dimension replaced by
//! `out_dim`. Weights are sampled with Xavier/Glorot uniform initialisation,
//! the standard recipe for transformer projections.

use candle_core::{DType, Device, Error, Result, Tensor};

use crate::checks;

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }
}

/// Dense affine projection with optional bias.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        checks::expect_shape(
            "linear.weight",
            &weight,
            &[config.output_dim, config.input_dim],
        )?;
        match (config.bias, &bias) {
            (true, Some(tensor)) => {
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])?
            }
            (true, None) => return Err(Error::Msg("config expects bias but none supplied".into())),
            (false, Some(_)) => {
                return Err(Error::Msg("bias provided but config disables bias".into()))
            }
            (false, None) => {}
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Builds a linear layer with Xavier-uniform weights and a zero bias.
    pub fn xavier(config: LinearConfig, device: &Device) -> Result<Self> {
        let (fan_out, fan_in) = (config.output_dim as f64, config.input_dim as f64);
        let bound = (6.0 / (fan_in + fan_out)).sqrt() as f32;
        let weight = Tensor::rand(
            -bound,
            bound,
            (config.output_dim, config.input_dim),
            device,
        )?;
        let bias = if config.bias {
            Some(Tensor::zeros(config.output_dim, DType::F32, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Returns the static configuration used to validate inputs.
    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Returns a clone of the underlying weight tensor.
    pub fn weight(&self) -> Tensor {
        self.weight.clone()
    }

    /// Applies the projection to the last dimension of `hidden`.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let weight_t = self.weight.t()?;
        let output = match hidden.dims() {
            [batch, seq, in_dim] if *in_dim == self.config.input_dim => {
                let flat = hidden.reshape((*batch * *seq, self.config.input_dim))?;
                flat.matmul(&weight_t)?
                    .reshape((*batch, *seq, self.config.output_dim))?
            }
            [rows, in_dim] if *in_dim == self.config.input_dim => {
                hidden.contiguous()?.matmul(&weight_t)?
            }
            dims => {
                return Err(Error::Msg(format!(
                    "linear expects input shaped [B, T, {0}] or [N, {0}], got {dims:?}",
                    self.config.input_dim
                )))
            }
        };

        match &self.bias {
            Some(bias) => output.broadcast_add(bias),
            None => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_matches_reference_matmul() -> Result<()> {
        let device = Device::Cpu;
        let config = LinearConfig::new(4, 3);
        let weight = Tensor::from_vec(
            (0..12).map(|i| i as f32 * 0.1).collect::<Vec<_>>(),
            (3, 4),
            &device,
        )?;
        let bias = Tensor::from_vec(vec![0.5f32, -0.5, 0.0], (3,), &device)?;
        let linear = Linear::new(config, weight.clone(), Some(bias.clone()))?;

        let input = Tensor::from_vec(
            (0..8).map(|i| i as f32).collect::<Vec<_>>(),
            (1, 2, 4),
            &device,
        )?;
        let output = linear.forward(&input)?;
        assert_eq!(output.dims(), &[1, 2, 3]);

        let reference = input
            .reshape((2, 4))?
            .matmul(&weight.t()?)?
            .broadcast_add(&bias)?
            .reshape((1, 2, 3))?;
        let diff = output
            .sub(&reference)?
            .abs()?
            .max_all()?
            .to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_input_dim() {
        let device = Device::Cpu;
        let linear = Linear::xavier(LinearConfig::new(8, 8), &device).unwrap();
        let input = Tensor::zeros((1, 2, 4), DType::F32, &device).unwrap();
        assert!(linear.forward(&input).is_err());
    }

    #[test]
    fn xavier_weights_stay_within_bound() -> Result<()> {
        let device = Device::Cpu;
        let linear = Linear::xavier(LinearConfig::new(64, 32), &device)?;
        let bound = (6.0f64 / (64.0 + 32.0)).sqrt() as f32;
        let max = linear.weight().abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(max <= bound);
        Ok(())
    }
}
