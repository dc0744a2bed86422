//! Fixed sinusoidal positional encoding.
//!
//! The table is computed once at construction and sliced per forward call,
//! so repeated passes never re-derive the trigonometric terms. Position
//! `pos`, channel `2i` holds `sin(pos / 10000^(2i/d_model))` and channel
//! `2i + 1` the matching cosine.

use candle_core::{bail, Device, Error, Result, Tensor};
use layers::DropoutMode;

/// Precomputed sin/cos position table added onto token embeddings.
#[derive(Debug, Clone)]
pub struct SinusoidalEncoding {
    table: Tensor,
    max_positions: usize,
    d_model: usize,
    dropout: Option<f32>,
}

impl SinusoidalEncoding {
    /// Builds the encoding table for positions `0..max_positions`.
    pub fn new(
        max_positions: usize,
        d_model: usize,
        dropout: Option<f32>,
        device: &Device,
    ) -> Result<Self> {
        if max_positions == 0 || d_model == 0 {
            bail!("positional encoding requires non-zero max_positions and d_model");
        }
        if let Some(p) = dropout {
            if !(0.0..1.0).contains(&p) {
                bail!("positional encoding dropout must be in [0, 1), got {p}");
            }
        }

        let mut data = vec![0f32; max_positions * d_model];
        for pos in 0..max_positions {
            for i in (0..d_model).step_by(2) {
                let angle = pos as f64 / 10000f64.powf(i as f64 / d_model as f64);
                data[pos * d_model + i] = angle.sin() as f32;
                if i + 1 < d_model {
                    data[pos * d_model + i + 1] = angle.cos() as f32;
                }
            }
        }
        let table = Tensor::from_vec(data, (1, max_positions, d_model), device)?;

        Ok(Self {
            table,
            max_positions,
            d_model,
            dropout,
        })
    }

    /// Number of positions covered by the precomputed table.
    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Adds position information to `embedded` (`[batch, seq, d_model]`);
    /// `mode` gates the dropout on the summed result.
    pub fn forward(&self, embedded: &Tensor, mode: DropoutMode) -> Result<Tensor> {
        let seq = match embedded.dims() {
            [_, seq, d_model] if *d_model == self.d_model => *seq,
            dims => {
                return Err(Error::Msg(format!(
                    "positional encoding expected [batch, seq, {}], got {dims:?}",
                    self.d_model
                )))
            }
        };
        if seq > self.max_positions {
            bail!(
                "sequence length {seq} exceeds the {} precomputed positions",
                self.max_positions
            );
        }

        let positions = self.table.narrow(1, 0, seq)?;
        let output = embedded.broadcast_add(&positions)?;
        mode.apply(&output, self.dropout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, IndexOp};

    #[test]
    fn position_zero_alternates_zero_and_one() -> Result<()> {
        let encoding = SinusoidalEncoding::new(4, 6, None, &Device::Cpu)?;
        let embedded = Tensor::zeros((1, 1, 6), DType::F32, &Device::Cpu)?;
        let row = encoding
            .forward(&embedded, DropoutMode::Disabled)?
            .i((0, 0))?
            .to_vec1::<f32>()?;
        for (i, value) in row.iter().enumerate() {
            let expected = if i % 2 == 0 { 0.0 } else { 1.0 };
            assert!((value - expected).abs() < 1e-6, "channel {i}: {value}");
        }
        Ok(())
    }

    #[test]
    fn position_one_matches_closed_form() -> Result<()> {
        let d_model = 4;
        let encoding = SinusoidalEncoding::new(4, d_model, None, &Device::Cpu)?;
        let embedded = Tensor::zeros((1, 2, d_model), DType::F32, &Device::Cpu)?;
        let row = encoding
            .forward(&embedded, DropoutMode::Disabled)?
            .i((0, 1))?
            .to_vec1::<f32>()?;

        for i in (0..d_model).step_by(2) {
            let angle = 1.0f64 / 10000f64.powf(i as f64 / d_model as f64);
            assert!((row[i] - angle.sin() as f32).abs() < 1e-6);
            assert!((row[i + 1] - angle.cos() as f32).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn overlong_sequences_are_rejected() -> Result<()> {
        let encoding = SinusoidalEncoding::new(3, 4, None, &Device::Cpu)?;
        let embedded = Tensor::zeros((1, 5, 4), DType::F32, &Device::Cpu)?;
        assert!(encoding.forward(&embedded, DropoutMode::Disabled).is_err());
        Ok(())
    }
}
