//! Token embedding table with scaled lookup.

use candle_core::{bail, DType, Device, Error, Result, Tensor};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub d_model: usize,
    /// Device hosting the parameters.
    pub device: Device,
}

/// Learnable token embedding table.
///
/// Lookups are scaled by `sqrt(d_model)` so that embeddings and positional
/// encodings arrive at comparable magnitudes, following the original
/// transformer recipe.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Tensor,
    scale: f64,
}

impl TokenEmbedding {
    /// Builds a new embedding table and samples the parameters from `N(0, 1)`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.d_model == 0 {
            bail!("token embedding requires d_model > 0");
        }
        let weight = Tensor::randn(
            0f32,
            1f32,
            (config.vocab_size, config.d_model),
            &config.device,
        )?;
        let scale = (config.d_model as f64).sqrt();
        Ok(Self {
            config,
            weight,
            scale,
        })
    }

    /// Returns the embedding configuration.
    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    /// Returns a clone of the underlying weight tensor.
    pub fn weight(&self) -> Tensor {
        self.weight.clone()
    }

    /// Looks up scaled embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs
    /// follow the `(batch, seq, d_model)` layout in `f32`.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = match token_ids.dims() {
            [batch, seq] if *batch > 0 && *seq > 0 => (*batch, *seq),
            dims => {
                return Err(Error::Msg(format!(
                    "token_ids must be shaped [batch, seq] with non-zero dims, got {dims:?}"
                )))
            }
        };
        if !token_ids.dtype().is_int() {
            return Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )));
        }

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight.index_select(&flat, 0)?;
        let embedded = gathered.reshape((batch, seq, self.config.d_model))?;
        embedded * self.scale
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            bail!("encountered negative token id {min_id}");
        }
        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            bail!("token id {max_id} exceeds vocab size {vocab}");
        }
        Ok(())
    }
}
