//! Source-side encoder stack.

use attention::MultiHeadAttention;
use candle_core::{Result, Tensor};
use embedding::{SinusoidalEncoding, TokenEmbedding, TokenEmbeddingConfig};
use layers::{DropoutMode, FeedForward, FeedForwardConfig, LayerNorm, NormPlacement};

use crate::config::TransformerConfig;

/// One encoder layer: self-attention plus feed-forward, with residual
/// connections in the configured norm placement.
struct EncoderLayer {
    self_attn: MultiHeadAttention,
    ffn: FeedForward,
    norm_attn: LayerNorm,
    norm_ffn: LayerNorm,
    placement: NormPlacement,
    dropout: Option<f32>,
}

impl EncoderLayer {
    fn new(config: &TransformerConfig) -> Result<Self> {
        let mut ff_config = FeedForwardConfig::new(config.d_model, config.d_ff);
        ff_config.dropout = config.dropout_option();
        Ok(Self {
            self_attn: MultiHeadAttention::new(
                config.d_model,
                config.n_heads,
                config.dropout_option(),
                &config.device,
            )?,
            ffn: FeedForward::new(ff_config, &config.device)?,
            norm_attn: LayerNorm::new(config.d_model, &config.device)?,
            norm_ffn: LayerNorm::new(config.d_model, &config.device)?,
            placement: config.norm_placement,
            dropout: config.dropout_option(),
        })
    }

    fn forward(&self, hidden: &Tensor, src_mask: &Tensor, mode: DropoutMode) -> Result<Tensor> {
        let hidden = match self.placement {
            NormPlacement::After => {
                let (attended, _) =
                    self.self_attn
                        .forward(hidden, hidden, hidden, Some(src_mask), mode)?;
                let hidden = self
                    .norm_attn
                    .forward(&(hidden + mode.apply(&attended, self.dropout)?)?)?;
                let inner = self.ffn.forward(&hidden, mode)?;
                self.norm_ffn
                    .forward(&(hidden + mode.apply(&inner, self.dropout)?)?)?
            }
            NormPlacement::Before => {
                let normed = self.norm_attn.forward(hidden)?;
                let (attended, _) =
                    self.self_attn
                        .forward(&normed, &normed, &normed, Some(src_mask), mode)?;
                let hidden = (hidden + mode.apply(&attended, self.dropout)?)?;
                let inner = self
                    .ffn
                    .forward(&self.norm_ffn.forward(&hidden)?, mode)?;
                (&hidden + mode.apply(&inner, self.dropout)?)?
            }
        };
        Ok(hidden)
    }
}

/// Maps a padded source sequence plus validity mask to contextual
/// representations `[batch, src_len, d_model]`.
pub struct Encoder {
    embedding: TokenEmbedding,
    positional: SinusoidalEncoding,
    layers: Vec<EncoderLayer>,
    final_norm: Option<LayerNorm>,
}

impl Encoder {
    pub fn new(config: &TransformerConfig) -> Result<Self> {
        let embedding = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: config.src_vocab,
            d_model: config.d_model,
            device: config.device.clone(),
        })?;
        let positional = SinusoidalEncoding::new(
            config.max_len + 1,
            config.d_model,
            config.dropout_option(),
            &config.device,
        )?;

        let mut layers = Vec::with_capacity(config.n_layers);
        for _ in 0..config.n_layers {
            layers.push(EncoderLayer::new(config)?);
        }

        // Pre-norm stacks leave the residual stream unnormalised; close with
        // a final norm so downstream consumers see a stable scale.
        let final_norm = match config.norm_placement {
            NormPlacement::Before => Some(LayerNorm::new(config.d_model, &config.device)?),
            NormPlacement::After => None,
        };

        Ok(Self {
            embedding,
            positional,
            layers,
            final_norm,
        })
    }

    /// Encodes `src` (`[batch, src_len]`) under the source validity mask
    /// (`[batch, 1, src_len]`).
    pub fn forward(&self, src: &Tensor, src_mask: &Tensor, mode: DropoutMode) -> Result<Tensor> {
        let embedded = self.embedding.forward(src)?;
        let mut hidden = self.positional.forward(&embedded, mode)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, src_mask, mode)?;
        }
        match &self.final_norm {
            Some(norm) => norm.forward(&hidden),
            None => Ok(hidden),
        }
    }
}
