//! Target-side decoder stack with cross-attention readout.

use attention::MultiHeadAttention;
use candle_core::{Error, Result, Tensor, D};
use candle_nn::ops::log_softmax;
use embedding::{SinusoidalEncoding, TokenEmbedding, TokenEmbeddingConfig};
use layers::{
    DropoutMode, FeedForward, FeedForwardConfig, LayerNorm, Linear, LinearConfig, NormPlacement,
};

use crate::config::TransformerConfig;

/// One decoder layer: masked self-attention, cross-attention over the
/// encoder output, and feed-forward.
struct DecoderLayer {
    self_attn: MultiHeadAttention,
    cross_attn: MultiHeadAttention,
    ffn: FeedForward,
    norm_self: LayerNorm,
    norm_cross: LayerNorm,
    norm_ffn: LayerNorm,
    placement: NormPlacement,
    dropout: Option<f32>,
}

impl DecoderLayer {
    fn new(config: &TransformerConfig) -> Result<Self> {
        let attn = |config: &TransformerConfig| {
            MultiHeadAttention::new(
                config.d_model,
                config.n_heads,
                config.dropout_option(),
                &config.device,
            )
        };
        let mut ff_config = FeedForwardConfig::new(config.d_model, config.d_ff);
        ff_config.dropout = config.dropout_option();
        Ok(Self {
            self_attn: attn(config)?,
            cross_attn: attn(config)?,
            ffn: FeedForward::new(ff_config, &config.device)?,
            norm_self: LayerNorm::new(config.d_model, &config.device)?,
            norm_cross: LayerNorm::new(config.d_model, &config.device)?,
            norm_ffn: LayerNorm::new(config.d_model, &config.device)?,
            placement: config.norm_placement,
            dropout: config.dropout_option(),
        })
    }

    /// Returns the transformed hidden state and this layer's cross-attention
    /// weights `[batch, heads, tgt_len, src_len]`.
    fn forward(
        &self,
        hidden: &Tensor,
        enc_out: &Tensor,
        src_mask: &Tensor,
        tgt_mask: &Tensor,
        mode: DropoutMode,
    ) -> Result<(Tensor, Tensor)> {
        match self.placement {
            NormPlacement::After => {
                let (attended, _) =
                    self.self_attn
                        .forward(hidden, hidden, hidden, Some(tgt_mask), mode)?;
                let hidden = self
                    .norm_self
                    .forward(&(hidden + mode.apply(&attended, self.dropout)?)?)?;

                let (crossed, weights) =
                    self.cross_attn
                        .forward(&hidden, enc_out, enc_out, Some(src_mask), mode)?;
                let hidden = self
                    .norm_cross
                    .forward(&(&hidden + mode.apply(&crossed, self.dropout)?)?)?;

                let inner = self.ffn.forward(&hidden, mode)?;
                let hidden = self
                    .norm_ffn
                    .forward(&(hidden + mode.apply(&inner, self.dropout)?)?)?;
                Ok((hidden, weights))
            }
            NormPlacement::Before => {
                let normed = self.norm_self.forward(hidden)?;
                let (attended, _) =
                    self.self_attn
                        .forward(&normed, &normed, &normed, Some(tgt_mask), mode)?;
                let hidden = (hidden + mode.apply(&attended, self.dropout)?)?;

                let normed = self.norm_cross.forward(&hidden)?;
                let (crossed, weights) =
                    self.cross_attn
                        .forward(&normed, enc_out, enc_out, Some(src_mask), mode)?;
                let hidden = (&hidden + mode.apply(&crossed, self.dropout)?)?;

                let inner = self
                    .ffn
                    .forward(&self.norm_ffn.forward(&hidden)?, mode)?;
                let hidden = (&hidden + mode.apply(&inner, self.dropout)?)?;
                Ok((hidden, weights))
            }
        }
    }
}

/// Maps encoder output and a target prefix to per-position log-probability
/// distributions over the target vocabulary.
pub struct Decoder {
    embedding: TokenEmbedding,
    positional: SinusoidalEncoding,
    layers: Vec<DecoderLayer>,
    final_norm: Option<LayerNorm>,
    readout: Linear,
}

impl Decoder {
    pub fn new(config: &TransformerConfig) -> Result<Self> {
        let embedding = TokenEmbedding::new(TokenEmbeddingConfig {
            vocab_size: config.tgt_vocab,
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
            layers.push(DecoderLayer::new(config)?);
        }

        let final_norm = match config.norm_placement {
            NormPlacement::Before => Some(LayerNorm::new(config.d_model, &config.device)?),
            NormPlacement::After => None,
        };

        let readout = Linear::xavier(
            LinearConfig::new(config.d_model, config.tgt_vocab),
            &config.device,
        )?;

        Ok(Self {
            embedding,
            positional,
            layers,
            final_norm,
            readout,
        })
    }

    /// Decodes `tgt` (`[batch, tgt_len]`) against `enc_out`.
    ///
    /// `src_mask` is `[batch, 1, src_len]` and gates cross-attention only;
    /// `tgt_mask` (`[batch | 1, tgt_len, tgt_len]`) gates self-attention.
    /// `mode` gates every dropout site in the stack.
    /// Returns log-probabilities `[batch, tgt_len, tgt_vocab]` and the final
    /// layer's cross-attention weights `[batch, heads, tgt_len, src_len]`.
    pub fn forward(
        &self,
        enc_out: &Tensor,
        tgt: &Tensor,
        src_mask: &Tensor,
        tgt_mask: &Tensor,
        mode: DropoutMode,
    ) -> Result<(Tensor, Tensor)> {
        let embedded = self.embedding.forward(tgt)?;
        let mut hidden = self.positional.forward(&embedded, mode)?;

        let mut cross_weights = None;
        for layer in &self.layers {
            let (next, weights) = layer.forward(&hidden, enc_out, src_mask, tgt_mask, mode)?;
            hidden = next;
            cross_weights = Some(weights);
        }
        let weights = cross_weights
            .ok_or_else(|| Error::Msg("decoder requires at least one layer".into()))?;

        if let Some(norm) = &self.final_norm {
            hidden = norm.forward(&hidden)?;
        }

        let logits = self.readout.forward(&hidden)?;
        let log_probs = log_softmax(&logits, D::Minus1)?;
        Ok((log_probs, weights))
    }
}
