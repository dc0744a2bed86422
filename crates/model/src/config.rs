//! High-level configuration for assembling the translation model.

use candle_core::{Device, Error, Result};
use layers::NormPlacement;

/// Immutable hyperparameters fixed when a `Transformer` is constructed.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Source vocabulary size.
    pub src_vocab: usize,
    /// Target vocabulary size.
    pub tgt_vocab: usize,
    /// Maximum decode length; the causal mask covers `max_len + 1` positions.
    pub max_len: usize,
    /// Model hidden dimension and embedding width.
    pub d_model: usize,
    /// Feed-forward inner dimension.
    pub d_ff: usize,
    /// Number of encoder and decoder layers.
    pub n_layers: usize,
    /// Number of attention heads; must divide `d_model`.
    pub n_heads: usize,
    /// Dropout probability applied to embeddings, attention, and residuals.
    pub dropout: f32,
    /// Layer normalisation placement relative to each sublayer.
    pub norm_placement: NormPlacement,
    /// Weight sharing between the readout layer and the target embedding.
    /// Currently unimplemented; construction refuses it outright.
    pub tie_readout_embedding: bool,
    /// Weight sharing between source and target embeddings.
    /// Currently unimplemented; construction refuses it outright.
    pub tie_source_target_embedding: bool,
    /// Reserved padding token id.
    pub pad_id: i64,
    /// Start-of-sequence token id seeding autoregressive decoding.
    pub sos_id: i64,
    /// Device hosting every parameter and intermediate tensor.
    pub device: Device,
}

impl TransformerConfig {
    /// Creates a configuration with the standard base-model defaults.
    pub fn new(src_vocab: usize, tgt_vocab: usize, max_len: usize, device: Device) -> Self {
        Self {
            src_vocab,
            tgt_vocab,
            max_len,
            d_model: 512,
            d_ff: 2048,
            n_layers: 6,
            n_heads: 8,
            dropout: 0.1,
            norm_placement: NormPlacement::After,
            tie_readout_embedding: false,
            tie_source_target_embedding: false,
            pad_id: 0,
            sos_id: 1,
            device,
        }
    }

    /// Validates structural invariants before any parameter is allocated.
    pub fn validate(&self) -> Result<()> {
        // Tying is refused first so a rejected configuration can never leave
        // partially aliased parameters behind.
        if self.tie_readout_embedding {
            return Err(Error::Msg(
                "weight sharing between readout and target embedding is not implemented".into(),
            ));
        }
        if self.tie_source_target_embedding {
            return Err(Error::Msg(
                "weight sharing between source and target embeddings is not implemented".into(),
            ));
        }
        if self.src_vocab == 0 || self.tgt_vocab == 0 {
            return Err(Error::Msg("vocabulary sizes must be greater than zero".into()));
        }
        if self.max_len == 0 {
            return Err(Error::Msg("max_len must be greater than zero".into()));
        }
        if self.d_model == 0 || self.d_ff == 0 {
            return Err(Error::Msg("d_model and d_ff must be greater than zero".into()));
        }
        if self.n_layers == 0 {
            return Err(Error::Msg("n_layers must be greater than zero".into()));
        }
        if self.n_heads == 0 || self.d_model % self.n_heads != 0 {
            return Err(Error::Msg(format!(
                "d_model ({}) must be divisible by n_heads ({})",
                self.d_model, self.n_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::Msg(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.pad_id < 0 || self.sos_id < 0 {
            return Err(Error::Msg("pad_id and sos_id must be non-negative".into()));
        }
        Ok(())
    }

    /// Dropout as an option, `None` when disabled.
    pub(crate) fn dropout_option(&self) -> Option<f32> {
        (self.dropout > 0.0).then_some(self.dropout)
    }
}
