//! Composition root: mask construction and dual-mode decoding control.

use attention::{combine_target_mask, padding_mask, CausalMask};
use candle_core::{bail, DType, Error, Result, Tensor, D};
use layers::DropoutMode;
use rand::Rng;

use crate::{config::TransformerConfig, decoder::Decoder, encoder::Encoder};

/// Encoder-decoder transformer with teacher-forced and greedy
/// autoregressive decoding.
///
/// The causal mask is built once at construction and shared, read-only,
/// across every forward call; decoder state in autoregressive mode is local
/// to the call.
pub struct Transformer {
    config: TransformerConfig,
    encoder: Encoder,
    decoder: Decoder,
    causal: CausalMask,
}

impl Transformer {
    /// Validates `config` and builds the encoder, decoder, and causal mask.
    pub fn new(config: TransformerConfig) -> Result<Self> {
        config.validate()?;

        let encoder = Encoder::new(&config)?;
        let decoder = Decoder::new(&config)?;
        let causal = CausalMask::new(&config.device, config.max_len)?;

        log::info!(
            "transformer init src_vocab={} tgt_vocab={} max_len={} d_model={} d_ff={} n_layers={} n_heads={} dropout={} norm={}",
            config.src_vocab,
            config.tgt_vocab,
            config.max_len,
            config.d_model,
            config.d_ff,
            config.n_layers,
            config.n_heads,
            config.dropout,
            config.norm_placement,
        );

        Ok(Self {
            config,
            encoder,
            decoder,
            causal,
        })
    }

    /// Returns the model configuration.
    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Runs one full pass: encode `src`, then decode in one of two modes.
    ///
    /// Every call draws exactly one uniform sample from `rng`; a sample
    /// below `teacher_forcing_ratio` selects teacher-forced decoding (single
    /// decoder call over `tgt` minus its final token), otherwise decoding is
    /// autoregressive and greedy. With a ratio of `0` the sample can never
    /// select teacher forcing, with `1` it always does. `mode` gates every
    /// dropout site, so evaluation passes use [`DropoutMode::Disabled`].
    ///
    /// Returns per-position log-probability distributions and cross-attention
    /// weights. Teacher-forced: `[B, T-1, V]` and `[B, heads, T-1, S]`.
    /// Autoregressive: only the final step's outputs, `[B, steps, V]` and
    /// head-averaged `[B, steps, S]`, where `steps` is `tgt` length minus one
    /// when a target bounds the loop and `max_len` otherwise.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        src: &Tensor,
        tgt: Option<&Tensor>,
        teacher_forcing_ratio: f64,
        mode: DropoutMode,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor)> {
        if !(0.0..=1.0).contains(&teacher_forcing_ratio) {
            bail!("teacher_forcing_ratio must be in [0, 1], got {teacher_forcing_ratio}");
        }

        let src_mask = padding_mask(src, self.config.pad_id)?;
        let enc_out = self.encoder.forward(src, &src_mask, mode)?;

        // One draw per call, regardless of the ratio, so callers sharing an
        // RNG across calls see a stable stream.
        let teacher_forced = rng.gen::<f64>() < teacher_forcing_ratio;

        if teacher_forced {
            let tgt = tgt.ok_or_else(|| {
                Error::Msg("teacher forcing selected but no target sequence supplied".into())
            })?;
            self.teacher_forced(&enc_out, tgt, &src_mask, mode)
        } else {
            let steps = match tgt {
                Some(tgt) => {
                    let len = tgt.dim(1)?;
                    if len < 2 {
                        bail!("bounding target must have length >= 2, got {len}");
                    }
                    len - 1
                }
                None => self.config.max_len,
            };
            self.autoregressive(&enc_out, &src_mask, src.dim(0)?, steps, mode)
        }
    }

    /// Greedy generation without a target: equivalent to [`Self::forward`]
    /// with no target and a teacher-forcing ratio of `0`, decoding for
    /// exactly `max_len` steps. Dropout is always disabled, so repeated
    /// calls on the same input are deterministic.
    pub fn generate(&self, src: &Tensor) -> Result<(Tensor, Tensor)> {
        let src_mask = padding_mask(src, self.config.pad_id)?;
        let enc_out = self.encoder.forward(src, &src_mask, DropoutMode::Disabled)?;
        self.autoregressive(
            &enc_out,
            &src_mask,
            src.dim(0)?,
            self.config.max_len,
            DropoutMode::Disabled,
        )
    }

    /// Single decoder invocation over the target prefix.
    fn teacher_forced(
        &self,
        enc_out: &Tensor,
        tgt: &Tensor,
        src_mask: &Tensor,
        mode: DropoutMode,
    ) -> Result<(Tensor, Tensor)> {
        let len = tgt.dim(1)?;
        if len < 2 {
            bail!("teacher forcing requires target length >= 2, got {len}");
        }

        // Drop the final token so inputs align with predicted outputs.
        let dec_in = tgt.narrow(1, 0, len - 1)?;
        let pad_mask = padding_mask(&dec_in, self.config.pad_id)?;
        let causal = self.causal.slice(len - 1)?;
        let tgt_mask = combine_target_mask(&pad_mask, &causal)?;

        log::debug!("teacher-forced decode length={}", len - 1);
        self.decoder
            .forward(enc_out, &dec_in, src_mask, &tgt_mask, mode)
    }

    /// Iterative greedy decoding over a growing prefix; no key/value cache,
    /// every step recomputes attention over the whole prefix.
    fn autoregressive(
        &self,
        enc_out: &Tensor,
        src_mask: &Tensor,
        batch: usize,
        steps: usize,
        mode: DropoutMode,
    ) -> Result<(Tensor, Tensor)> {
        if steps == 0 {
            bail!("autoregressive decoding requires at least one step");
        }
        log::debug!("autoregressive decode steps={steps}");

        let mut dec_in = Tensor::full(self.config.sos_id, (batch, 1), &self.config.device)?;
        let mut last = None;

        for step in 0..steps {
            let current_len = step + 1;
            // The padding mask is not recombined here; the source mask still
            // gates cross-attention inside the decoder.
            let tgt_mask = self.causal.slice(current_len)?;
            let (dist, weights) = self
                .decoder
                .forward(enc_out, &dec_in, src_mask, &tgt_mask, mode)?;

            let next = greedy_next(&dist)?;
            dec_in = Tensor::cat(&[&dec_in, &next], 1)?;
            last = Some((dist, weights));
        }

        // Only the final step's outputs are surfaced; earlier distributions
        // are discarded, and the weights are averaged over heads.
        let (dist, weights) = last
            .ok_or_else(|| Error::Msg("autoregressive loop executed no steps".into()))?;
        Ok((dist, weights.mean(1)?))
    }
}

/// Picks the highest-scoring token at the final position of `dist`
/// (`[batch, len, vocab]`), returning `[batch, 1]` ids in `i64`. Ties
/// resolve to the lowest index.
fn greedy_next(dist: &Tensor) -> Result<Tensor> {
    let len = dist.dim(1)?;
    dist.narrow(1, len - 1, 1)?
        .argmax(D::Minus1)?
        .to_dtype(DType::I64)
}
