//! Multi-head scaled dot-product attention.
//!
//! One layer serves both self-attention (query, key, and value drawn from
//! the same sequence) and cross-attention (queries from the decoder, keys
//! and values from the encoder output). Inputs use the `(batch, seq,
//! d_model)` layout; per-head attention weights are returned alongside the
//! projected context so callers can surface them.

use std::sync::OnceLock;

use candle_core::{bail, Error, Result, Tensor, D};
use candle_nn::ops::softmax_last_dim;
use layers::{DropoutMode, Linear, LinearConfig};

use crate::masks::MASK_DTYPE;

/// Multi-head attention with learned q/k/v/output projections.
#[derive(Debug)]
pub struct MultiHeadAttention {
    d_model: usize,
    n_heads: usize,
    head_dim: usize,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    dropout: Option<f32>,
    first_call: OnceLock<()>,
}

impl MultiHeadAttention {
    /// Builds the four projections on `device`.
    pub fn new(
        d_model: usize,
        n_heads: usize,
        dropout: Option<f32>,
        device: &candle_core::Device,
    ) -> Result<Self> {
        if n_heads == 0 {
            bail!("attention requires n_heads > 0");
        }
        if d_model % n_heads != 0 {
            bail!("d_model {d_model} must be divisible by n_heads {n_heads}");
        }
        if let Some(p) = dropout {
            if !(0.0..1.0).contains(&p) {
                bail!("attention dropout must be in [0, 1), got {p}");
            }
        }

        let proj = |device| Linear::xavier(LinearConfig::new(d_model, d_model), device);
        Ok(Self {
            d_model,
            n_heads,
            head_dim: d_model / n_heads,
            q_proj: proj(device)?,
            k_proj: proj(device)?,
            v_proj: proj(device)?,
            out_proj: proj(device)?,
            dropout,
            first_call: OnceLock::new(),
        })
    }

    /// Number of attention heads.
    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    /// Attends `query` over `key`/`value`.
    ///
    /// `mask`, when supplied, is a boolean tensor shaped
    /// `[batch | 1, q_len | 1, k_len]` with [`MASK_DTYPE`]; blocked entries
    /// receive `-inf` scores before the softmax. `mode` gates the dropout
    /// on the mixing weights. Returns the projected context
    /// `[batch, q_len, d_model]` and the pre-dropout attention weights
    /// `[batch, n_heads, q_len, k_len]`.
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        mode: DropoutMode,
    ) -> Result<(Tensor, Tensor)> {
        if self.first_call.set(()).is_ok() {
            log::debug!(
                "attention init d_model={} n_heads={} dropout={:?}",
                self.d_model,
                self.n_heads,
                self.dropout
            );
        }

        let (batch, q_len) = self.expect_batch_seq_model("attention.query", query)?;
        let (k_batch, k_len) = self.expect_batch_seq_model("attention.key", key)?;
        let (v_batch, v_len) = self.expect_batch_seq_model("attention.value", value)?;
        if k_batch != batch || v_batch != batch {
            bail!("attention inputs disagree on batch size: {batch}, {k_batch}, {v_batch}");
        }
        if v_len != k_len {
            bail!("key length {k_len} and value length {v_len} must match");
        }

        let q = self.split_heads(&self.q_proj.forward(query)?)?;
        let k = self.split_heads(&self.k_proj.forward(key)?)?;
        let v = self.split_heads(&self.v_proj.forward(value)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let k_t = k.transpose(D::Minus2, D::Minus1)?.contiguous()?;
        let mut scores = (q.matmul(&k_t)? * scale)?;

        if let Some(mask) = mask {
            scores = apply_mask(&scores, mask)?;
        }

        let weights = softmax_last_dim(&scores)?;
        let mixing = mode.apply(&weights, self.dropout)?;

        let context = mixing.matmul(&v)?;
        let merged = context
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, q_len, self.d_model))?;
        let output = self.out_proj.forward(&merged)?;
        Ok((output, weights))
    }

    fn expect_batch_seq_model(&self, name: &str, tensor: &Tensor) -> Result<(usize, usize)> {
        match tensor.dims() {
            [batch, seq, d_model] if *d_model == self.d_model => Ok((*batch, *seq)),
            dims => Err(Error::Msg(format!(
                "{name} expected [batch, seq, {}], got {dims:?}",
                self.d_model
            ))),
        }
    }

    fn split_heads(&self, tensor: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = tensor.dims3()?;
        tensor
            .reshape((batch, seq, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }
}

/// Broadcasts a boolean mask over the score tensor, blocking zeros with `-inf`.
fn apply_mask(scores: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let (batch, _, q_len, k_len) = scores.dims4()?;
    if mask.dtype() != MASK_DTYPE {
        bail!(
            "mask expects dtype {MASK_DTYPE:?}, got {:?}",
            mask.dtype()
        );
    }
    match mask.dims() {
        [mb, mq, mk]
            if (*mb == batch || *mb == 1)
                && (*mq == q_len || *mq == 1)
                && *mk == k_len => {}
        dims => bail!(
            "mask shape {dims:?} incompatible with scores [{batch}, _, {q_len}, {k_len}]"
        ),
    }

    let broadcast = mask.unsqueeze(1)?.broadcast_as(scores.dims())?;
    let blocked = Tensor::full(f32::NEG_INFINITY, scores.dims(), scores.device())?;
    broadcast.where_cond(scores, &blocked)
}
