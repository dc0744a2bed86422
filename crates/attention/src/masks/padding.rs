//! Padding masks derived from token sequences.

use candle_core::{DType, Error, Result, Tensor};

/// Builds a `[batch, 1, seq]` validity mask, `1` where `token != pad_id`.
///
/// Pure function of its inputs; accepts any integer token dtype.
pub fn padding_mask(tokens: &Tensor, pad_id: i64) -> Result<Tensor> {
    match tokens.dims() {
        [_, _] => {}
        dims => {
            return Err(Error::Msg(format!(
                "padding mask expects tokens shaped [batch, seq], got {dims:?}"
            )))
        }
    }
    if !tokens.dtype().is_int() {
        return Err(Error::Msg(format!(
            "padding mask expects integer tokens, got {:?}",
            tokens.dtype()
        )));
    }
    tokens.to_dtype(DType::I64)?.ne(pad_id)?.unsqueeze(1)
}

/// Combines a target padding mask with a sliced causal mask.
///
/// `padding` is `[batch, 1, len]` and `causal` `[1, len, len]`; the
/// elementwise AND broadcasts both into `[batch, len, len]`.
pub fn combine_target_mask(padding: &Tensor, causal: &Tensor) -> Result<Tensor> {
    match (padding.dims(), causal.dims()) {
        ([_, 1, t], [1, rows, cols]) if t == rows && t == cols => {}
        (pad_dims, causal_dims) => {
            return Err(Error::Msg(format!(
                "cannot combine padding mask {pad_dims:?} with causal mask {causal_dims:?}"
            )))
        }
    }
    padding.broadcast_mul(causal)
}
