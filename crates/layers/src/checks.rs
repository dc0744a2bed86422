//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape assertions that can be wired into
//! constructors or forward paths. They return `candle_core::Result<()>` so
//! call sites can propagate errors without panicking.

use candle_core::{Error, Result, Tensor};

/// Ensures a tensor has the expected number of dimensions.
pub fn expect_rank(name: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let actual = tensor.dims().len();
    if actual == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name} expected rank {rank}, got rank {actual} with shape {:?}",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{name} expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(name: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [_, _, actual] if *actual == hidden => Ok(()),
        dims => Err(Error::Msg(format!(
            "{name} expected (batch, seq, {hidden}) layout, got {dims:?}"
        ))),
    }
}
