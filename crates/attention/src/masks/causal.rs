//! Precomputed lower-triangular causal mask.

use candle_core::{bail, Device, Result, Tensor};

use super::MASK_DTYPE;

/// Square lower-triangular mask built once and sliced per decode step.
///
/// The table covers `max_len + 1` positions so that a decoder driven for
/// `max_len` steps (plus the start-of-sequence token) never outgrows it.
/// The tensor is immutable after construction; [`CausalMask::slice`] only
/// produces narrowed views.
#[derive(Debug, Clone)]
pub struct CausalMask {
    mask: Tensor,
    extent: usize,
}

impl CausalMask {
    /// Builds the `[1, max_len + 1, max_len + 1]` table where entry
    /// `(i, j)` is `1` iff `j <= i`.
    pub fn new(device: &Device, max_len: usize) -> Result<Self> {
        let extent = max_len + 1;
        let mut data = vec![0u8; extent * extent];
        for i in 0..extent {
            for j in 0..=i {
                data[i * extent + j] = 1;
            }
        }
        let mask = Tensor::from_vec(data, (1, extent, extent), device)?;
        debug_assert_eq!(mask.dtype(), MASK_DTYPE);
        Ok(Self { mask, extent })
    }

    /// Number of positions covered by the precomputed table.
    pub fn extent(&self) -> usize {
        self.extent
    }

    /// Returns the `[1, len, len]` prefix of the table.
    pub fn slice(&self, len: usize) -> Result<Tensor> {
        if len == 0 {
            bail!("causal mask slice requires len > 0");
        }
        if len > self.extent {
            bail!(
                "causal mask slice of {len} exceeds precomputed extent {}",
                self.extent
            );
        }
        self.mask.narrow(1, 0, len)?.narrow(2, 0, len)
    }
}
