//! Mask utilities shared by attention call sites.
//!
//! All masks produced here are boolean tensors with dtype
//! [`MASK_DTYPE`](self::MASK_DTYPE): entries are `1` where attention is
//! permitted and `0` where it is blocked. Masks combine with elementwise
//! multiplication (logical AND) under candle broadcasting rules.

pub mod causal;
pub mod padding;

use candle_core::DType;

/// Dtype shared by all boolean masks.
pub const MASK_DTYPE: DType = DType::U8;

pub use causal::CausalMask;
pub use padding::{combine_target_mask, padding_mask};
