//! Low-level layout arithmetic
//!
//! Offsets and sizes come straight from file headers and metadata, so every
//! sum and product here is checked and overflow is a format error.

use crate::cphd::types::error::{CphdError, Result};

fn overflow(what: &str) -> CphdError {
    CphdError::Format(format!("{} overflows a 64-bit file offset", what))
}

/// Rounds `value` up to the next multiple of `alignment`.
pub fn align_up(value: u64, alignment: u64) -> Result<u64> {
    value
        .div_ceil(alignment)
        .checked_mul(alignment)
        .ok_or_else(|| overflow("aligned offset"))
}

/// Byte length of `count` items of `item_size` bytes, as a file offset.
pub fn byte_span(count: usize, item_size: usize) -> Result<u64> {
    (count as u64)
        .checked_mul(item_size as u64)
        .ok_or_else(|| overflow("byte span"))
}

/// `offset + size`, where the sum describes `what`.
pub fn checked_end(what: &str, offset: u64, size: u64) -> Result<u64> {
    offset.checked_add(size).ok_or_else(|| overflow(what))
}
