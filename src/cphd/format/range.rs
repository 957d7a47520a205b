//! Normalization of index and slice specifications.
//!
//! Every row/column/vector selection in the public API is a [`RangeSpec`]:
//! nothing (everything), a single index, or a `(start, stop, stride)` slice
//! with optional parts. [`RangeSpec::resolve`] turns it into an absolute
//! [`Resolved`] range over a known axis length.
//!
//! `start == -1` with a negative stride is kept as its own case, meaning
//! "from the last element backward to the first". A plain stop-bounded slice
//! cannot express that walk because it always excludes the stop index.

use crate::cphd::types::error::{CphdError, Result};

/// A user-supplied selection along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeSpec {
    /// The whole axis, `(0, length, 1)`.
    #[default]
    All,
    /// A single position. The axis is dropped from signal read results.
    Index(i64),
    /// A slice; omitted parts take their defaults.
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        stride: Option<i64>,
    },
}

impl RangeSpec {
    /// `(start)`: from `start` to the end.
    pub fn from_start(start: i64) -> Self {
        RangeSpec::Slice { start: Some(start), stop: None, stride: None }
    }

    /// `(start, stop)`.
    pub fn span(start: i64, stop: i64) -> Self {
        RangeSpec::Slice { start: Some(start), stop: Some(stop), stride: None }
    }

    /// `(start, stop, stride)`.
    pub fn strided(start: i64, stop: i64, stride: i64) -> Self {
        RangeSpec::Slice { start: Some(start), stop: Some(stop), stride: Some(stride) }
    }

    /// Every element, last to first.
    pub fn reversed() -> Self {
        RangeSpec::Slice { start: Some(-1), stop: None, stride: Some(-1) }
    }

    /// Resolves this specification against an axis of `length` elements.
    pub fn resolve(&self, length: usize) -> Result<Resolved> {
        let len = length as i64;
        match *self {
            RangeSpec::All => Ok(Resolved::new(0, len, 1, length, false)),
            RangeSpec::Index(index) => {
                let absolute = if index < 0 { index + len } else { index };
                if absolute < 0 || absolute >= len {
                    return Err(CphdError::Range(format!(
                        "index {} outside of [0, {})",
                        index, length
                    )));
                }
                Ok(Resolved::new(absolute, absolute + 1, 1, length, true))
            }
            RangeSpec::Slice { start, stop, stride } => {
                let stride = stride.unwrap_or(1);
                if stride == 0 {
                    return Err(CphdError::Range("The stride value cannot be 0".to_string()));
                }

                let start = start.unwrap_or(if stride < 0 { -1 } else { 0 });
                if start == -1 && stride < 0 {
                    return Ok(Resolved::new(-1, stop.unwrap_or(len), stride, length, false));
                }

                let start = if start < 0 { start + len } else { start };
                let stop = match stop {
                    None => len,
                    Some(s) if s < 0 => s + len,
                    Some(s) => s,
                };

                let start_limit = if stride < 0 { len - 1 } else { len };
                if start < 0 || start > start_limit {
                    return Err(CphdError::Range(format!(
                        "start {} outside of [0, {}] for stride {}",
                        start, start_limit, stride
                    )));
                }
                if stop < 0 || stop > len {
                    return Err(CphdError::Range(format!(
                        "stop {} outside of [0, {}]",
                        stop, len
                    )));
                }
                Ok(Resolved::new(start, stop, stride, length, false))
            }
        }
    }
}

impl From<usize> for RangeSpec {
    fn from(index: usize) -> Self {
        RangeSpec::Index(index as i64)
    }
}

impl From<i64> for RangeSpec {
    fn from(index: i64) -> Self {
        RangeSpec::Index(index)
    }
}

impl From<(i64, i64)> for RangeSpec {
    fn from((start, stop): (i64, i64)) -> Self {
        RangeSpec::span(start, stop)
    }
}

impl From<(i64, i64, i64)> for RangeSpec {
    fn from((start, stop, stride): (i64, i64, i64)) -> Self {
        RangeSpec::strided(start, stop, stride)
    }
}

impl<T: Into<RangeSpec>> From<Option<T>> for RangeSpec {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// An absolute `(start, stop, stride)` selection over an axis of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub start: i64,
    pub stop: i64,
    pub stride: i64,
    length: usize,
    collapsed: bool,
}

impl Resolved {
    fn new(start: i64, stop: i64, stride: i64, length: usize, collapsed: bool) -> Self {
        Self { start, stop, stride, length, collapsed }
    }

    pub fn as_tuple(&self) -> (i64, i64, i64) {
        (self.start, self.stop, self.stride)
    }

    /// True for the `start == -1`, negative-stride walk from the last element.
    pub fn is_reverse_from_end(&self) -> bool {
        self.start == -1 && self.stride < 0
    }

    /// True if this axis was selected by a single index.
    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Number of selected positions.
    pub fn len(&self) -> usize {
        let step = self.stride.unsigned_abs() as usize;
        if self.is_reverse_from_end() {
            return if self.length == 0 { 0 } else { (self.length - 1) / step + 1 };
        }
        let distance = if self.stride > 0 { self.stop - self.start } else { self.start - self.stop };
        if distance <= 0 {
            0
        } else {
            (distance as usize).div_ceil(step)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn first(&self) -> i64 {
        if self.is_reverse_from_end() {
            self.length as i64 - 1
        } else {
            self.start
        }
    }

    /// The selected positions, in selection order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + use<> {
        let first = self.first();
        let stride = self.stride;
        (0..self.len()).map(move |k| (first + k as i64 * stride) as usize)
    }

    /// Smallest and largest selected position, or `None` if nothing is selected.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        let count = self.len();
        if count == 0 {
            return None;
        }
        let first = self.first();
        let last = first + (count as i64 - 1) * self.stride;
        Some((first.min(last) as usize, first.max(last) as usize))
    }
}
