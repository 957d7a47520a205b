//! Core data structures for CPHD container components.
//!
//! This module defines the fundamental types used throughout the library:
//! - Version enumeration and signal sample formats
//! - Channel and support-array geometry records
//! - Entry references and store access policy

use std::fmt;

use super::elements::ElementFormat;
use super::error::{CphdError, Result};
use crate::cphd::utils::byte_span;

/// The two supported on-disk schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CphdVersion {
    V0_3,
    V1_0,
}

impl CphdVersion {
    /// Maps the version string from the first line of a file to a schema.
    ///
    /// Matching is by prefix, so `"1.0.1"` selects [`CphdVersion::V1_0`].
    pub fn from_version_str(version: &str) -> Result<Self> {
        if version.starts_with("0.3") {
            Ok(Self::V0_3)
        } else if version.starts_with("1.0") {
            Ok(Self::V1_0)
        } else {
            Err(CphdError::Format(format!("Got unhandled CPHD version {}", version)))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CphdVersion::V0_3 => "0.3",
            CphdVersion::V1_0 => "1.0",
        }
    }
}

impl fmt::Display for CphdVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sample format of the signal block.
///
/// Every format stores an interleaved (real, imaginary) pair per sample and is
/// presented to callers as single-precision complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFormat {
    /// Two big-endian 32-bit floats (`RE32F_IM32F` in 0.3).
    CF8,
    /// Two big-endian 16-bit integers (`RE16I_IM16I` in 0.3).
    CI4,
    /// Two 8-bit integers (`RE08I_IM08I` in 0.3).
    CI2,
}

impl SignalFormat {
    pub fn from_v1_0_str(value: &str) -> Result<Self> {
        match value.trim() {
            "CF8" => Ok(Self::CF8),
            "CI4" => Ok(Self::CI4),
            "CI2" => Ok(Self::CI2),
            other => Err(CphdError::Format(format!("Got unhandled signal array format {}", other))),
        }
    }

    pub fn from_v0_3_str(value: &str) -> Result<Self> {
        match value.trim() {
            "RE32F_IM32F" => Ok(Self::CF8),
            "RE16I_IM16I" => Ok(Self::CI4),
            "RE08I_IM08I" => Ok(Self::CI2),
            other => Err(CphdError::Format(format!("Got unhandled sample type {}", other))),
        }
    }

    /// The name used by the 1.0 schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalFormat::CF8 => "CF8",
            SignalFormat::CI4 => "CI4",
            SignalFormat::CI2 => "CI2",
        }
    }

    /// The element format of one (real, imaginary) pair as stored on disk.
    pub fn element_format(&self) -> ElementFormat {
        match self {
            SignalFormat::CF8 => ElementFormat::CF8,
            SignalFormat::CI4 => ElementFormat::CI4,
            SignalFormat::CI2 => ElementFormat::CI2,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.element_format().size()
    }
}

/// Geometry of one signal channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub identifier: String,
    pub num_vectors: usize,
    pub num_samples: usize,
    /// Offset of this channel's samples relative to the start of the signal block.
    pub signal_array_byte_offset: u64,
    /// Offset of this channel's PVP records relative to the start of the PVP block.
    pub pvp_array_byte_offset: u64,
}

impl Channel {
    /// Vectors times samples, saturating; a saturated count fits no block.
    pub fn num_pixels(&self) -> usize {
        self.num_vectors.saturating_mul(self.num_samples)
    }
}

/// Geometry of one support array entry (version 1.0 only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportArrayEntry {
    pub identifier: String,
    pub num_rows: usize,
    pub num_cols: usize,
    pub bytes_per_element: usize,
    /// Offset relative to the start of the support block.
    pub array_byte_offset: u64,
}

impl SupportArrayEntry {
    pub fn num_pixels(&self) -> usize {
        self.num_rows.saturating_mul(self.num_cols)
    }

    pub fn byte_size(&self) -> Result<u64> {
        byte_span(self.num_pixels(), self.bytes_per_element)
    }
}

/// Reference to a channel or support array, either by position or by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRef<'a> {
    Index(usize),
    Identifier(&'a str),
}

impl From<usize> for EntryRef<'_> {
    fn from(index: usize) -> Self {
        EntryRef::Index(index)
    }
}

impl<'a> From<&'a str> for EntryRef<'a> {
    fn from(identifier: &'a str) -> Self {
        EntryRef::Identifier(identifier)
    }
}

impl<'a> From<&'a String> for EntryRef<'a> {
    fn from(identifier: &'a String) -> Self {
        EntryRef::Identifier(identifier.as_str())
    }
}

impl fmt::Display for EntryRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntryRef::Index(i) => write!(f, "#{}", i),
            EntryRef::Identifier(s) => write!(f, "'{}'", s),
        }
    }
}

/// How block data is accessed on disk.
///
/// Both policies are observably equivalent; the choice only trades memory
/// mapping against explicit positioned I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessPolicy {
    /// Map the file once and address blocks as slices of the mapping.
    #[default]
    Mapped,
    /// Seek and read (or write) each requested span through a shared file handle.
    Buffered,
}
