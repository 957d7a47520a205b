//! Codec layer for sample and record conversion.
//!
//! # Submodules
//!
//! - [`transform`][]: Raw interleaved samples to `Complex32`, and amplitude scaling
//! - [`pvp`][]: Structured per-vector parameter records

pub mod pvp;
pub mod transform;
