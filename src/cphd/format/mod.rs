//! File format layer for CPHD containers.
//!
//! # Module Organization
//!
//! - [`header`]: Parses and serializes the text header and its block extents
//! - [`range`]: Resolves index/slice specifications against an axis length
//!
//! # Architecture
//!
//! ```text
//! File Structure (1.0):
//! ┌─────────────────┐
//! │  Text Header    │ ← header::parse()
//! ├─────────────────┤
//! │  XML Metadata   │ ← metadata::Metadata::from_xml_bytes()
//! ├─────────────────┤
//! │  Support Block  │ (optional)
//! ├─────────────────┤
//! │  PVP Block      │ ← per-channel fixed-size records
//! ├─────────────────┤
//! │  Signal Block   │ ← per-channel vectors × samples
//! └─────────────────┘
//! ```
//!
//! Version 0.3 files have the same envelope without the support block.

pub mod header;
pub mod range;
