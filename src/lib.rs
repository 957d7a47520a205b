//! # cphd-reader
//!
//! A reader and writer for CPHD (Compensated Phase History Data) files.
//! Reads versions 0.3 and 1.0 and writes version 1.0, with random access to
//! signal samples, per-vector parameters and support arrays by ordinal or
//! identifier.
pub mod cphd;

// Re-export the main types for convenience
pub use cphd::{
    CphdDetails,
    CphdError,
    CphdReader,
    CphdWriter,
    PhaseHistoryRead,
    ReaderV0_3,
    ReaderV1_0,
    Result,
    codec::pvp::PvpRecords,
    format::range::RangeSpec,
    is_container,
    metadata::{Metadata, MetadataV0_3, MetadataV1_0, PvpField, PvpLayout, SupportArrayKind, SupportArrayType},
    types::{
        elements::{ElementArray, ElementFormat, ElementLayout},
        models::{AccessPolicy, Channel, CphdVersion, EntryRef, SignalFormat, SupportArrayEntry},
    },
};
