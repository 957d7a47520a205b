//! Core CPHD container codec

pub mod codec;
pub mod details;
pub mod format;
pub mod index;
pub mod metadata;
pub mod reader;
pub mod store;
pub mod types;
pub mod writer;
mod utils;

pub use details::CphdDetails;
pub use reader::{CphdReader, PhaseHistoryRead, ReaderV0_3, ReaderV1_0, is_container};
pub use types::error::{CphdError, Result};
pub use writer::CphdWriter;
