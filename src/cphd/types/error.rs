//! Custom error types for the cphd-reader crate.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum CphdError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The path is missing, is not a regular file, or does not start with the CPHD signature.
    #[error("Not a CPHD file: {0}")]
    NotAContainer(String),

    /// The file is structurally invalid: bad header, bad XML, unhandled version or format.
    #[error("Invalid format: {0}")]
    Format(String),

    /// A version-specific reader was constructed against a file of another version.
    #[error("CPHD version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// A string identifier did not name any channel or support array.
    #[error("Unknown {kind} identifier '{identifier}'")]
    UnknownIdentifier { kind: &'static str, identifier: String },

    /// An ordinal reference fell outside `[0, count)`.
    #[error("{kind} index {index} out of range [0, {count})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    /// A range specification was invalid for the addressed axis, or a write would run past an entry.
    #[error("Invalid range: {0}")]
    Range(String),

    /// Data supplied to a writer does not match the declared layout.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation does not exist for this file version.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The writer destination already exists and existence checking was requested.
    #[error("File {0} already exists")]
    AlreadyExists(PathBuf),

    /// The writer was finalized before every declared row and pixel had been written.
    #[error("CPHD file {path} is not fully written:\n{details}")]
    IncompleteWrite { path: PathBuf, details: String },

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `CphdError` type.
pub type Result<T> = std::result::Result<T, CphdError>;
