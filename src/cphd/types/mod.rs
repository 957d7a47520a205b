//! Foundational data structures, element formats, and error types.

pub mod elements;
pub mod error;
pub mod models;
