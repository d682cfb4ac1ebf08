//! fruitscan Core
//!
//! Types shared across the fruitscan crates.
//!
//! This crate provides:
//! - The error taxonomy reported in prediction envelopes
//! - The closed set of classifier kinds

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::ClassifierKind;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::types::ClassifierKind;
}
