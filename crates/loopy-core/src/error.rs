//! Error types for rule mining and rule storage.
//!
//! Routine empty outcomes (no solution, no embedding, a color merge that
//! cannot happen) are `Option::None` and never reach this type.

use thiserror::Error;

/// Result type for fallible loopy-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, storing or applying rules.
#[derive(Debug, Error)]
pub enum Error {
    /// A pattern board descriptor violates the board invariants
    #[error("Invalid pattern board descriptor: {0}")]
    InvalidDescriptor(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The compressed rule buffer could not be decoded
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// A binary rule buffer is truncated or references unknown entries
    #[error("Malformed rule data at rule {rule}: {reason}")]
    MalformedRuleData { rule: usize, reason: String },

    /// Applying a rule produced a contradictory feature set
    #[error("Incompatible feature: {0}")]
    IncompatibleFeature(String),

    /// A board has more binary features than a single byte can address
    #[error("Board {board} needs {entries} binary features, at most 254 fit in a byte")]
    FeatureTableOverflow { board: String, entries: usize },

    /// Face indices in color runs must stay below 0x7E
    #[error("Face index {0} cannot be encoded in a face-color run")]
    FaceIndexOverflow(usize),

    /// Too many exit edges are left open in one solution to expand both readings
    #[error("{0} ambiguous exit edges in one solution, at most {1} can be expanded")]
    TooManyAmbiguousExits(usize, usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
