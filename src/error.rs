//! Error types shared by every layer of the crate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SheafError>;

/// Errors surfaced by planning, resolution and evaluation.
#[derive(Debug, Error)]
pub enum SheafError {
    /// Conflicting or incomplete window, group or configuration options.
    #[error("configuration error: {0}")]
    Config(String),
    /// The requested shape or join kind exists but is not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Misuse of the selector builder or an unknown registry entry.
    #[error("selector error: {0}")]
    Selector(String),
    /// Argument lists or values that do not line up.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A name or position that does not exist in the frame.
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    /// Checked selection hit an index past the end of the input.
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds {
        /// Offending index.
        index: usize,
        /// Length of the indexed array.
        len: usize,
    },
    /// An operation received an array of the wrong dtype.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Dtype (or dtype family) the operation accepts.
        expected: String,
        /// Dtype that was supplied.
        found: String,
    },
    /// The engine failed while computing a node.
    #[error("evaluation error: {0}")]
    Evaluation(String),
    /// Invalid regex key.
    #[error(transparent)]
    Regex(#[from] regex::Error),
    /// Malformed configuration file.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    /// I/O failure while reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SheafError {
    /// Builds a [`SheafError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Builds a [`SheafError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Builds a [`SheafError::Evaluation`].
    pub fn eval(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Builds a [`SheafError::TypeMismatch`].
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
