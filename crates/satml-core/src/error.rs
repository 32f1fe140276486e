use std::path::PathBuf;

use crate::shape::Shape;

/// All errors that can occur within satml.
///
/// Construction problems, container faults, out-of-range access and corrupt
/// labels all surface through this one enum so callers can propagate with `?`
/// from any layer of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed construction parameter (empty sampler, unknown phase, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The container is missing, unreadable, malformed, or lacks an array.
    #[error("failed to load {}: {reason}", path.display())]
    DataLoad { path: PathBuf, reason: String },

    /// Element access past the end of a collection.
    #[error("index {index} out of range for length {len}")]
    Index { index: usize, len: usize },

    /// A one-hot label column holds no entry equal to 1.
    #[error("label column {column} (sample {index}) has no one-hot entry")]
    LabelDecode { index: usize, column: usize },

    /// Shape mismatch between what was expected and what was found.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Element count mismatch when creating an array from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(s: impl Into<String>) -> Self {
        Error::InvalidArgument(s.into())
    }

    /// Shorthand for [`Error::DataLoad`].
    pub fn data_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::DataLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach a path to a load failure that was raised without one.
    ///
    /// Errors that already carry a path, or are not load failures, pass through.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Error::DataLoad { path: p, reason } if p.as_os_str().is_empty() => Error::DataLoad {
                path: path.into(),
                reason,
            },
            other => other,
        }
    }
}

/// Convenience Result type used throughout satml.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
