//! Error types for the contextual codec datapath.

use std::fmt::Display;
use thiserror::Error;

/// Result type alias for datapath operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised at the boundary where a mismatch is discovered.
///
/// Mod-256 wraparound is never an error; only caller-supplied shapes and
/// stage configuration can fail.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Channel, spatial or batch mismatch at a convolution, fusion or
    /// residual-add boundary.
    #[error("shape mismatch in {op}: expected {expected}, got {actual}")]
    Shape {
        /// Operation that detected the mismatch
        op: &'static str,
        /// What the operation required
        expected: String,
        /// What it was given
        actual: String,
    },

    /// Invalid stage configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed sigmoid LUT file.
    #[error("sigmoid LUT line {line}: {reason}")]
    LutFormat {
        /// 1-based line number, or the line count for length errors
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config parse error
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Create a shape mismatch error
    pub fn shape(op: &'static str, expected: impl Display, actual: impl Display) -> Self {
        CodecError::Shape {
            op,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CodecError::Config(msg.into())
    }

    /// Create a LUT format error
    pub fn lut_format<S: Into<String>>(line: usize, reason: S) -> Self {
        CodecError::LutFormat {
            line,
            reason: reason.into(),
        }
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, CodecError::Shape { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, CodecError::Config(_))
    }
}
