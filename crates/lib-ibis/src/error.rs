//! Error types for model-description processing.

use lib_types::units::NumberFormatError;
use lib_types::CompanionKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing model-description files.
#[derive(Debug, Error)]
pub enum ParseError {
    /// I/O error reading or writing a file.
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed content.
    #[error("Invalid {format} format at line {line}: {message}")]
    Format {
        format: &'static str,
        line: usize,
        message: String,
    },

    /// A numeric token that could not be parsed.
    #[error(transparent)]
    Number(#[from] NumberFormatError),
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a format error at a 1-based line.
    pub fn format(format: &'static str, line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            line,
            message: message.into(),
        }
    }
}

/// Result type for model-description operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// An unresolved cross-reference found during completion.
///
/// These are collected, never returned as `Err`: one pass reports every
/// defect in the graph.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// A pin names a model that does not exist.
    #[error("component '{component}' pin '{pin}': model '{model}' not found")]
    UnresolvedModel {
        component: String,
        pin: String,
        model: String,
    },

    /// A pin's companion reference names a pin not on the same component.
    #[error("component '{component}' pin '{pin}': {kind} '{target}' not found")]
    UnresolvedCompanion {
        component: String,
        pin: String,
        kind: CompanionKind,
        target: String,
    },
}
