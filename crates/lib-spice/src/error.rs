//! Error types for netlist, deck and simulator operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the transistor-level side of the pipeline.
#[derive(Debug, Error)]
pub enum SpiceError {
    /// A file could not be read or written.
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed netlist or waveform content.
    #[error("Invalid {format} format: {message}")]
    Format {
        format: &'static str,
        message: String,
    },

    /// The simulator ran and exited non-zero.
    #[error("simulator exited with code {code}; see {log:?}")]
    Simulation { code: i32, log: PathBuf },

    /// The simulator was killed after exceeding its time budget.
    #[error("simulator timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// The simulator executable could not be started.
    #[error("failed to launch simulator '{executable}': {source}")]
    Launch {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// A deck template could not be rendered.
    #[error("deck template error: {0}")]
    Template(String),
}

impl SpiceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(format: &'static str, message: impl Into<String>) -> Self {
        Self::Format {
            format,
            message: message.into(),
        }
    }

    /// Status code reported for this error in a correlation result.
    ///
    /// Simulator exit codes pass through; everything else is `-1`.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Simulation { code, .. } => *code,
            _ => -1,
        }
    }
}

/// Result type for lib-spice operations.
pub type SpiceResult<T> = Result<T, SpiceError>;
