//! Domain-specific errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Terminal failures of an extraction run. The first one raised stops the run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("'{marker}' directory not found under {}", root.display())]
    RootNotFound { marker: String, root: PathBuf },
    #[error("example '{name}' not found under {}", root.display())]
    ExampleNotFound { name: String, root: PathBuf },
    #[error("board '{name}' not found under {}", root.display())]
    BoardNotFound { name: String, root: PathBuf },
    #[error("no model number (U followed by three digits) in board '{board}'")]
    ModelNotExtractable { board: String },
    #[error("no startup file for model {model} under {}", root.display())]
    StartupFileNotFound { model: String, root: PathBuf },
    #[error("no include file for model {model} under {}", root.display())]
    IncludeFileNotFound { model: String, root: PathBuf },
    #[error("invalid selection '{input}' (expected 1..={max})")]
    InvalidSelection { input: String, max: usize },
    #[error("path '{}' escapes the destination bundle", path.display())]
    EscapesDestination { path: PathBuf },
    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to publish bundle to {}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    /// Process exit code reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExtractError::RootNotFound { .. } => 2,
            ExtractError::ExampleNotFound { .. } => 3,
            ExtractError::BoardNotFound { .. } => 4,
            ExtractError::ModelNotExtractable { .. } => 5,
            ExtractError::StartupFileNotFound { .. } => 6,
            ExtractError::IncludeFileNotFound { .. } => 7,
            ExtractError::InvalidSelection { .. } => 8,
            ExtractError::EscapesDestination { .. }
            | ExtractError::Copy { .. }
            | ExtractError::Publish { .. } => 9,
        }
    }

    pub(crate) fn copy(from: impl Into<PathBuf>, to: impl Into<PathBuf>, source: io::Error) -> Self {
        ExtractError::Copy {
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}
