use std::path::PathBuf;

use thiserror::Error;

use crate::shared::config::ConfigError;

/// Boxed error that can cross the worker thread boundary.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Ways a photo batch or a video run can fail.
#[derive(Error, Debug)]
pub enum RunError {
    /// The input file or capture device could not be opened. No output exists.
    #[error("cannot open {input}: {cause}")]
    SourceUnavailable { input: String, cause: Cause },

    /// A photo could not be decoded or processed; the rest of the batch was skipped.
    #[error("failed to blur {}: {cause}", path.display())]
    Photo { path: PathBuf, cause: Cause },

    #[error("failed to write {}: {cause}", path.display())]
    Sink { path: PathBuf, cause: Cause },

    #[error("frame processing failed: {0}")]
    Processing(Cause),

    #[error("cannot create output directory {}: {io}", path.display())]
    OutputDir { path: PathBuf, io: std::io::Error },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Flattens a component error into a thread-safe cause.
pub(crate) fn cause(err: Box<dyn std::error::Error>) -> Cause {
    err.to_string().into()
}
