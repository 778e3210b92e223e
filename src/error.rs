use std::path::PathBuf;
use thiserror::Error;

/// Fatal alignment errors.
///
/// Individual strategy failures never surface here; the cascade absorbs them.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write aligned image {path}: {source}")]
    Composite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlignmentError {
    pub fn decode(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        Self::Decode {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn composite(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        Self::Composite {
            path: path.into(),
            source: source.into(),
        }
    }
}
