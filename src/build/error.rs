use std::path::PathBuf;
use thiserror::Error;

/// Failure building one entry document. Siblings are unaffected.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse `{0}`: {1}")]
    Parse(PathBuf, String),

    #[error("failed to compile `{path}` (referenced by `{document}`)")]
    Compile {
        document: PathBuf,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] std::io::Error),
}
