use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid lumen.toml")]
    Toml(#[from] toml::de::Error),

    /// Parsed fine but would make the run destructive or unbindable.
    #[error("invalid config: {0}")]
    Validation(String),
}
