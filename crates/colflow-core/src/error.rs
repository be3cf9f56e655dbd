use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Columns of unequal length or values that do not match their column type.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("plan hashing error: {0}")]
    Hash(String),

    // Readers behind `BatchSource` map their failures into this variant.
    #[error("source read error: {0}")]
    Source(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
