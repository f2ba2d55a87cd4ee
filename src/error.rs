use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds stay distinguishable so callers can decide which ones abort
/// a run and which ones only drop the offending primitive.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("projection failed: {0}")]
    Projection(String),

    #[error("degenerate geometry: {0}")]
    Geometry(String),

    #[error("tile {key}: {reason}")]
    TileDecode { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Parse(String),
}

impl Error {
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
