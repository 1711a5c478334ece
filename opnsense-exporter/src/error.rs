use thiserror::Error;

use crate::client::FetchError;
use crate::gateway::{DecodeError, ParseError};

/// Failure of one fetch-decode-normalize cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CollectError {
    /// Short stage name, used as a structured log field.
    pub fn stage(&self) -> &'static str {
        match self {
            CollectError::Fetch(_) => "fetch",
            CollectError::Decode(_) => "decode",
            CollectError::Parse(_) => "parse",
        }
    }
}

/// Result type alias using [`CollectError`].
pub type Result<T> = std::result::Result<T, CollectError>;
