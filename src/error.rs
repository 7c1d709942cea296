//! Error types for the type-graph engine.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("unknown output language: {0}")]
    UnknownOutputLanguage(String),

    #[error("unknown renderer option `{option}` for target `{lang}`")]
    UnknownRendererOption { lang: String, option: String },

    /// A builder or pass produced an illegal shape. These signal bugs in the
    /// pipeline itself and are never caught below the driver.
    #[error("structural invariant violated: {0}")]
    Invariant(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("render error: {0}")]
    Render(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Input(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
