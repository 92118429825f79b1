//! Error type shared by the library. The binary wraps these with `anyhow` context.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("could not serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid SMILES `{smiles}`: {reason}")]
    Smiles { smiles: String, reason: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Loading or saving a burn record file.
    #[error("model record error: {0}")]
    Record(String),

    #[error("tensor data error: {0}")]
    Tensor(String),
}

impl Error {
    pub(crate) fn smiles(smiles: &str, reason: impl Into<String>) -> Self {
        Self::Smiles {
            smiles: smiles.to_owned(),
            reason: reason.into(),
        }
    }
}
