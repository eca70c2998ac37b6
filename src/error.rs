use thiserror::Error;

use crate::{Band, ParseError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The formula does not match the grammar.
    #[error("syntax error in formula:\n{0}")]
    Syntax(Box<ParseError>),

    /// An identifier reached compilation without a band-table entry.
    #[error("unknown band identifier `{0}`")]
    Lookup(String),

    #[error("no values bound for band `{0}`")]
    UnboundBand(Band),

    #[error("band `{band}` has {actual} values, expected {expected}")]
    BindingLength {
        band: Band,
        expected: usize,
        actual: usize,
    },

    /// Malformed command template configuration.
    #[error("invalid command template: {0}")]
    Template(#[from] serde_json::Error),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Syntax(Box::new(e))
    }
}
