//! Errors reported by index operations.

use crate::DocId;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    /// No document was ever assigned this id.
    #[error("document {0} not found")]
    NotFound(DocId),

    /// A snapshot stream failed to decode or failed structural validation.
    #[error("corrupt snapshot: {0}")]
    CorruptData(String),

    #[error("malformed timestamp {input:?}: {reason}")]
    MalformedTimestamp { input: String, reason: String },

    /// Every document id has been assigned; ids are never reused.
    #[error("document id space exhausted")]
    IdsExhausted,

    /// A document file name does not follow the `title_author_timestamp` layout.
    #[error("invalid document file name {0:?}")]
    InvalidFileName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        IndexError::CorruptData(msg.into())
    }

    pub fn malformed_timestamp<S: Into<String>, R: ToString>(input: S, reason: R) -> Self {
        IndexError::MalformedTimestamp { input: input.into(), reason: reason.to_string() }
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) if io.kind() != io::ErrorKind::UnexpectedEof => IndexError::Io(io),
            other => IndexError::CorruptData(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
