//! In-memory inverted index over short text documents with per-document
//! metadata, multi-key ranking and a single-blob snapshot format.

pub mod error;
pub mod filename;
pub mod index;
pub mod persist;
pub mod rank;
pub mod shared;
pub mod timestamp;
pub mod tokenizer;

pub use error::{IndexError, Result};
pub use index::{DocId, InvertedIndex, Metadata, NewDocument, RawDocument};
pub use rank::Hit;
pub use shared::SharedIndex;
