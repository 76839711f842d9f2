use crate::error::{IndexError, Result};
use crate::timestamp::parse_timestamp;
use crate::tokenizer::{filter_stop_words, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    /// Stored lowercased.
    pub author: String,
    /// Stored lowercased.
    pub keywords: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Opaque reference to where the original content lives, e.g. a file path.
    pub locator: String,
}

/// A document as handed over by ingestion glue, with an already parsed timestamp.
#[derive(Debug, Clone)]
pub struct NewDocument<'a> {
    pub body: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub keywords: &'a str,
    pub timestamp: OffsetDateTime,
    pub locator: &'a str,
}

/// Same as [`NewDocument`] but with the timestamp still in textual form.
#[derive(Debug, Clone)]
pub struct RawDocument<'a> {
    pub body: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub keywords: &'a str,
    pub timestamp: &'a str,
    pub locator: &'a str,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InvertedIndex {
    pub(crate) postings: HashMap<String, BTreeSet<DocId>>,
    pub(crate) documents: HashMap<DocId, String>,
    pub(crate) metadata: HashMap<DocId, Metadata>,
    pub(crate) next_id: DocId,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Store a document and its metadata under the next id and post every term of
    /// its body (stop-words removed) and of its title, author and keywords (kept).
    /// Fails only once every id below `u32::MAX` has been handed out.
    pub fn add_document(&mut self, doc: NewDocument<'_>) -> Result<DocId> {
        let id = self.next_id;
        let next_id = id.checked_add(1).ok_or(IndexError::IdsExhausted)?;
        let author = doc.author.to_lowercase();
        let keywords = doc.keywords.to_lowercase();

        let mut terms = filter_stop_words(tokenize(doc.body));
        terms.extend(tokenize(doc.title));
        terms.extend(tokenize(&author));
        terms.extend(tokenize(&keywords));
        for term in terms {
            self.postings.entry(term).or_default().insert(id);
        }

        self.documents.insert(id, doc.body.to_string());
        self.metadata.insert(
            id,
            Metadata {
                title: doc.title.to_string(),
                author,
                keywords,
                timestamp: doc.timestamp,
                locator: doc.locator.to_string(),
            },
        );
        self.next_id = next_id;
        tracing::debug!(doc_id = id, title = doc.title, "indexed document");
        Ok(id)
    }

    /// Parse the timestamp first; a malformed one leaves the index untouched.
    pub fn add_document_raw(&mut self, doc: RawDocument<'_>) -> Result<DocId> {
        let timestamp = parse_timestamp(doc.timestamp)?;
        self.add_document(NewDocument {
            body: doc.body,
            title: doc.title,
            author: doc.author,
            keywords: doc.keywords,
            timestamp,
            locator: doc.locator,
        })
    }

    pub fn locator(&self, id: DocId) -> Result<&str> {
        Ok(self.metadata(id)?.locator.as_str())
    }

    pub fn metadata(&self, id: DocId) -> Result<&Metadata> {
        self.metadata.get(&id).ok_or(IndexError::NotFound(id))
    }

    pub fn document(&self, id: DocId) -> Result<&str> {
        self.documents.get(&id).map(String::as_str).ok_or(IndexError::NotFound(id))
    }

    pub fn postings(&self, term: &str) -> Option<&BTreeSet<DocId>> { self.postings.get(term) }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn num_terms(&self) -> usize { self.postings.len() }

    /// The id the next added document will receive.
    pub fn next_id(&self) -> DocId { self.next_id }
}
