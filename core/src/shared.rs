//! A cloneable handle for hosts that serve the index from several threads.
//!
//! One `RwLock` covers postings, documents, metadata and the id counter
//! together. Writers (`add_document*`, `load`) hold it exclusively for the
//! whole call; readers share it.

use crate::error::Result;
use crate::index::{DocId, InvertedIndex, Metadata, NewDocument, RawDocument};
use crate::persist;
use crate::rank::Hit;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SharedIndex {
    inner: Arc<RwLock<InvertedIndex>>,
}

impl SharedIndex {
    pub fn new(index: InvertedIndex) -> Self {
        Self { inner: Arc::new(RwLock::new(index)) }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, InvertedIndex> { self.inner.read() }

    pub fn write(&self) -> RwLockWriteGuard<'_, InvertedIndex> { self.inner.write() }

    pub fn add_document(&self, doc: NewDocument<'_>) -> Result<DocId> { self.inner.write().add_document(doc) }

    pub fn add_document_raw(&self, doc: RawDocument<'_>) -> Result<DocId> { self.inner.write().add_document_raw(doc) }

    pub fn search(&self, query: &str) -> Vec<DocId> { self.inner.read().search(query) }

    pub fn search_scored(&self, query: &str) -> Vec<Hit> { self.inner.read().search_scored(query) }

    pub fn locator(&self, id: DocId) -> Result<String> { self.inner.read().locator(id).map(str::to_string) }

    pub fn metadata(&self, id: DocId) -> Result<Metadata> { self.inner.read().metadata(id).cloned() }

    pub fn document(&self, id: DocId) -> Result<String> { self.inner.read().document(id).map(str::to_string) }

    pub fn len(&self) -> usize { self.inner.read().len() }

    pub fn is_empty(&self) -> bool { self.inner.read().is_empty() }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> { persist::save(&self.inner.read(), writer) }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persist::save_to_path(&self.inner.read(), path)
    }

    /// Decode a snapshot and swap it in. Readers see either the old or the new state.
    pub fn load<R: Read>(&self, reader: R) -> Result<()> {
        let fresh = persist::load(reader)?;
        *self.inner.write() = fresh;
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let fresh = persist::load_from_path(path)?;
        *self.inner.write() = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use time::OffsetDateTime;

    #[test]
    fn concurrent_writers_get_distinct_ids() {
        let shared = SharedIndex::default();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            let body = format!("thread{t} item{i}");
                            shared.add_document(NewDocument {
                                body: &body,
                                title: "t",
                                author: "a",
                                keywords: "",
                                timestamp: OffsetDateTime::UNIX_EPOCH,
                                locator: "",
                            })
                            .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<DocId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..100).collect::<Vec<_>>());
        assert_eq!(shared.len(), 100);
        assert_eq!(shared.search("thread2").len(), 25);
    }
}
