//! Snapshot codec.
//!
//! A snapshot is the 8-byte magic `DOCSRCH\0`, a little-endian `u32` format
//! version, then a bincode body (fixed-width little-endian integers, `u64`
//! length prefixes) laid out as:
//!
//! 1. postings: term count, then per term its text and ascending doc ids
//! 2. documents: count, then per document its id and body
//! 3. metadata: count, then per document its id, title, author, keywords,
//!    timestamp (Unix nanoseconds + UTC offset seconds) and locator
//! 4. the next-id counter
//!
//! Decoding builds a fresh [`InvertedIndex`] and validates it before handing
//! it out, so a failed load never touches existing state.

use crate::error::{IndexError, Result};
use crate::index::{DocId, InvertedIndex, Metadata};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::{OffsetDateTime, UtcOffset};

pub const MAGIC: &[u8; 8] = b"DOCSRCH\0";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    postings: Vec<(String, Vec<DocId>)>,
    documents: Vec<(DocId, String)>,
    metadata: Vec<(DocId, MetaRecord)>,
    next_id: DocId,
}

#[derive(Serialize, Deserialize)]
struct MetaRecord {
    title: String,
    author: String,
    keywords: String,
    unix_nanos: i128,
    offset_seconds: i32,
    locator: String,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().with_little_endian()
}

/// Write the full state of `index` to `writer` as one snapshot.
pub fn save<W: Write>(index: &InvertedIndex, mut writer: W) -> Result<()> {
    let snapshot = Snapshot::from_index(index);
    let mut bytes = Vec::with_capacity(MAGIC.len() + 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    options().serialize_into(&mut bytes, &snapshot)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a snapshot into a new index.
pub fn load<R: Read>(mut reader: R) -> Result<InvertedIndex> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    decode(&buf)
}

pub fn decode(buf: &[u8]) -> Result<InvertedIndex> {
    let header_len = MAGIC.len() + 4;
    if buf.len() < header_len || &buf[..MAGIC.len()] != MAGIC {
        return Err(IndexError::corrupt("missing snapshot header"));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&buf[MAGIC.len()..header_len]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(IndexError::corrupt(format!("unsupported snapshot version {version}")));
    }
    let body = &buf[header_len..];
    let snapshot: Snapshot = options()
        .reject_trailing_bytes()
        .with_limit(body.len() as u64)
        .deserialize(body)?;
    snapshot.into_index()
}

/// Save to `path` through a sibling temporary file, so readers never see a half-written snapshot.
pub fn save_to_path<P: AsRef<Path>>(index: &InvertedIndex, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = tmp_path(path);
    let f = File::create(&tmp)?;
    save(index, f)?;
    fs::rename(&tmp, path)?;
    tracing::info!(path = %path.display(), docs = index.len(), terms = index.num_terms(), "saved snapshot");
    Ok(())
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<InvertedIndex> {
    let path = path.as_ref();
    let index = load(File::open(path)?)?;
    tracing::info!(path = %path.display(), docs = index.len(), terms = index.num_terms(), "loaded snapshot");
    Ok(index)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl InvertedIndex {
    pub fn save_to<W: Write>(&self, writer: W) -> Result<()> { save(self, writer) }

    /// Replace the whole state with the snapshot read from `reader`.
    /// On error the current state is kept as is.
    pub fn load_from<R: Read>(&mut self, reader: R) -> Result<()> {
        *self = load(reader)?;
        Ok(())
    }
}

impl Snapshot {
    fn from_index(index: &InvertedIndex) -> Self {
        let mut postings: Vec<(String, Vec<DocId>)> = index
            .postings
            .iter()
            .map(|(term, ids)| (term.clone(), ids.iter().copied().collect()))
            .collect();
        postings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut documents: Vec<(DocId, String)> = index.documents.iter().map(|(id, body)| (*id, body.clone())).collect();
        documents.sort_by_key(|(id, _)| *id);

        let mut metadata: Vec<(DocId, MetaRecord)> = index
            .metadata
            .iter()
            .map(|(id, meta)| (*id, MetaRecord::from(meta)))
            .collect();
        metadata.sort_by_key(|(id, _)| *id);

        Snapshot { postings, documents, metadata, next_id: index.next_id }
    }

    fn into_index(self) -> Result<InvertedIndex> {
        let next_id = self.next_id;
        let check_id = |id: DocId, what: &str| {
            if id >= next_id {
                Err(IndexError::corrupt(format!("{what} id {id} not below next id {next_id}")))
            } else {
                Ok(())
            }
        };

        let mut documents = HashMap::with_capacity(self.documents.len());
        for (id, body) in self.documents {
            check_id(id, "document")?;
            if documents.insert(id, body).is_some() {
                return Err(IndexError::corrupt(format!("duplicate document {id}")));
            }
        }

        let mut metadata = HashMap::with_capacity(self.metadata.len());
        for (id, record) in self.metadata {
            check_id(id, "metadata")?;
            if !documents.contains_key(&id) {
                return Err(IndexError::corrupt(format!("metadata for unknown document {id}")));
            }
            if metadata.insert(id, record.into_metadata()?).is_some() {
                return Err(IndexError::corrupt(format!("duplicate metadata for document {id}")));
            }
        }
        if metadata.len() != documents.len() {
            return Err(IndexError::corrupt("documents without metadata"));
        }

        let mut postings = HashMap::with_capacity(self.postings.len());
        for (term, ids) in self.postings {
            if ids.is_empty() {
                return Err(IndexError::corrupt(format!("empty posting list for {term:?}")));
            }
            if ids.windows(2).any(|w| w[0] >= w[1]) {
                return Err(IndexError::corrupt(format!("unsorted posting list for {term:?}")));
            }
            if let Some(id) = ids.iter().find(|id| !documents.contains_key(*id)) {
                return Err(IndexError::corrupt(format!("term {term:?} posts unknown document {id}")));
            }
            let set: BTreeSet<DocId> = ids.into_iter().collect();
            if postings.insert(term, set).is_some() {
                return Err(IndexError::corrupt("duplicate term"));
            }
        }

        Ok(InvertedIndex { postings, documents, metadata, next_id })
    }
}

impl From<&Metadata> for MetaRecord {
    fn from(meta: &Metadata) -> Self {
        MetaRecord {
            title: meta.title.clone(),
            author: meta.author.clone(),
            keywords: meta.keywords.clone(),
            unix_nanos: meta.timestamp.unix_timestamp_nanos(),
            offset_seconds: meta.timestamp.offset().whole_seconds(),
            locator: meta.locator.clone(),
        }
    }
}

impl MetaRecord {
    fn into_metadata(self) -> Result<Metadata> {
        let offset = UtcOffset::from_whole_seconds(self.offset_seconds)
            .map_err(|e| IndexError::corrupt(format!("bad UTC offset: {e}")))?;
        let timestamp = OffsetDateTime::from_unix_timestamp_nanos(self.unix_nanos)
            .map_err(|e| IndexError::corrupt(format!("bad timestamp: {e}")))?
            .checked_to_offset(offset)
            .ok_or_else(|| IndexError::corrupt("timestamp out of range for its UTC offset"))?;
        Ok(Metadata {
            title: self.title,
            author: self.author,
            keywords: self.keywords,
            timestamp,
            locator: self.locator,
        })
    }
}
