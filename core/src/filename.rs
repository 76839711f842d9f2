//! Document folders where each file name carries its metadata as
//! `title_author_timestamp`. Inside title and author, spaces are written as
//! `%20`, and `%`, `_`, `/` and `\` are percent-escaped as well, so a name is
//! always a single path component. The timestamp is fractional Unix seconds.

use crate::error::{IndexError, Result};
use crate::index::{DocId, InvertedIndex, NewDocument};
use crate::timestamp::{format_unix_seconds, from_unix_seconds};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub title: String,
    pub author: String,
    pub timestamp: OffsetDateTime,
}

pub fn encode_filename(title: &str, author: &str, timestamp: OffsetDateTime) -> String {
    format!("{}_{}_{}", escape(title), escape(author), format_unix_seconds(timestamp))
}

pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '_' => out.push_str("%5F"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse of `escape`. Any `%XX` naming an ASCII character is decoded; other `%` stay literal.
pub fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut rest = field;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3).and_then(|h| u8::from_str_radix(h, 16).ok()).filter(u8::is_ascii);
        match code {
            Some(b) => {
                out.push(char::from(b));
                rest = &rest[pos + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Split on the last two underscores; the title may contain more.
pub fn decode_filename(name: &str) -> Result<FileMetadata> {
    let mut parts = name.rsplitn(3, '_');
    let (ts, author, title) = match (parts.next(), parts.next(), parts.next()) {
        (Some(ts), Some(author), Some(title)) => (ts, author, title),
        _ => return Err(IndexError::InvalidFileName(name.to_string())),
    };
    Ok(FileMetadata {
        title: unescape(title),
        author: unescape(author),
        timestamp: from_unix_seconds(ts)?,
    })
}

/// Ingest every regular file directly inside `dir`, in file name order.
/// Files whose names or contents cannot be read are skipped with a warning.
pub fn scan_folder<P: AsRef<Path>>(index: &mut InvertedIndex, dir: P) -> Result<Vec<DocId>> {
    let dir = dir.as_ref();
    let mut ids = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IndexError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
            continue;
        };
        let meta = match decode_filename(name) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(file = name, %err, "skipping file");
                continue;
            }
        };
        let body = match fs::read_to_string(entry.path()) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(file = name, %err, "skipping unreadable file");
                continue;
            }
        };
        let locator = entry.path().to_string_lossy();
        ids.push(index.add_document(NewDocument {
            body: &body,
            title: &meta.title,
            author: &meta.author,
            keywords: "",
            timestamp: meta.timestamp,
            locator: &locator,
        })?);
    }
    tracing::info!(dir = %dir.display(), docs = ids.len(), "scanned document folder");
    Ok(ids)
}
