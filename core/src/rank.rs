//! Query evaluation and result ordering.
//!
//! A document matches a query when at least one distinct query term appears in
//! its postings. Matches are ordered by, most significant first:
//!
//! 1. number of distinct query terms matched,
//! 2. timestamp, most recent first,
//! 3. a query term occurring inside the author,
//! 4. a query term occurring inside the keywords,
//! 5. a query term occurring inside the title,
//!
//! and finally by ascending document id. Keys 3–5 are substring tests on the
//! lowercased fields, independent of how the match count was obtained.

use crate::index::{DocId, InvertedIndex, Metadata};
use crate::tokenizer::query_terms;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

/// One ranked result together with the keys it was ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub doc_id: DocId,
    pub matched_terms: u32,
    pub timestamp: OffsetDateTime,
    pub author_match: bool,
    pub keywords_match: bool,
    pub title_match: bool,
}

impl Hit {
    fn new(doc_id: DocId, matched_terms: u32, meta: &Metadata, terms: &BTreeSet<String>) -> Self {
        let title = meta.title.to_lowercase();
        let contains_any = |field: &str| terms.iter().any(|t| field.contains(t.as_str()));
        Hit {
            doc_id,
            matched_terms,
            timestamp: meta.timestamp,
            author_match: contains_any(&meta.author),
            keywords_match: contains_any(&meta.keywords),
            title_match: contains_any(&title),
        }
    }

    /// Total order: better hits compare as `Less`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .matched_terms
            .cmp(&self.matched_terms)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.author_match.cmp(&self.author_match))
            .then_with(|| other.keywords_match.cmp(&self.keywords_match))
            .then_with(|| other.title_match.cmp(&self.title_match))
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

impl InvertedIndex {
    /// Ids of all documents matching `query`, best first.
    pub fn search(&self, query: &str) -> Vec<DocId> {
        self.search_scored(query).into_iter().map(|h| h.doc_id).collect()
    }

    pub fn search_scored(&self, query: &str) -> Vec<Hit> {
        let terms = query_terms(query);
        let mut match_count: HashMap<DocId, u32> = HashMap::new();
        for term in &terms {
            if let Some(ids) = self.postings.get(term) {
                for id in ids {
                    *match_count.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let mut hits: Vec<Hit> = match_count
            .into_iter()
            .filter_map(|(id, count)| self.metadata.get(&id).map(|meta| Hit::new(id, count, meta, &terms)))
            .collect();
        hits.sort_by(Hit::rank_cmp);
        tracing::debug!(query, terms = terms.len(), hits = hits.len(), "search");
        hits
    }
}
