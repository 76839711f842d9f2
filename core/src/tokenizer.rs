use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    static ref RE: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a", "an", "the", "is", "are", "was", "were", "this", "that", "of", "for", "on", "in",
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stop_word(term: &str) -> bool { STOPWORDS.contains(term) }

/// Lowercase `text` and split it into maximal runs of word characters, left to right.
pub fn tokenize(text: &str) -> Vec<String> {
    let folded = text.to_lowercase();
    RE.find_iter(&folded).map(|m| m.as_str().to_string()).collect()
}

/// Drop stop-words, keeping order and duplicates of everything else.
pub fn filter_stop_words(terms: Vec<String>) -> Vec<String> {
    terms.into_iter().filter(|t| !is_stop_word(t)).collect()
}

/// Distinct, stop-word-filtered terms of a query.
pub fn query_terms(query: &str) -> BTreeSet<String> {
    filter_stop_words(tokenize(query)).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Hello, World! snake_case 42x");
        assert_eq!(t, vec!["hello", "world", "snake_case", "42x"]);
    }

    #[test]
    fn empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ,.;!  ").is_empty());
        assert!(query_terms("the a of").is_empty());
    }
}
