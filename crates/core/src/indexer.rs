//! Free-text indexer: normalizes a payload and emits the n-gram substrings used as inverted-index
//! row-key suffixes. A pure, stateless-besides-`index_depth` component — it never calls back into
//! the engine, which keeps the DAO/indexer relationship acyclic.

use std::collections::BTreeSet;

use crate::model::{IndexEntry, TimestampedDatum};

const PUNCTUATION: &[char] = &[
    ',', '.', '-', '=', '!', '@', '#', '$', '(', ')', '<', '>', '_', '[', ']', '\'', '"', '´', ':', '?',
];

/// Lowercases, replaces the punctuation set with spaces, collapses whitespace runs, and trims.
/// Operates on `char`s so non-ASCII letters (`ö`, `á`, Arabic, ...) survive untouched.
pub fn normalize(s: &str) -> String {
    let scrubbed: String = s
        .chars()
        .map(|c| {
            let lower = c.to_lowercase().next().unwrap_or(c);
            if PUNCTUATION.contains(&lower) {
                ' '
            } else {
                lower
            }
        })
        .collect();

    scrubbed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-joined n-grams of `s`'s tokenization, for `n = 1..=depth`. Order is not significant;
/// a `BTreeSet` gives deterministic iteration for tests without implying the original had one.
pub fn substrings(s: &str, depth: usize) -> BTreeSet<String> {
    let words: Vec<&str> = s.split_whitespace().collect();
    let mut result = BTreeSet::new();

    for window_len in 1..=depth {
        if window_len > words.len() {
            break;
        }
        for start in 0..=(words.len() - window_len) {
            result.insert(words[start..start + window_len].join(" "));
        }
    }

    result
}

/// Produces the inverted-index rows a datum should contribute, at the indexer's configured depth.
#[derive(Debug, Clone)]
pub struct StringIndexer {
    index_depth: usize,
}

impl StringIndexer {
    pub fn new(index_depth: usize) -> Self {
        Self { index_depth }
    }

    pub fn index_depth(&self) -> usize {
        self.index_depth
    }

    /// One [`IndexEntry`] per substring of the datum's indexable text, sharing the datum's
    /// timestamp and pointing at `blob_row_key`.
    pub fn index_keys(&self, datum: &TimestampedDatum, blob_row_key: &str) -> Vec<IndexEntry> {
        let normalized = normalize(&datum.indexable_text());
        substrings(&normalized, self.index_depth)
            .into_iter()
            .map(|substring| IndexEntry {
                source_id: datum.source_id.clone(),
                data_name: datum.data_name.clone(),
                substring,
                timestamp: datum.timestamp,
                blob_row_key: blob_row_key.to_owned(),
            })
            .collect()
    }
}

impl Default for StringIndexer {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_preserves_utf8() {
        assert_eq!(normalize("sea."), "sea");
        assert_eq!(
            normalize(
                "<1921___.bg three cäts!Left__hôme(early)-In.Two.CARS really?"
            ),
            "1921 bg three cäts left hôme early in two cars really"
        );
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn substrings_depth_two() {
        let got = substrings("hello indexed words", 2);
        let want: BTreeSet<String> = ["hello", "indexed", "words", "hello indexed", "indexed words"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn substrings_depth_beyond_word_count_is_same_as_word_count() {
        let a = substrings("one two three", 5);
        let b = substrings("one two three", 3);
        assert_eq!(a, b);
    }

    #[test]
    fn substrings_empty_is_empty() {
        assert!(substrings("", 3).is_empty());
    }

    #[test]
    fn index_keys_nonempty_includes_every_singleton() {
        let datum = TimestampedDatum::new(
            "s",
            "dn",
            chrono::Utc::now(),
            "alpha beta gamma".as_bytes(),
        );
        let indexer = StringIndexer::new(2);
        let entries = indexer.index_keys(&datum, "blobkey");
        assert!(!entries.is_empty());
        for word in ["alpha", "beta", "gamma"] {
            assert!(entries.iter().any(|e| e.substring == word));
        }
    }
}
