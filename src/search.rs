//! Fuzzy search over the ticker catalog.
//!
//! Every record is matched on its symbol and its name independently. A
//! record's score is its better field score; records whose fields all miss
//! the threshold are left out. Results are ordered by score, then by shorter
//! symbol, then by catalog order, and capped at the requested limit.

use crate::bitap::{self, Pattern};
use crate::models::{Catalog, MatchCandidate, TickerRecord};
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

/// Worst score a field may have and still count as a match.
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Suggestions shown by the interactive search.
pub const DEFAULT_LIMIT: usize = 10;

struct IndexedRecord {
    record: TickerRecord,
    symbol: Vec<char>,
    name: Vec<char>,
}

/// Read-only search index built from one catalog snapshot.
pub struct SearchIndex {
    entries: Vec<IndexedRecord>,
    threshold: f64,
}

impl SearchIndex {
    pub fn build(catalog: &Catalog, threshold: f64) -> Self {
        let entries = catalog
            .iter()
            .map(|record| IndexedRecord {
                symbol: bitap::fold(&record.symbol),
                name: bitap::fold(&record.name),
                record: record.clone(),
            })
            .collect();

        Self { entries, threshold }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Ranked candidates for `query`, at most `limit` of them.
    pub fn search(&self, query: &str, limit: usize) -> Vec<MatchCandidate> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let pattern = Pattern::new(query, self.threshold);
        let mut ranked: Vec<(usize, MatchCandidate)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                self.candidate(&pattern, entry).map(|c| (position, c))
            })
            .collect();

        ranked.sort_by(|(pa, a), (pb, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.symbol.len().cmp(&b.record.symbol.len()))
                .then_with(|| pa.cmp(pb))
        });
        ranked.truncate(limit);

        ranked.into_iter().map(|(_, c)| c).collect()
    }

    fn candidate(&self, pattern: &Pattern, entry: &IndexedRecord) -> Option<MatchCandidate> {
        let symbol = pattern
            .search(&entry.symbol)
            .filter(|m| m.score <= self.threshold);
        let name = pattern
            .search(&entry.name)
            .filter(|m| m.score <= self.threshold);

        let score = match (&symbol, &name) {
            (Some(s), Some(n)) => s.score.min(n.score),
            (Some(s), None) => s.score,
            (None, Some(n)) => n.score,
            (None, None) => return None,
        };

        Some(MatchCandidate {
            record: entry.record.clone(),
            score,
            symbol_spans: symbol.map(|m| m.spans).unwrap_or_default(),
            name_spans: name.map(|m| m.spans).unwrap_or_default(),
        })
    }
}

/// Owns the current index and swaps in a fresh one when the catalog changes.
///
/// Searches take a snapshot of the index, so a rebuild never blocks or
/// disturbs a search already in flight.
pub struct SearchService {
    index: RwLock<Arc<SearchIndex>>,
    threshold: f64,
    limit: usize,
}

impl SearchService {
    pub fn init(catalog: &Catalog, threshold: f64, limit: usize) -> Self {
        let index = SearchIndex::build(catalog, threshold);
        tracing::info!(records = index.len(), threshold, limit, "search index built");

        Self {
            index: RwLock::new(Arc::new(index)),
            threshold,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current index snapshot.
    pub fn snapshot(&self) -> Arc<SearchIndex> {
        let guard = self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Search with the configured limit.
    pub fn search(&self, query: &str) -> Vec<MatchCandidate> {
        self.search_with_limit(query, self.limit)
    }

    pub fn search_with_limit(&self, query: &str, limit: usize) -> Vec<MatchCandidate> {
        let results = self.snapshot().search(query, limit);
        tracing::debug!(query, results = results.len(), "fuzzy search");
        results
    }

    /// Replace the index with one built from `catalog`.
    pub fn rebuild(&self, catalog: &Catalog) {
        let index = Arc::new(SearchIndex::build(catalog, self.threshold));
        tracing::info!(records = index.len(), "search index rebuilt");

        let mut guard = self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = index;
    }
}
