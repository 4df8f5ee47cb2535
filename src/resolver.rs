//! Strict name ↔ symbol lookup over the catalog.
//!
//! Matching is exact after trimming and lower-casing. Anything fuzzier
//! belongs to [`crate::search`].

use crate::models::{Catalog, TickerRecord};
use std::collections::HashMap;

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Exact resolver built once from a catalog snapshot.
#[derive(Debug, Default)]
pub struct TickerResolver {
    by_name: HashMap<String, TickerRecord>,
    by_symbol: HashMap<String, TickerRecord>,
}

impl TickerResolver {
    pub fn new(catalog: &Catalog) -> Self {
        let mut by_name = HashMap::with_capacity(catalog.len());
        let mut by_symbol = HashMap::with_capacity(catalog.len());

        for record in catalog {
            // Two companies sharing a name: the first listed wins.
            by_name
                .entry(normalize(&record.name))
                .or_insert_with(|| record.clone());
            by_symbol.insert(normalize(&record.symbol), record.clone());
        }

        Self { by_name, by_symbol }
    }

    /// Symbol for a company name, case-insensitive.
    pub fn resolve_by_name(&self, name: &str) -> Option<&str> {
        self.record_by_name(name).map(|r| r.symbol.as_str())
    }

    /// Company name for a symbol, case-insensitive.
    pub fn resolve_by_symbol(&self, symbol: &str) -> Option<&str> {
        self.record_by_symbol(symbol).map(|r| r.name.as_str())
    }

    fn record_by_name(&self, name: &str) -> Option<&TickerRecord> {
        self.by_name.get(&normalize(name))
    }

    fn record_by_symbol(&self, symbol: &str) -> Option<&TickerRecord> {
        self.by_symbol.get(&normalize(symbol))
    }
}
