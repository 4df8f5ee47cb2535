//! Data models for tickers, search matches, and price history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A known company in the ticker catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickerRecord {
    /// Canonical ticker symbol, uppercase (e.g., "NVDA")
    pub symbol: String,
    /// Canonical company name (e.g., "NVIDIA Corporation")
    pub name: String,
}

impl TickerRecord {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}

/// The immutable list of known tickers.
///
/// Symbols are unique, uppercase, and neither field is blank. Order is the
/// order of the source and only matters for deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    records: Vec<TickerRecord>,
}

impl Catalog {
    /// Build a catalog from raw records, returning it with the number of
    /// records dropped for blank fields or duplicate symbols.
    pub fn from_records(records: impl IntoIterator<Item = TickerRecord>) -> (Self, usize) {
        let mut seen = HashSet::new();
        let mut dropped = 0;
        let mut kept = Vec::new();

        for record in records {
            let symbol = record.symbol.trim().to_uppercase();
            let name = record.name.trim().to_string();

            if symbol.is_empty() || name.is_empty() || !seen.insert(symbol.clone()) {
                dropped += 1;
                continue;
            }

            kept.push(TickerRecord { symbol, name });
        }

        (Self { records: kept }, dropped)
    }

    pub fn records(&self) -> &[TickerRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TickerRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Company names in catalog order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// Same set of (symbol, name) pairs, ignoring order.
    #[cfg(test)]
    pub fn same_records(&self, other: &Catalog) -> bool {
        let ours: HashSet<&TickerRecord> = self.records.iter().collect();
        let theirs: HashSet<&TickerRecord> = other.records.iter().collect();
        ours == theirs
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a TickerRecord;
    type IntoIter = std::slice::Iter<'a, TickerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Field of a record that a query can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Symbol,
    Name,
}

impl std::fmt::Display for MatchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchField::Symbol => write!(f, "symbol"),
            MatchField::Name => write!(f, "name"),
        }
    }
}

/// Inclusive range of character (not byte) positions within a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

impl MatchSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A catalog record that survived a fuzzy search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    /// The matched record
    pub record: TickerRecord,
    /// Best score across fields, 0 is a perfect match
    pub score: f64,
    /// Highlight spans within the symbol, empty if the symbol did not match
    pub symbol_spans: Vec<MatchSpan>,
    /// Highlight spans within the name, empty if the name did not match
    pub name_spans: Vec<MatchSpan>,
}

impl MatchCandidate {
    pub fn spans(&self, field: MatchField) -> &[MatchSpan] {
        match field {
            MatchField::Symbol => &self.symbol_spans,
            MatchField::Name => &self.name_spans,
        }
    }
}

/// The (symbol, name) pair a user ends up choosing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSelection {
    pub symbol: String,
    pub name: String,
}

impl From<TickerRecord> for ResolvedSelection {
    fn from(record: TickerRecord) -> Self {
        Self {
            symbol: record.symbol,
            name: record.name,
        }
    }
}

impl std::fmt::Display for ResolvedSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.symbol)
    }
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a series over its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// A resolved company with its price history, ready to chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChart {
    #[serde(rename = "ticker")]
    pub symbol: String,
    pub company_name: String,
    pub days: u32,
    #[serde(rename = "chartData")]
    pub series: Vec<PriceBar>,
}

impl StockChart {
    pub fn first_close(&self) -> Option<f64> {
        self.series.first().map(|b| b.close)
    }

    pub fn last_close(&self) -> Option<f64> {
        self.series.last().map(|b| b.close)
    }

    /// Percentage change from first to last close, 0 with fewer than two bars.
    pub fn percent_change(&self) -> f64 {
        if self.series.len() < 2 {
            return 0.0;
        }
        match (self.first_close(), self.last_close()) {
            (Some(first), Some(last)) if first != 0.0 => (last - first) / first * 100.0,
            _ => 0.0,
        }
    }

    pub fn trend(&self) -> Trend {
        let change = self.percent_change();
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    /// Lowest and highest close in the window.
    pub fn close_range(&self) -> Option<(f64, f64)> {
        let mut closes = self.series.iter().map(|b| b.close);
        let first = closes.next()?;
        Some(closes.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    fn chart(closes: &[f64]) -> StockChart {
        StockChart {
            symbol: "NVDA".to_string(),
            company_name: "NVIDIA Corporation".to_string(),
            days: closes.len() as u32,
            series: closes
                .iter()
                .enumerate()
                .map(|(i, c)| bar(i as u32 + 1, *c))
                .collect(),
        }
    }

    #[test]
    fn test_catalog_drops_blank_and_duplicate_records() {
        let (catalog, dropped) = Catalog::from_records(vec![
            TickerRecord::new("aapl", "Apple Inc."),
            TickerRecord::new("  ", "Nameless Corp"),
            TickerRecord::new("MSFT", "   "),
            TickerRecord::new("AAPL", "Apple Again"),
            TickerRecord::new(" nvda ", " NVIDIA Corporation "),
        ]);

        assert_eq!(dropped, 3);
        assert_eq!(
            catalog.records(),
            &[
                TickerRecord::new("AAPL", "Apple Inc."),
                TickerRecord::new("NVDA", "NVIDIA Corporation"),
            ]
        );
    }

    #[test]
    fn test_same_records_ignores_order() {
        let (a, _) = Catalog::from_records(vec![
            TickerRecord::new("AAPL", "Apple Inc."),
            TickerRecord::new("MSFT", "Microsoft Corp"),
        ]);
        let (b, _) = Catalog::from_records(vec![
            TickerRecord::new("MSFT", "Microsoft Corp"),
            TickerRecord::new("AAPL", "Apple Inc."),
        ]);
        assert!(a.same_records(&b));
    }

    #[test]
    fn test_selection_display() {
        let selection = ResolvedSelection::from(TickerRecord::new("NVDA", "NVIDIA Corporation"));
        assert_eq!(selection.to_string(), "NVIDIA Corporation (NVDA)");
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(chart(&[100.0, 110.0]).percent_change(), 10.0);
        assert_eq!(chart(&[100.0, 90.0]).trend(), Trend::Down);
        assert_eq!(chart(&[100.0]).percent_change(), 0.0);
        assert_eq!(chart(&[]).trend(), Trend::Flat);
    }

    #[test]
    fn test_close_range() {
        assert_eq!(chart(&[5.0, 2.0, 9.0]).close_range(), Some((2.0, 9.0)));
        assert_eq!(chart(&[]).close_range(), None);
    }

    #[test]
    fn test_chart_serializes_like_api() {
        let json = serde_json::to_value(chart(&[1.0])).unwrap();
        assert_eq!(json["ticker"], "NVDA");
        assert_eq!(json["companyName"], "NVIDIA Corporation");
        assert_eq!(json["chartData"][0]["date"], "2024-01-01");
    }
}
