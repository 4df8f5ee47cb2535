//! Loading the ticker catalog from a JSON file or the catalog endpoint.
//!
//! Two shapes are accepted: the SEC-style keyed object
//! `{"0": {"cik_str": 1045810, "ticker": "NVDA", "title": "NVIDIA CORP"}, ...}`
//! and the endpoint's plain list `[{"symbol": "NVDA", "name": "NVIDIA Corp"}, ...]`.

use crate::api::{self, RetryPolicy};
use crate::error::{ApiError, CatalogError};
use crate::models::{Catalog, TickerRecord};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const SERVICE: &str = "catalog";

/// Where the catalog comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Url(String),
}

impl CatalogSource {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            CatalogSource::Url(source.to_string())
        } else {
            CatalogSource::File(PathBuf::from(source))
        }
    }

    /// Load the catalog, reading the file or fetching the URL.
    pub async fn load(&self, client: &Client, retry: RetryPolicy) -> Result<Catalog, CatalogError> {
        match self {
            CatalogSource::File(path) => load(path),
            CatalogSource::Url(url) => fetch(client, url, retry).await,
        }
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::File(path) => write!(f, "{}", path.display()),
            CatalogSource::Url(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCatalog {
    Keyed(HashMap<String, KeyedTicker>),
    List(Vec<TickerRecord>),
}

#[derive(Debug, Deserialize)]
struct KeyedTicker {
    ticker: String,
    title: String,
}

/// Parse catalog JSON. Records with blank fields or repeated symbols are
/// dropped and counted in the log, not treated as errors.
pub fn parse(json: &str) -> Result<Catalog, CatalogError> {
    let records = match serde_json::from_str::<RawCatalog>(json)? {
        RawCatalog::Keyed(entries) => {
            let mut entries: Vec<(String, KeyedTicker)> = entries.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| {
                match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => a.cmp(b),
                }
            });
            entries
                .into_iter()
                .map(|(_, t)| TickerRecord::new(t.ticker, t.title))
                .collect::<Vec<_>>()
        }
        RawCatalog::List(records) => records,
    };

    let (catalog, dropped) = Catalog::from_records(records);
    if dropped > 0 {
        tracing::warn!(dropped, kept = catalog.len(), "dropped blank or duplicate catalog records");
    }
    tracing::debug!(records = catalog.len(), "parsed ticker catalog");

    Ok(catalog)
}

/// Load the catalog from a JSON file.
pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content)
}

/// Fetch the catalog from the catalog endpoint.
pub async fn fetch(client: &Client, url: &str, retry: RetryPolicy) -> Result<Catalog, CatalogError> {
    let body = api::with_retry(SERVICE, retry, || async {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))?;
        let response = api::check_status(SERVICE, response).await?;
        response
            .text()
            .await
            .map_err(|e| ApiError::transport(SERVICE, e))
    })
    .await?;

    parse(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_keyed_catalog_in_key_order() {
        let json = r#"{
            "10": {"cik_str": 3, "ticker": "MSFT", "title": "Microsoft Corp"},
            "2": {"cik_str": 2, "ticker": "AAPL", "title": "Apple Inc."},
            "0": {"cik_str": 1, "ticker": "NVDA", "title": "NVIDIA Corporation"}
        }"#;

        let catalog = parse(json).unwrap();
        let symbols: Vec<&str> = catalog.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NVDA", "AAPL", "MSFT"]);
        assert_eq!(catalog.records()[0].name, "NVIDIA Corporation");
    }

    #[test]
    fn test_parse_list_catalog() {
        let json = r#"[{"symbol": "nvda", "name": "NVIDIA Corporation"}]"#;
        let catalog = parse(json).unwrap();
        assert_eq!(catalog.records(), &[TickerRecord::new("NVDA", "NVIDIA Corporation")]);
    }

    #[test]
    fn test_parse_drops_blank_records() {
        let json = r#"[
            {"symbol": "", "name": "Ghost Corp"},
            {"symbol": "MSFT", "name": "Microsoft Corp"},
            {"symbol": "MSFT", "name": "Microsoft Again"}
        ]"#;
        let catalog = parse(json).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_parse_empty_catalog() {
        assert!(parse("[]").unwrap().is_empty());
        assert!(parse("{}").unwrap().is_empty());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let json = r#"{"0": {"cik_str": 1, "ticker": "NVDA"}}"#;
        assert!(matches!(parse(json), Err(CatalogError::Malformed(_))));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(parse("not json"), Err(CatalogError::Malformed(_))));
        assert!(matches!(parse("42"), Err(CatalogError::Malformed(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/definitely/not/here/ticker-list.json")).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
        assert!(err.to_string().contains("ticker-list.json"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"symbol": "AAPL", "name": "Apple Inc."}}]"#).unwrap();
        let catalog = load(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(
            CatalogSource::parse("https://example.com/api/stocks"),
            CatalogSource::Url("https://example.com/api/stocks".to_string())
        );
        assert_eq!(
            CatalogSource::parse("ticker-list.json"),
            CatalogSource::File(PathBuf::from("ticker-list.json"))
        );
    }
}
