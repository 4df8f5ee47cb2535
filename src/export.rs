//! Output of one-shot command results.
//!
//! Plain text for people, CSV and JSON for scripts. JSON mirrors the serde
//! shapes of the models, so a chart comes out as `{ticker, companyName, days,
//! chartData}` and an error as `{"error": "..."}`.

use crate::cli::ExportFormat;
use crate::error::ErrorEnvelope;
use crate::models::{MatchCandidate, MatchField, MatchSpan, StockChart, Trend};
use crate::ui::highlight_segments;
use num_format::{Locale, ToFormattedString};
use serde::Serialize;

/// What the `catalog` command reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub source: String,
    pub records: usize,
    /// "hit", "miss", "refreshed", or "disabled"
    pub cache: String,
}

/// Export ranked search results.
pub fn export_candidates(
    candidates: &[MatchCandidate],
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Text => Ok(candidates_text(candidates)),
        ExportFormat::Csv => Ok(candidates_csv(candidates)),
        ExportFormat::Json => json(&candidates),
    }
}

/// Export a chart's series and summary.
pub fn export_chart(chart: &StockChart, format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Text => Ok(chart_text(chart)),
        ExportFormat::Csv => Ok(chart_csv(chart)),
        ExportFormat::Json => json(chart),
    }
}

pub fn export_catalog(summary: &CatalogSummary, format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Text => Ok(format!(
            "{} tickers from {} (cache: {})\n",
            summary.records.to_formatted_string(&Locale::en),
            summary.source,
            summary.cache
        )),
        ExportFormat::Csv => Ok(format!(
            "Source,Records,Cache\n{},{},{}\n",
            csv_field(&summary.source),
            summary.records,
            summary.cache
        )),
        ExportFormat::Json => json(summary),
    }
}

/// Export a flow error envelope.
pub fn export_error(envelope: &ErrorEnvelope, format: ExportFormat) -> String {
    match format {
        ExportFormat::Text => format!("Error: {}\n", envelope.error),
        ExportFormat::Csv => format!("Error\n{}\n", csv_field(&envelope.error)),
        ExportFormat::Json => {
            serde_json::to_string(envelope).unwrap_or_else(|_| String::from(r#"{"error":""}"#)) + "\n"
        }
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value).map(|s| s + "\n")
}

fn candidates_text(candidates: &[MatchCandidate]) -> String {
    if candidates.is_empty() {
        return "No matches\n".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!("{:<8} {:<40} {:>6}\n", "SYMBOL", "NAME", "SCORE"));
    output.push_str(&format!("{}\n", "-".repeat(56)));

    for candidate in candidates {
        output.push_str(&format!(
            "{:<8} {:<40} {:>6.3}\n",
            bracket_spans(&candidate.record.symbol, candidate.spans(MatchField::Symbol)),
            bracket_spans(&candidate.record.name, candidate.spans(MatchField::Name)),
            candidate.score
        ));
    }

    output
}

/// Wrap matched ranges in brackets, e.g. `[NVIDIA] Corporation`.
fn bracket_spans(text: &str, spans: &[MatchSpan]) -> String {
    highlight_segments(text, spans)
        .into_iter()
        .map(|(segment, matched)| {
            if matched {
                format!("[{}]", segment)
            } else {
                segment
            }
        })
        .collect()
}

fn candidates_csv(candidates: &[MatchCandidate]) -> String {
    let mut output = String::new();
    output.push_str("Symbol,Name,Score,SymbolSpans,NameSpans\n");

    for candidate in candidates {
        output.push_str(&format!(
            "{},{},{:.3},{},{}\n",
            csv_field(&candidate.record.symbol),
            csv_field(&candidate.record.name),
            candidate.score,
            spans_field(&candidate.symbol_spans),
            spans_field(&candidate.name_spans),
        ));
    }

    output
}

/// `0-5;8-12`
fn spans_field(spans: &[MatchSpan]) -> String {
    spans
        .iter()
        .map(|s| format!("{}-{}", s.start, s.end))
        .collect::<Vec<_>>()
        .join(";")
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn chart_text(chart: &StockChart) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} ({}), last {} days\n",
        chart.company_name, chart.symbol, chart.days
    ));

    match (chart.first_close(), chart.last_close(), chart.close_range()) {
        (Some(first), Some(last), Some((low, high))) => {
            let arrow = match chart.trend() {
                Trend::Up => "▲",
                Trend::Down => "▼",
                Trend::Flat => "=",
            };
            output.push_str(&format!(
                "First: {}  Last: {}  Change: {} {:+.2}%\n",
                format_price(first),
                format_price(last),
                arrow,
                chart.percent_change()
            ));
            output.push_str(&format!(
                "Low: {}  High: {}  Bars: {}\n\n",
                format_price(low),
                format_price(high),
                chart.series.len()
            ));
        }
        _ => {
            output.push_str("No price data in this window\n");
            return output;
        }
    }

    output.push_str(&format!(
        "{:<10} {:>12} {:>12} {:>12} {:>12} {:>10}\n",
        "DATE", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
    ));
    for bar in &chart.series {
        output.push_str(&format!(
            "{:<10} {:>12} {:>12} {:>12} {:>12} {:>10}\n",
            bar.date.format("%Y-%m-%d"),
            format_price(bar.open),
            format_price(bar.high),
            format_price(bar.low),
            format_price(bar.close),
            format_volume(bar.volume),
        ));
    }

    output
}

fn chart_csv(chart: &StockChart) -> String {
    let mut output = String::new();
    output.push_str("Date,Open,High,Low,Close,Volume\n");

    for bar in &chart.series {
        output.push_str(&format!(
            "{},{:.4},{:.4},{:.4},{:.4},{}\n",
            bar.date.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }

    output
}

/// Format price with appropriate precision.
pub fn format_price(price: f64) -> String {
    if price >= 1.0 {
        format!("${:.2}", price)
    } else {
        format!("${:.6}", price)
    }
}

/// Format volume with K/M/B suffixes.
pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        format!("{:.1}B", volume / 1_000_000_000.0)
    } else if volume >= 1_000_000.0 {
        format!("{:.1}M", volume / 1_000_000.0)
    } else if volume >= 1_000.0 {
        format!("{:.1}K", volume / 1_000.0)
    } else if volume > 0.0 {
        (volume.round() as u64).to_formatted_string(&Locale::en)
    } else {
        "0".to_string()
    }
}
