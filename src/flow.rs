//! User-facing flows: prompt → chart, and selection → chart.
//!
//! Every failure leaves here as a [`FlowError`]; callers only ever see that or
//! its `{ "error": ... }` envelope.

use crate::api::MarketData;
use crate::error::FlowError;
use crate::intent::IntentResolver;
use crate::models::{PriceBar, ResolvedSelection, StockChart};
use crate::resolver::TickerResolver;
use chrono::{Days, NaiveDate, Utc};

/// Prompt-driven lookup: intent resolver → exact resolver → market data.
pub struct IntentFlow<'a, I, M> {
    intent: &'a I,
    market: &'a M,
    resolver: &'a TickerResolver,
    catalog_names: &'a [&'a str],
}

impl<'a, I, M> IntentFlow<'a, I, M>
where
    I: IntentResolver,
    M: MarketData,
{
    pub fn new(
        intent: &'a I,
        market: &'a M,
        resolver: &'a TickerResolver,
        catalog_names: &'a [&'a str],
    ) -> Self {
        Self {
            intent,
            market,
            resolver,
            catalog_names,
        }
    }

    /// Resolve `prompt` to a company and fetch its history.
    pub async fn run(&self, prompt: &str) -> Result<StockChart, FlowError> {
        self.run_on(prompt, today()).await
    }

    async fn run_on(&self, prompt: &str, today: NaiveDate) -> Result<StockChart, FlowError> {
        let intent = self
            .intent
            .extract(prompt, self.catalog_names)
            .await?
            .ok_or(FlowError::Unprocessable)?;

        let not_found = || {
            tracing::info!(company = %intent.company_name, "company not in catalog");
            FlowError::CompanyNotFound(intent.company_name.clone())
        };
        let symbol = self
            .resolver
            .resolve_by_name(&intent.company_name)
            .ok_or_else(not_found)?;
        let name = self
            .resolver
            .resolve_by_symbol(symbol)
            .ok_or_else(not_found)?;

        let days = intent.days();
        tracing::info!(symbol, days, "prompt resolved");

        let selection = ResolvedSelection {
            symbol: symbol.to_string(),
            name: name.to_string(),
        };
        history_on(self.market, &selection, days, today).await
    }
}

/// Fetch the last `days` of history for an already chosen company.
pub async fn history<M: MarketData>(
    market: &M,
    selection: &ResolvedSelection,
    days: u32,
) -> Result<StockChart, FlowError> {
    history_on(market, selection, days, today()).await
}

async fn history_on<M: MarketData>(
    market: &M,
    selection: &ResolvedSelection,
    days: u32,
    today: NaiveDate,
) -> Result<StockChart, FlowError> {
    let from = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    let bars = market.daily_bars(&selection.symbol, from, today).await?;

    Ok(StockChart {
        symbol: selection.symbol.clone(),
        company_name: selection.name.clone(),
        days,
        series: last_n(bars, days as usize),
    })
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Keep only the most recent `n` bars.
fn last_n(mut bars: Vec<PriceBar>, n: usize) -> Vec<PriceBar> {
    if bars.len() > n {
        bars.drain(..bars.len() - n);
    }
    bars
}
