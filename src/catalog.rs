//! Endpoint catalog for the financial data provider
//!
//! Thin URL builders over [`ResilientClient::fetch`]. Each method maps to one
//! upstream path; optional parameters are appended only when present.

use crate::request::{RequestFailure, RequestOutcome, ResilientClient};
use reqwest::Url;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// Generated-style client over the provider's REST surface
#[derive(Clone)]
pub struct FinancialDataApi {
    client: Arc<ResilientClient>,
    base_url: String,
}

impl FinancialDataApi {
    pub fn new(client: Arc<ResilientClient>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full URL for `path` with the present optional parameters.
    pub fn endpoint_url(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> std::result::Result<String, RequestFailure> {
        let pairs = params
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (*key, v.as_str())));

        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse_with_params(&raw, pairs).map_err(|e| {
            RequestFailure::NetworkError {
                message: format!("Invalid URL {}: {}", raw, e),
            }
        })?;

        // `parse_with_params` leaves a dangling `?` when every parameter is absent
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url.to_string())
    }

    async fn get(&self, path: &str, params: &[(&str, Option<String>)]) -> RequestOutcome {
        let url = self.endpoint_url(path, params)?;
        self.client.fetch(&url).await
    }

    // =============================
    // Quotes & Profiles
    // =============================

    pub async fn quote(&self, symbol: &str) -> RequestOutcome {
        self.get(&format!("quote/{}", symbol), &[]).await
    }

    pub async fn company_profile(&self, symbol: &str) -> RequestOutcome {
        self.get(&format!("profile/{}", symbol), &[]).await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<u32>,
        exchange: Option<&str>,
    ) -> RequestOutcome {
        self.get(
            "search",
            &[
                ("query", Some(query.to_string())),
                ("limit", limit.map(|l| l.to_string())),
                ("exchange", exchange.map(str::to_string)),
            ],
        )
        .await
    }

    // =============================
    // Financial Statements
    // =============================

    pub async fn income_statement(
        &self,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.statement("income-statement", symbol, period, limit).await
    }

    pub async fn balance_sheet(
        &self,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.statement("balance-sheet-statement", symbol, period, limit)
            .await
    }

    pub async fn cash_flow(
        &self,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.statement("cash-flow-statement", symbol, period, limit)
            .await
    }

    pub async fn key_metrics(
        &self,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.statement("key-metrics", symbol, period, limit).await
    }

    pub async fn financial_ratios(
        &self,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.statement("ratios", symbol, period, limit).await
    }

    async fn statement(
        &self,
        kind: &str,
        symbol: &str,
        period: Option<&str>,
        limit: Option<u32>,
    ) -> RequestOutcome {
        self.get(
            &format!("{}/{}", kind, symbol),
            &[
                ("period", period.map(str::to_string)),
                ("limit", limit.map(|l| l.to_string())),
            ],
        )
        .await
    }

    // =============================
    // Prices, News & Movers
    // =============================

    pub async fn historical_prices(
        &self,
        symbol: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> RequestOutcome {
        self.get(
            &format!("historical-price-full/{}", symbol),
            &[
                ("from", from.map(str::to_string)),
                ("to", to.map(str::to_string)),
            ],
        )
        .await
    }

    pub async fn stock_news(&self, tickers: &[String], limit: Option<u32>) -> RequestOutcome {
        let tickers = (!tickers.is_empty()).then(|| tickers.join(","));
        self.get(
            "stock_news",
            &[("tickers", tickers), ("limit", limit.map(|l| l.to_string()))],
        )
        .await
    }

    pub async fn market_gainers(&self) -> RequestOutcome {
        self.get("stock_market/gainers", &[]).await
    }

    pub async fn market_losers(&self) -> RequestOutcome {
        self.get("stock_market/losers", &[]).await
    }
}
