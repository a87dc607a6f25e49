//! Tool trait and registry
//!
//! Tools are what the agent runner may call while answering. Catalog tools
//! expose the financial data endpoints; failures come back as error objects
//! in the tool output so the agent can continue without the data.

use crate::catalog::FinancialDataApi;
use crate::error::AssistantError;
use crate::models::{ToolInput, ToolOutput};
use crate::request::RequestOutcome;
use crate::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for a single tool callable by the agent runner
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the accepted parameters
    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Look up `name` and run it.
    pub async fn execute(&self, name: &str, parameters: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AssistantError::ToolNotFound(name.to_string()))?;

        tool.execute(&ToolInput {
            tool_name: name.to_string(),
            parameters,
        })
        .await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Endpoints exposed to the agent as tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Quote,
    CompanyProfile,
    Search,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    KeyMetrics,
    FinancialRatios,
    HistoricalPrices,
    StockNews,
    MarketGainers,
    MarketLosers,
}

impl Endpoint {
    pub const ALL: [Endpoint; 12] = [
        Endpoint::Quote,
        Endpoint::CompanyProfile,
        Endpoint::Search,
        Endpoint::IncomeStatement,
        Endpoint::BalanceSheet,
        Endpoint::CashFlow,
        Endpoint::KeyMetrics,
        Endpoint::FinancialRatios,
        Endpoint::HistoricalPrices,
        Endpoint::StockNews,
        Endpoint::MarketGainers,
        Endpoint::MarketLosers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Quote => "get_quote",
            Endpoint::CompanyProfile => "get_company_profile",
            Endpoint::Search => "search_symbol",
            Endpoint::IncomeStatement => "get_income_statement",
            Endpoint::BalanceSheet => "get_balance_sheet",
            Endpoint::CashFlow => "get_cash_flow",
            Endpoint::KeyMetrics => "get_key_metrics",
            Endpoint::FinancialRatios => "get_financial_ratios",
            Endpoint::HistoricalPrices => "get_historical_prices",
            Endpoint::StockNews => "get_stock_news",
            Endpoint::MarketGainers => "get_market_gainers",
            Endpoint::MarketLosers => "get_market_losers",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Endpoint::Quote => "Real-time quote (price, change, volume, market cap) for a ticker",
            Endpoint::CompanyProfile => "Company profile: sector, industry, description, CEO",
            Endpoint::Search => "Search tickers by company name or partial symbol",
            Endpoint::IncomeStatement => "Income statements (annual or quarter)",
            Endpoint::BalanceSheet => "Balance sheet statements (annual or quarter)",
            Endpoint::CashFlow => "Cash flow statements (annual or quarter)",
            Endpoint::KeyMetrics => "Key metrics such as P/E, EV/EBITDA, ROE",
            Endpoint::FinancialRatios => "Financial ratios: liquidity, leverage, profitability",
            Endpoint::HistoricalPrices => "Daily historical prices, optionally between two dates",
            Endpoint::StockNews => "Latest news for one or more tickers",
            Endpoint::MarketGainers => "Top gaining stocks of the day",
            Endpoint::MarketLosers => "Top losing stocks of the day",
        }
    }

    fn parameters(self) -> Value {
        let symbol = json!({ "type": "string", "description": "Ticker symbol, e.g. AAPL" });
        let period = json!({ "type": "string", "enum": ["annual", "quarter"] });
        let limit = json!({ "type": "integer", "description": "Maximum number of records" });

        match self {
            Endpoint::Quote | Endpoint::CompanyProfile => json!({
                "type": "object",
                "properties": { "symbol": symbol },
                "required": ["symbol"],
            }),
            Endpoint::Search => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": limit,
                    "exchange": { "type": "string", "description": "Exchange code, e.g. NASDAQ" },
                },
                "required": ["query"],
            }),
            Endpoint::IncomeStatement
            | Endpoint::BalanceSheet
            | Endpoint::CashFlow
            | Endpoint::KeyMetrics
            | Endpoint::FinancialRatios => json!({
                "type": "object",
                "properties": { "symbol": symbol, "period": period, "limit": limit },
                "required": ["symbol"],
            }),
            Endpoint::HistoricalPrices => json!({
                "type": "object",
                "properties": {
                    "symbol": symbol,
                    "from": { "type": "string", "description": "YYYY-MM-DD" },
                    "to": { "type": "string", "description": "YYYY-MM-DD" },
                },
                "required": ["symbol"],
            }),
            Endpoint::StockNews => json!({
                "type": "object",
                "properties": {
                    "tickers": { "type": "array", "items": { "type": "string" } },
                    "limit": limit,
                },
            }),
            Endpoint::MarketGainers | Endpoint::MarketLosers => json!({
                "type": "object",
                "properties": {},
            }),
        }
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() || input.parameters.is_null() {
        Ok(())
    } else {
        Err(AssistantError::InvalidToolInput(
            "tool_input must be a JSON object".to_string(),
        ))
    }
}

fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AssistantError::InvalidToolInput(format!("Expected '{}' in tool_input", key)))
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn optional_u32(params: &Value, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .and_then(|v| u32::try_from(v).ok())
}

fn string_list(params: &Value, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// One catalog endpoint exposed as a tool
pub struct CatalogTool {
    endpoint: Endpoint,
    api: Arc<FinancialDataApi>,
}

impl CatalogTool {
    pub fn new(endpoint: Endpoint, api: Arc<FinancialDataApi>) -> Self {
        Self { endpoint, api }
    }

    async fn call(&self, params: &Value) -> Result<RequestOutcome> {
        let api = &self.api;
        let outcome = match self.endpoint {
            Endpoint::Quote => api.quote(require_str(params, "symbol")?).await,
            Endpoint::CompanyProfile => api.company_profile(require_str(params, "symbol")?).await,
            Endpoint::Search => {
                api.search(
                    require_str(params, "query")?,
                    optional_u32(params, "limit"),
                    optional_str(params, "exchange"),
                )
                .await
            }
            Endpoint::IncomeStatement => {
                api.income_statement(
                    require_str(params, "symbol")?,
                    optional_str(params, "period"),
                    optional_u32(params, "limit"),
                )
                .await
            }
            Endpoint::BalanceSheet => {
                api.balance_sheet(
                    require_str(params, "symbol")?,
                    optional_str(params, "period"),
                    optional_u32(params, "limit"),
                )
                .await
            }
            Endpoint::CashFlow => {
                api.cash_flow(
                    require_str(params, "symbol")?,
                    optional_str(params, "period"),
                    optional_u32(params, "limit"),
                )
                .await
            }
            Endpoint::KeyMetrics => {
                api.key_metrics(
                    require_str(params, "symbol")?,
                    optional_str(params, "period"),
                    optional_u32(params, "limit"),
                )
                .await
            }
            Endpoint::FinancialRatios => {
                api.financial_ratios(
                    require_str(params, "symbol")?,
                    optional_str(params, "period"),
                    optional_u32(params, "limit"),
                )
                .await
            }
            Endpoint::HistoricalPrices => {
                api.historical_prices(
                    require_str(params, "symbol")?,
                    optional_str(params, "from"),
                    optional_str(params, "to"),
                )
                .await
            }
            Endpoint::StockNews => {
                api.stock_news(&string_list(params, "tickers"), optional_u32(params, "limit"))
                    .await
            }
            Endpoint::MarketGainers => api.market_gainers().await,
            Endpoint::MarketLosers => api.market_losers().await,
        };

        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl Tool for CatalogTool {
    fn name(&self) -> &'static str {
        self.endpoint.name()
    }

    fn description(&self) -> &'static str {
        self.endpoint.description()
    }

    fn parameters(&self) -> Value {
        self.endpoint.parameters()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        match self.call(&input.parameters).await? {
            Ok(data) => Ok(ToolOutput {
                success: true,
                data,
                error: None,
            }),
            Err(failure) => Ok(ToolOutput {
                success: false,
                data: failure.to_json(),
                error: Some(failure.to_string()),
            }),
        }
    }
}

/// Create a registry with every catalog endpoint.
pub fn create_default_registry(api: Arc<FinancialDataApi>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for endpoint in Endpoint::ALL {
        registry.register(Arc::new(CatalogTool::new(endpoint, api.clone())));
    }

    registry
}
