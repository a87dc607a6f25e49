//! Financial Chat Assistant
//!
//! A conversational assistant over a third-party financial data API:
//! - Resilient request client (retry, linear backoff, per-attempt timeout)
//! - Endpoint catalog exposed to the agent as tools
//! - Per-conversation sessions with bounded context windows
//! - Serialized access to a long-running agent runner
//!
//! FLOW:
//! MESSAGE → SESSION STORE → SESSION (CONTEXT → RUNNER → TURN) → RESPONSE

pub mod agents;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod request;
pub mod runner;
pub mod session;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use request::{RequestFailure, RequestOutcome, ResilientClient, RetryPolicy};
pub use session::{ConversationSession, SessionStore};

use std::sync::Arc;

/// Wire the production stack: request client → catalog tools → Gemini runtime → session store.
pub fn build_session_store(config: &config::AppConfig) -> SessionStore {
    let client = ResilientClient::with_policy(
        config.financial_api_key.clone(),
        config.retry_policy.clone(),
    );
    let api = Arc::new(catalog::FinancialDataApi::new(
        Arc::new(client),
        config.financial_api_base_url.clone(),
    ));
    let runtime = runner::GeminiRuntime::new(
        gemini::GeminiClient::with_base_url(
            config.gemini_api_key.clone(),
            config.gemini_base_url.clone(),
        ),
        tools::create_default_registry(api),
    );

    SessionStore::new(
        Arc::new(runtime),
        agents::financial_analyst(config.gemini_model.clone()),
        config.context_source,
    )
}
