//! Agent runtime interface
//!
//! The conversation core only needs three things from the runtime that
//! actually executes the LLM agent: create a stateful session context,
//! create a runner bound to an agent definition, and stream events back
//! for a prompt.

use crate::agents::AgentDefinition;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub mod gemini;
pub use gemini::GeminiRuntime;

/// Runtime-owned conversation state handle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// One piece of a runner event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPart {
    Text(String),
    ToolCall { name: String, args: Value },
    ToolResult { name: String, response: Value },
}

/// A (possibly partial) event emitted while the runner works on a prompt
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerEvent {
    pub author: String,
    pub parts: Vec<EventPart>,
}

impl RunnerEvent {
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            parts: vec![EventPart::Text(text.into())],
        }
    }

    /// Plain-text fragments, skipping tool traffic
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            EventPart::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }
}

pub type EventStream = BoxStream<'static, Result<RunnerEvent>>;

/// Executes an agent against prompts for one session context
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, context: &SessionContext, prompt: &str) -> Result<EventStream>;
}

/// Factory for session contexts and runners
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn create_session(&self, app_name: &str, user_id: &str) -> Result<SessionContext>;

    async fn create_runner(
        &self,
        agent: &AgentDefinition,
        context: &SessionContext,
    ) -> Result<Arc<dyn Runner>>;
}
