//! Core data models for the chat assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//
// ================= Conversation =================
//

/// One user-message/agent-response exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub user_message: String,
    pub agent_response: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, agent_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            agent_response: agent_response.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Client-supplied history item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role.eq_ignore_ascii_case("user")
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}
