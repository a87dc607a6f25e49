//! Error types for the financial chat assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Session Layer Errors
    // =============================

    #[error("Session initialization failed: {0}")]
    SessionInitialization(String),

    #[error("Runner invocation failed: {0}")]
    RunnerInvocation(String),

    // =============================
    // Tool / Runtime Errors
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
