//! Conversation sessions
//!
//! A process-wide store maps caller-supplied conversation ids to sessions.
//! Each session owns its authoritative turn log and lazily creates the
//! runtime session context and runner it talks to. Calls into one session
//! are serialized; different sessions run independently.

pub mod context;

#[cfg(test)]
pub(crate) mod testing;

pub use context::ContextSource;

use crate::agents::AgentDefinition;
use crate::error::AssistantError;
use crate::models::{ConversationTurn, HistoryEntry};
use crate::runner::{AgentRuntime, EventPart, Runner, SessionContext};
use crate::Result;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info};

pub const APP_NAME: &str = "financial_chat_assistant";

/// Returned when the runner produced no text at all
pub const FALLBACK_RESPONSE: &str =
    "Mi dispiace, non sono riuscito a generare una risposta. Prova a riformulare la domanda.";

/// Returned when anything fails while processing a message
pub const ERROR_RESPONSE: &str =
    "Mi dispiace, si è verificato un errore durante l'elaborazione della tua richiesta. Riprova più tardi.";

fn init_failure(e: AssistantError) -> AssistantError {
    match e {
        AssistantError::SessionInitialization(_) => e,
        other => AssistantError::SessionInitialization(other.to_string()),
    }
}

fn runner_failure(e: AssistantError) -> AssistantError {
    match e {
        AssistantError::RunnerInvocation(_) => e,
        other => AssistantError::RunnerInvocation(other.to_string()),
    }
}

/// One logical chat
pub struct ConversationSession {
    id: String,
    agent: Arc<AgentDefinition>,
    runtime: Arc<dyn AgentRuntime>,
    context_source: ContextSource,
    context: OnceCell<SessionContext>,
    runner: OnceCell<Arc<dyn Runner>>,
    turns: RwLock<Vec<ConversationTurn>>,
    gate: Mutex<()>,
}

impl ConversationSession {
    pub fn new(
        id: impl Into<String>,
        agent: Arc<AgentDefinition>,
        runtime: Arc<dyn AgentRuntime>,
        context_source: ContextSource,
    ) -> Self {
        Self {
            id: id.into(),
            agent,
            runtime,
            context_source,
            context: OnceCell::new(),
            runner: OnceCell::new(),
            turns: RwLock::new(Vec::new()),
            gate: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the authoritative turn log
    pub async fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.read().await.clone()
    }

    pub async fn turn_count(&self) -> usize {
        self.turns.read().await.len()
    }

    /// Create the runtime session context on first use.
    pub async fn ensure_context(&self) -> Result<&SessionContext> {
        self.context
            .get_or_try_init(|| async {
                let context = self
                    .runtime
                    .create_session(APP_NAME, &self.id)
                    .await
                    .map_err(init_failure)?;
                info!(session_id = %self.id, context_id = %context.id, "Session context initialized");
                Ok::<_, AssistantError>(context)
            })
            .await
    }

    /// Create the runner, bound to this session's context, on first use.
    pub async fn ensure_runner(&self) -> Result<Arc<dyn Runner>> {
        let context = self.ensure_context().await?;

        let runner = self
            .runner
            .get_or_try_init(|| async {
                let runner = self
                    .runtime
                    .create_runner(&self.agent, context)
                    .await
                    .map_err(init_failure)?;
                info!(session_id = %self.id, agent = %self.agent.name, "Runner initialized");
                Ok::<_, AssistantError>(runner)
            })
            .await?;

        Ok(runner.clone())
    }

    /// Answer `message`. Never fails: errors become [`ERROR_RESPONSE`].
    pub async fn process_input(&self, message: &str, history: Option<&[HistoryEntry]>) -> String {
        let _turn = self.gate.lock().await;

        match self.respond(message, history).await {
            Ok(response) => response,
            Err(e) => {
                error!(session_id = %self.id, "Failed to process input: {}", e);
                ERROR_RESPONSE.to_string()
            }
        }
    }

    async fn respond(&self, message: &str, history: Option<&[HistoryEntry]>) -> Result<String> {
        let runner = self.ensure_runner().await?;
        let context = self.ensure_context().await?;
        let prompt = self.effective_prompt(message, history).await;

        debug!(session_id = %self.id, prompt_len = prompt.len(), "Invoking runner");

        let mut events = runner.run(context, &prompt).await.map_err(runner_failure)?;
        let mut fragments: Vec<String> = Vec::new();

        while let Some(event) = events.next().await {
            let event = event.map_err(runner_failure)?;
            for part in &event.parts {
                match part {
                    EventPart::ToolCall { name, .. } => {
                        debug!(session_id = %self.id, tool = %name, "Runner called tool");
                    }
                    EventPart::ToolResult { name, .. } => {
                        debug!(session_id = %self.id, tool = %name, "Runner received tool result");
                    }
                    EventPart::Text(_) => {}
                }
            }
            fragments.extend(
                event
                    .text_fragments()
                    .filter(|text| !text.trim().is_empty())
                    .map(str::to_string),
            );
        }

        let response = if fragments.is_empty() {
            FALLBACK_RESPONSE.to_string()
        } else {
            fragments.join("\n")
        };

        self.turns
            .write()
            .await
            .push(ConversationTurn::new(message, response.clone()));

        info!(session_id = %self.id, fragments = fragments.len(), "Turn recorded");
        Ok(response)
    }

    async fn effective_prompt(&self, message: &str, history: Option<&[HistoryEntry]>) -> String {
        let lines = match self.context_source {
            ContextSource::ClientHistory => {
                context::render_client_history(history.unwrap_or_default())
            }
            ContextSource::SessionLog => context::render_session_log(&self.turns.read().await),
        };

        context::build_prompt(message, &lines)
    }
}

type SessionSlot = Arc<OnceCell<Arc<ConversationSession>>>;

/// Registry of live conversation sessions, keyed by conversation id
pub struct SessionStore {
    runtime: Arc<dyn AgentRuntime>,
    agent: Arc<AgentDefinition>,
    context_source: ContextSource,
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        agent: AgentDefinition,
        context_source: ContextSource,
    ) -> Self {
        Self {
            runtime,
            agent: Arc::new(agent),
            context_source,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, session_id: &str) -> SessionSlot {
        {
            let sessions = self.sessions.read().await;
            if let Some(slot) = sessions.get(session_id) {
                return slot.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the session for `session_id`, creating and initializing it once.
    ///
    /// Concurrent first calls for the same id share a single initialization.
    /// A failed initialization leaves the id free for a later attempt.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<ConversationSession>> {
        let slot = self.slot(session_id).await;

        let session = slot
            .get_or_try_init(|| async {
                let session = Arc::new(ConversationSession::new(
                    session_id,
                    self.agent.clone(),
                    self.runtime.clone(),
                    self.context_source,
                ));
                session.ensure_context().await?;
                info!(session_id, "Created conversation session");
                Ok::<_, AssistantError>(session)
            })
            .await?;

        Ok(session.clone())
    }

    /// Existing session, if one was fully created
    pub async fn get(&self, session_id: &str) -> Option<Arc<ConversationSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).and_then(|slot| slot.get().cloned())
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
