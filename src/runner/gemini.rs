//! Gemini-backed agent runtime
//!
//! Keeps the model contents of each session context in memory, exposes the
//! agent's tools as function declarations and runs the call/execute loop,
//! emitting every model turn and tool result as a [`RunnerEvent`].

use super::{AgentRuntime, EventPart, EventStream, Runner, RunnerEvent, SessionContext};
use crate::agents::AgentDefinition;
use crate::error::AssistantError;
use crate::gemini::{
    Content, FunctionCall, FunctionDeclaration, GeminiClient, GenerateContentRequest,
    GenerationConfig, Part, ToolDeclarations,
};
use crate::tools::ToolRegistry;
use crate::Result;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on model calls per prompt
const MAX_MODEL_ROUNDS: usize = 8;

type SharedContents = Arc<Mutex<Vec<Content>>>;

/// How a run left the model rounds
enum RunEnd {
    Completed,
    /// The event stream was dropped before the run finished
    Abandoned,
}

pub struct GeminiRuntime {
    client: Arc<GeminiClient>,
    tools: Arc<ToolRegistry>,
    contents: RwLock<HashMap<Uuid, SharedContents>>,
}

impl GeminiRuntime {
    pub fn new(client: GeminiClient, tools: ToolRegistry) -> Self {
        Self {
            client: Arc::new(client),
            tools: Arc::new(tools),
            contents: RwLock::new(HashMap::new()),
        }
    }

    fn declarations(&self, agent: &AgentDefinition) -> Vec<FunctionDeclaration> {
        agent
            .tools
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(FunctionDeclaration {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters(),
                }),
                None => {
                    warn!(tool = %name, agent = %agent.name, "Agent references unknown tool");
                    None
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl AgentRuntime for GeminiRuntime {
    async fn create_session(&self, app_name: &str, user_id: &str) -> Result<SessionContext> {
        let context = SessionContext::new(app_name, user_id);
        self.contents
            .write()
            .await
            .insert(context.id, Arc::new(Mutex::new(Vec::new())));

        info!(context_id = %context.id, user_id, "Created runtime session context");
        Ok(context)
    }

    async fn create_runner(
        &self,
        agent: &AgentDefinition,
        context: &SessionContext,
    ) -> Result<Arc<dyn Runner>> {
        let contents = self
            .contents
            .read()
            .await
            .get(&context.id)
            .cloned()
            .ok_or_else(|| {
                AssistantError::SessionInitialization(format!(
                    "Unknown session context {}",
                    context.id
                ))
            })?;

        let declarations = self.declarations(agent);
        info!(
            agent = %agent.name,
            context_id = %context.id,
            tools = declarations.len(),
            "Created Gemini runner"
        );

        Ok(Arc::new(GeminiRunner {
            inner: Arc::new(RunnerInner {
                client: self.client.clone(),
                tools: self.tools.clone(),
                agent: agent.clone(),
                declarations,
                contents,
            }),
        }))
    }
}

struct RunnerInner {
    client: Arc<GeminiClient>,
    tools: Arc<ToolRegistry>,
    agent: AgentDefinition,
    declarations: Vec<FunctionDeclaration>,
    contents: SharedContents,
}

pub struct GeminiRunner {
    inner: Arc<RunnerInner>,
}

#[async_trait::async_trait]
impl Runner for GeminiRunner {
    async fn run(&self, context: &SessionContext, prompt: &str) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded();
        let inner = self.inner.clone();
        let prompt = prompt.to_string();
        let context_id = context.id;

        tokio::spawn(async move {
            if let Err(e) = inner.drive(prompt, &tx).await {
                warn!(context_id = %context_id, "Gemini run failed: {}", e);
                let _ = tx.unbounded_send(Err(e));
            }
        });

        Ok(rx.boxed())
    }
}

impl RunnerInner {
    async fn drive(&self, prompt: String, tx: &UnboundedSender<Result<RunnerEvent>>) -> Result<()> {
        let mut contents = self.contents.lock().await;
        let checkpoint = contents.len();
        contents.push(Content::user_text(prompt));

        // A failed or abandoned run is dropped so the next prompt starts from
        // a history without unanswered function calls
        match self.rounds(&mut contents, tx).await {
            Ok(RunEnd::Completed) => Ok(()),
            Ok(RunEnd::Abandoned) => {
                debug!("Event consumer dropped, discarding partial exchange");
                contents.truncate(checkpoint);
                Ok(())
            }
            Err(e) => {
                contents.truncate(checkpoint);
                Err(e)
            }
        }
    }

    async fn rounds(
        &self,
        contents: &mut Vec<Content>,
        tx: &UnboundedSender<Result<RunnerEvent>>,
    ) -> Result<RunEnd> {
        let tools = if self.declarations.is_empty() {
            vec![]
        } else {
            vec![ToolDeclarations {
                function_declarations: self.declarations.clone(),
            }]
        };

        for round in 1..=MAX_MODEL_ROUNDS {
            let request = GenerateContentRequest {
                contents: contents.clone(),
                system_instruction: Some(Content::system(self.agent.instruction.clone())),
                tools: tools.clone(),
                generation_config: GenerationConfig::default(),
            };

            let response = self
                .client
                .generate_content(&self.agent.model, &request)
                .await?;

            let mut content = response
                .candidates
                .into_iter()
                .next()
                .map(|candidate| candidate.content)
                .ok_or_else(|| AssistantError::LlmError("No candidates in Gemini response".into()))?;
            content.role = Some("model".to_string());

            let calls: Vec<FunctionCall> = content
                .parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();

            let event = RunnerEvent {
                author: self.agent.name.clone(),
                parts: content.parts.iter().filter_map(to_event_part).collect(),
            };
            contents.push(content);

            if tx.unbounded_send(Ok(event)).is_err() {
                return Ok(RunEnd::Abandoned);
            }

            if calls.is_empty() {
                return Ok(RunEnd::Completed);
            }

            debug!(round, calls = calls.len(), "Executing tool calls");

            let mut response_parts = Vec::with_capacity(calls.len());
            let mut event_parts = Vec::with_capacity(calls.len());
            for call in calls {
                let output = self.call_tool(&call).await;
                event_parts.push(EventPart::ToolResult {
                    name: call.name.clone(),
                    response: output.clone(),
                });
                response_parts.push(Part::function_response(call.name, output));
            }

            contents.push(Content {
                role: Some("user".to_string()),
                parts: response_parts,
            });

            let event = RunnerEvent {
                author: self.agent.name.clone(),
                parts: event_parts,
            };
            if tx.unbounded_send(Ok(event)).is_err() {
                return Ok(RunEnd::Abandoned);
            }
        }

        warn!(
            agent = %self.agent.name,
            rounds = MAX_MODEL_ROUNDS,
            "Stopped after max model rounds"
        );
        Ok(RunEnd::Completed)
    }

    async fn call_tool(&self, call: &FunctionCall) -> serde_json::Value {
        if !self.agent.tools.iter().any(|t| t == &call.name) {
            warn!(tool = %call.name, "Model requested undeclared tool");
            return json!({ "success": false, "error": format!("Tool not available: {}", call.name) });
        }

        match self.tools.execute(&call.name, call.args.clone()).await {
            Ok(output) => serde_json::to_value(output).unwrap_or_else(|e| {
                json!({ "success": false, "error": format!("Unserializable tool output: {}", e) })
            }),
            Err(e) => {
                warn!(tool = %call.name, "Tool execution failed: {}", e);
                json!({ "success": false, "error": e.to_string() })
            }
        }
    }
}

fn to_event_part(part: &Part) -> Option<EventPart> {
    if let Some(call) = &part.function_call {
        return Some(EventPart::ToolCall {
            name: call.name.clone(),
            args: call.args.clone(),
        });
    }
    part.text.clone().map(EventPart::Text)
}
