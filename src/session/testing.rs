//! Scripted runtime double for session and API tests

use crate::agents::AgentDefinition;
use crate::error::AssistantError;
use crate::runner::{AgentRuntime, EventStream, Runner, RunnerEvent, SessionContext};
use crate::Result;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub(crate) enum Script {
    Events(Vec<RunnerEvent>),
    /// Emit the events, then a runner error
    FailAfter(Vec<RunnerEvent>),
    /// `run` itself fails
    Fail,
}

#[derive(Default)]
struct Counters {
    prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
}

pub(crate) struct ScriptedRuntime {
    script: Script,
    delay: Duration,
    fail_sessions: bool,
    counters: Arc<Counters>,
    pub sessions_created: AtomicUsize,
    pub runners_created: AtomicUsize,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedRuntime {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: Duration::ZERO,
            fail_sessions: false,
            counters: Arc::new(Counters::default()),
            sessions_created: AtomicUsize::new(0),
            runners_created: AtomicUsize::new(0),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Script::Events(vec![RunnerEvent::text("financial_analyst", text)]))
    }

    /// Delay applied to session creation and to every run
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn failing_sessions(mut self) -> Self {
        self.fail_sessions = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.counters
            .prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn create_session(&self, app_name: &str, user_id: &str) -> Result<SessionContext> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_sessions {
            return Err(AssistantError::LlmError("session service unavailable".into()));
        }
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionContext::new(app_name, user_id))
    }

    async fn create_runner(
        &self,
        _agent: &AgentDefinition,
        _context: &SessionContext,
    ) -> Result<Arc<dyn Runner>> {
        self.runners_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedRunner {
            script: self.script.clone(),
            delay: self.delay,
            counters: self.counters.clone(),
            max_in_flight: self.max_in_flight.clone(),
        }))
    }
}

struct ScriptedRunner {
    script: Script,
    delay: Duration,
    counters: Arc<Counters>,
    max_in_flight: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Runner for ScriptedRunner {
    async fn run(&self, _context: &SessionContext, prompt: &str) -> Result<EventStream> {
        if let Ok(mut prompts) = self.counters.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.script {
            Script::Events(events) => Ok(stream::iter(events.clone().into_iter().map(Ok)).boxed()),
            Script::FailAfter(events) => {
                let items: Vec<Result<RunnerEvent>> = events
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(std::iter::once(Err(AssistantError::LlmError(
                        "stream broke".into(),
                    ))))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            Script::Fail => Err(AssistantError::LlmError("runner exploded".into())),
        }
    }
}
