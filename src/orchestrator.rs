use anyhow::Result;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{AgentEvent, AgentRequest, AssistantResponse, ReasoningService};
use crate::config::AppConfig;
use crate::session::{ChatTurn, SessionManager};

/// Owns the conversation for one user session: loads persisted turns,
/// submits each new message to the reasoning service, and appends the
/// resulting turns back to the session. One request in flight at a time —
/// `submit` takes `&mut self`.
pub struct Orchestrator {
    cfg: AppConfig,
    reasoner: Arc<dyn ReasoningService>,
    pub sessions: SessionManager,
}

impl Orchestrator {
    pub fn new(
        cfg: AppConfig,
        reasoner: Arc<dyn ReasoningService>,
        sessions: SessionManager,
    ) -> Self {
        Self {
            cfg,
            reasoner,
            sessions,
        }
    }

    /// The persisted turns of the current session; silently empty when no
    /// session exists yet.
    pub fn load_history(&self) -> Vec<ChatTurn> {
        self.sessions.current_turns()
    }

    /// Build an `AgentRequest` from static configuration plus the given
    /// text and history and invoke the reasoning service. Tool sub-calls
    /// happen inside the service and surface only as events and traces.
    pub async fn submit(
        &mut self,
        user_text: &str,
        history: &[ChatTurn],
        events: Option<Sender<AgentEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<AssistantResponse> {
        let req = AgentRequest {
            input: user_text.to_string(),
            history: history.to_vec(),
            model: self.cfg.model.clone(),
            temperature: self.cfg.temperature,
        };
        debug!(model = %req.model, history = req.history.len(), "submitting request");
        let resp = self.reasoner.respond(req, events, cancel).await?;

        let tool_calls = resp.steps.len() as u64;
        for step in &resp.steps {
            let record = if step.ok {
                self.sessions.record_tool_call_success(&step.name)
            } else {
                self.sessions.record_tool_call_failure(&step.name)
            };
            if let Err(e) = record {
                warn!(?e, "failed to record tool call outcome");
            }
        }
        self.sessions.record_usage(0, tool_calls)?;
        Ok(resp)
    }

    /// Append a turn to the session and persist it.
    pub fn append_and_persist(&mut self, turn: ChatTurn) -> Result<()> {
        self.sessions.append_turn(turn)
    }

    /// One full interaction: submit against the current history, then
    /// persist the user turn and the assistant turn in order.
    pub async fn run_turn(
        &mut self,
        user_text: &str,
        events: Option<Sender<AgentEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<AssistantResponse> {
        let history = self.load_history();
        let resp = self.submit(user_text, &history, events, cancel).await?;
        self.append_and_persist(ChatTurn::user(user_text))?;
        self.append_and_persist(ChatTurn::assistant(resp.content.clone()))?;
        Ok(resp)
    }

    pub fn record_token_usage(&mut self, tokens: u64) {
        if tokens > 0
            && let Some(ref mut session) = self.sessions.current_session
        {
            session.increment_token_count(tokens);
            if let Err(e) = self.sessions.store.save(session) {
                warn!(?e, "failed to persist token usage");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolTrace;
    use crate::config::{AppConfig, LlmConfig, LookupConfig};
    use crate::session::Role;
    use async_trait::async_trait;
    use tempfile::tempdir;

    fn test_cfg() -> AppConfig {
        AppConfig {
            base_url: "http://localhost:0".into(),
            model: "test-model".into(),
            api_key: "test-key".into(),
            temperature: 0.2,
            no_tui: true,
            resume: false,
            log_level: "info".into(),
            session_root: None,
            llm: LlmConfig::default(),
            lookup: LookupConfig::default(),
        }
    }

    /// Deterministic stand-in for the reasoning service.
    struct StubReasoner {
        reply: String,
        steps: Vec<ToolTrace>,
    }

    #[async_trait]
    impl ReasoningService for StubReasoner {
        async fn respond(
            &self,
            req: AgentRequest,
            events: Option<Sender<AgentEvent>>,
            _cancel: Option<CancellationToken>,
        ) -> Result<AssistantResponse> {
            assert!(!req.input.is_empty());
            if let Some(tx) = &events {
                let _ = tx.send(AgentEvent::Token(self.reply.clone()));
            }
            Ok(AssistantResponse {
                content: self.reply.clone(),
                steps: self.steps.clone(),
            })
        }
    }

    fn orchestrator_with(reply: &str, steps: Vec<ToolTrace>, root: &std::path::Path) -> Orchestrator {
        let mut sessions = SessionManager::with_root(root).unwrap();
        sessions.create_session().unwrap();
        Orchestrator::new(
            test_cfg(),
            Arc::new(StubReasoner {
                reply: reply.into(),
                steps,
            }),
            sessions,
        )
    }

    #[tokio::test]
    async fn run_turn_persists_user_then_assistant() {
        let dir = tempdir().unwrap();
        let mut orch = orchestrator_with("Hi! How can I help?", vec![], dir.path());

        assert!(orch.load_history().is_empty());
        let resp = orch.run_turn("hello", None, None).await.unwrap();
        assert_eq!(resp.content, "Hi! How can I help?");

        let history = orch.load_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hi! How can I help?");
    }

    #[tokio::test]
    async fn history_survives_reload() {
        let dir = tempdir().unwrap();
        let id = {
            let mut orch = orchestrator_with("answer", vec![], dir.path());
            orch.run_turn("question", None, None).await.unwrap();
            orch.sessions.current_session.as_ref().unwrap().meta.id.clone()
        };

        let mut sessions = SessionManager::with_root(dir.path()).unwrap();
        sessions.load_session(&id).unwrap();
        let orch = Orchestrator::new(
            test_cfg(),
            Arc::new(StubReasoner {
                reply: String::new(),
                steps: vec![],
            }),
            sessions,
        );
        let history = orch.load_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "question");
    }

    #[tokio::test]
    async fn load_history_without_session_is_empty() {
        let dir = tempdir().unwrap();
        let sessions = SessionManager::with_root(dir.path()).unwrap();
        let orch = Orchestrator::new(
            test_cfg(),
            Arc::new(StubReasoner {
                reply: String::new(),
                steps: vec![],
            }),
            sessions,
        );
        assert!(orch.load_history().is_empty());
    }

    #[tokio::test]
    async fn submit_records_tool_outcomes() {
        let dir = tempdir().unwrap();
        let steps = vec![
            ToolTrace {
                name: "web_search".into(),
                arguments: "{}".into(),
                ok: true,
                result: "{}".into(),
            },
            ToolTrace {
                name: "wikipedia".into(),
                arguments: "{}".into(),
                ok: false,
                result: "{\"error\":\"boom\"}".into(),
            },
        ];
        let mut orch = orchestrator_with("done", steps, dir.path());
        orch.run_turn("look this up", None, None).await.unwrap();

        let session = orch.sessions.current_session.as_ref().unwrap();
        assert_eq!(session.tool_calls, 2);
        assert_eq!(session.requests, 1);
        assert_eq!(*session.tool_call_successes.get("web_search").unwrap(), 1);
        assert_eq!(*session.tool_call_failures.get("wikipedia").unwrap(), 1);
    }

    #[tokio::test]
    async fn submit_forwards_events() {
        let dir = tempdir().unwrap();
        let mut orch = orchestrator_with("streamed", vec![], dir.path());
        let (tx, rx) = std::sync::mpsc::channel();
        orch.run_turn("hi", Some(tx), None).await.unwrap();
        let tokens: Vec<String> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                AgentEvent::Token(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(tokens, vec!["streamed".to_string()]);
    }
}
