mod runner;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::session::ChatTurn;

pub use runner::ToolCallingAgent;

/// Everything one submission needs: the new input, the history it extends,
/// and the model parameters. Built per request, dropped after it returns.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub input: String,
    pub history: Vec<ChatTurn>,
    pub model: String,
    pub temperature: f32,
}

/// Record of one tool invocation made while answering.
#[derive(Debug, Clone)]
pub struct ToolTrace {
    pub name: String,
    pub arguments: String,
    pub ok: bool,
    pub result: String,
}

/// Final answer plus the intermediate steps that produced it.
#[derive(Debug, Clone)]
pub struct AssistantResponse {
    pub content: String,
    pub steps: Vec<ToolTrace>,
}

/// Live progress reported to the display surface while a request runs.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// One streamed fragment of assistant output.
    Token(String),
    ToolStart { name: String, arguments: String },
    ToolEnd { name: String, ok: bool },
    /// The request finished; carries the final content.
    Done(String),
    Error(String),
}

pub(crate) fn emit(events: &Option<Sender<AgentEvent>>, ev: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(ev);
    }
}

/// The reasoning service behind one narrow method, so surfaces and tests
/// can swap in a deterministic stand-in.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn respond(
        &self,
        req: AgentRequest,
        events: Option<Sender<AgentEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<AssistantResponse>;
}
