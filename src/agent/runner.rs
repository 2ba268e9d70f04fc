use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::agent::{AgentEvent, AgentRequest, AssistantResponse, ReasoningService, ToolTrace, emit};
use crate::llm::{
    ChatHistory, OpenAIClient, StreamEvent, ToolDeltaBuffer, default_tools_def, prompt,
    types::{ChatMessage, ToolDef},
};
use crate::llm::LlmErrorKind;
use crate::tools::{LookupTools, dispatch_tool_call};

/// Upper bound on tool rounds within one submission.
const MAX_TOOL_ITERS: usize = 8;

/// Upper bound on characters in the message list sent to the model.
const MAX_HISTORY_CHARS: usize = 120_000;

const MAX_ARG_LOG_LEN: usize = 120;

/// Tool-calling loop over the OpenAI-compatible API: stream a response,
/// execute any tool calls it asks for, feed the results back, repeat until
/// the model answers in plain content.
pub struct ToolCallingAgent {
    client: OpenAIClient,
    tools: LookupTools,
    tool_defs: Vec<ToolDef>,
}

impl ToolCallingAgent {
    pub fn new(client: OpenAIClient, tools: LookupTools) -> Self {
        Self {
            client,
            tools,
            tool_defs: default_tools_def(),
        }
    }

    fn build_messages(&self, req: &AgentRequest) -> Vec<ChatMessage> {
        let mut history =
            ChatHistory::new(MAX_HISTORY_CHARS, Some(prompt::build_system_prompt()));
        history.append_system_once();
        history.append_turns(&req.history);
        history.append_user(&req.input);
        history.build_messages()
    }
}

#[async_trait]
impl ReasoningService for ToolCallingAgent {
    async fn respond(
        &self,
        req: AgentRequest,
        events: Option<Sender<AgentEvent>>,
        cancel: Option<CancellationToken>,
    ) -> Result<AssistantResponse> {
        let cancel_token = cancel.unwrap_or_default();
        let mut messages = self.build_messages(&req);
        let mut steps: Vec<ToolTrace> = Vec::new();

        for iter in 1..=MAX_TOOL_ITERS {
            debug!(iteration = iter, messages = messages.len(), "agent loop iteration");

            let mut stream = self
                .client
                .chat_stream(
                    &req.model,
                    messages.clone(),
                    Some(&self.tool_defs),
                    Some(req.temperature),
                    Some(cancel_token.clone()),
                )
                .await?;

            let mut content = String::new();
            let mut buf = ToolDeltaBuffer::new();
            while let Some(ev) = stream.next().await {
                match ev? {
                    StreamEvent::Token(tok) => {
                        content.push_str(&tok);
                        emit(&events, AgentEvent::Token(tok));
                    }
                    StreamEvent::ToolCallDeltas(deltas) => {
                        for d in &deltas {
                            buf.push(d);
                        }
                    }
                }
            }

            // No tool calls means the accumulated content is the answer.
            if buf.is_empty() {
                return Ok(AssistantResponse { content, steps });
            }

            let calls = buf.finalize()?;
            messages.push(ChatMessage {
                role: "assistant".into(),
                content: (!content.is_empty()).then_some(content),
                tool_calls: calls.clone(),
                tool_call_id: None,
            });

            for tc in calls {
                let mut args_log = tc.function.arguments.clone();
                if args_log.len() > MAX_ARG_LOG_LEN {
                    let mut truncated =
                        args_log.chars().take(MAX_ARG_LOG_LEN - 3).collect::<String>();
                    truncated.push_str("...");
                    args_log = truncated;
                }
                emit(
                    &events,
                    AgentEvent::ToolStart {
                        name: tc.function.name.clone(),
                        arguments: args_log,
                    },
                );

                let res = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        warn!("agent loop cancelled before tool dispatch");
                        return Err(anyhow!(LlmErrorKind::Cancelled));
                    }
                    res = dispatch_tool_call(&self.tools, tc.clone()) => res,
                };

                let tool_message_content = match &res {
                    Ok(value) => serde_json::to_string(value).unwrap_or_else(|_e| {
                        "{\"error\":\"failed to serialize tool result\"}".to_string()
                    }),
                    Err(e) => {
                        error!(error = %e, tool = %tc.function.name, "tool execution failed");
                        serde_json::to_string(&serde_json::json!({ "error": e.to_string() }))
                            .unwrap_or_else(|_e| {
                                "{\"error\":\"failed to serialize error\"}".to_string()
                            })
                    }
                };

                emit(
                    &events,
                    AgentEvent::ToolEnd {
                        name: tc.function.name.clone(),
                        ok: res.is_ok(),
                    },
                );
                steps.push(ToolTrace {
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                    ok: res.is_ok(),
                    result: tool_message_content.clone(),
                });

                // tool message to feed back to the model
                messages.push(ChatMessage {
                    role: "tool".into(),
                    content: Some(tool_message_content),
                    tool_calls: vec![],
                    tool_call_id: tc.id,
                });
            }
        }

        warn!(iters = MAX_TOOL_ITERS, "max tool iterations reached");
        Err(anyhow!("max tool iterations reached"))
    }
}
