use anyhow::{Result, anyhow};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::llm::client::OpenAIClient;
use crate::llm::types::{ChatMessage, ChatRequest, ToolCall, ToolCallFunction, ToolDef, Usage};
use crate::llm::{LlmErrorKind, classify_error, should_retry};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StreamChoiceDelta {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    // OpenAI-compatible tool_calls (streamed as incremental deltas)
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallDelta {
    pub index: Option<usize>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>, // "function"
    #[serde(default)]
    pub function: Option<ToolCallFunctionDelta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallFunctionDelta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String, // streamed as partial JSON string
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: usize,
    pub delta: StreamChoiceDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    pub usage: Option<Usage>,
}

/// One typed event out of the SSE stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    ToolCallDeltas(Vec<ToolCallDelta>),
}

/// Strip the SSE framing from one line. Returns the JSON payload, or None
/// for blank lines and the `[DONE]` sentinel.
pub(crate) fn sse_payload(line: &str) -> Option<&str> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }
    let payload = s.strip_prefix("data:").map(str::trim).unwrap_or(s);
    if payload == "[DONE]" {
        return None;
    }
    Some(payload)
}

/// Buffer that reassembles complete tool calls from streamed deltas.
/// Indices may arrive sparse and out of order; name/argument fragments are
/// concatenated in arrival order.
#[derive(Debug, Default)]
pub struct ToolDeltaBuffer {
    calls: Vec<PartialToolCall>,
}

#[derive(Debug, Clone, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl ToolDeltaBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let index = delta.index.unwrap_or(self.calls.len().saturating_sub(1));
        if self.calls.len() <= index {
            self.calls.resize_with(index + 1, Default::default);
        }
        let slot = &mut self.calls[index];
        if let Some(id) = &delta.id
            && slot.id.is_none()
        {
            slot.id = Some(id.clone());
        }
        if let Some(f) = &delta.function {
            slot.name.push_str(&f.name);
            slot.arguments.push_str(&f.arguments);
        }
    }

    /// Validate and convert every buffered call. Arguments must be complete
    /// JSON by the time the stream finishes.
    pub fn finalize(&self) -> Result<Vec<ToolCall>> {
        self.calls
            .iter()
            .map(|rc| {
                if rc.name.is_empty() {
                    return Err(anyhow!("tool call missing name"));
                }
                let _parsed: JsonValue = serde_json::from_str(&rc.arguments)
                    .map_err(|e| anyhow!("invalid tool arguments JSON: {e}"))?;
                Ok(ToolCall {
                    id: rc.id.clone(),
                    r#type: "function".to_string(),
                    function: ToolCallFunction {
                        name: rc.name.clone(),
                        arguments: rc.arguments.clone(),
                    },
                })
            })
            .collect()
    }
}

impl OpenAIClient {
    /// Open a streaming chat-completions request carrying tool definitions.
    /// Only establishing the stream is retried; mid-stream errors surface to
    /// the consumer.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<&[ToolDef]>,
        temperature: Option<f32>,
        cancel: Option<CancellationToken>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>> {
        let url = self.endpoint();
        let req = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            stream: Some(true),
            tools: tools.map(|t| t.to_vec()),
            tool_choice: None,
        };
        let headers = self.headers();

        if let Ok(payload) = serde_json::to_string(&req) {
            debug!(payload = %payload, endpoint = %url, "sending chat.completions payload (stream)");
        }

        let cancel_token = cancel.unwrap_or_default();

        let mut attempt = 1usize;
        let max_attempts = self.llm_cfg.max_retries.saturating_add(1);
        let resp = loop {
            let fut = self
                .inner
                .post(url.clone())
                .headers(headers.clone())
                .json(&req)
                .send();

            let resp_res = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    info!("chat_stream cancelled before send");
                    return Err(anyhow!(LlmErrorKind::Cancelled));
                }
                res = fut => res,
            };

            match resp_res {
                Err(e) => {
                    let err = anyhow::Error::new(e).context("send chat request (stream)");
                    let kind = classify_error(None, &err);
                    if attempt < max_attempts && should_retry(&kind) {
                        let wait = self.backoff_delay(attempt, None);
                        warn!(attempt, err = %err, wait_ms = %wait.as_millis(), "retrying stream establish after error");
                        tokio::select! {
                            biased;
                            _ = cancel_token.cancelled() => {
                                return Err(anyhow!(LlmErrorKind::Cancelled));
                            }
                            _ = tokio::time::sleep(wait) => {}
                        }
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
                Ok(resp) => {
                    if !resp.status().is_success() {
                        let status = resp.status();
                        let text = resp.text().await.unwrap_or_default();
                        if attempt < max_attempts
                            && (status.is_server_error() || status.as_u16() == 429)
                        {
                            let wait = self.backoff_delay(attempt, None);
                            info!(attempt, status = %status.as_u16(), wait_ms = %wait.as_millis(), "retrying stream establish after HTTP error");
                            tokio::select! {
                                biased;
                                _ = cancel_token.cancelled() => {
                                    return Err(anyhow!(LlmErrorKind::Cancelled));
                                }
                                _ = tokio::time::sleep(wait) => {}
                            }
                            attempt += 1;
                            continue;
                        }
                        anyhow::bail!("chat error: {} - {}", status, text);
                    }
                    break resp;
                }
            }
        };

        let mut byte_stream = resp.bytes_stream();
        let mut buf = Vec::<u8>::new();
        let client = self.clone();

        let stream = async_stream::try_stream! {
            loop {
                let chunk_res = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        info!("chat_stream cancelled during byte stream read");
                        Err(anyhow!(LlmErrorKind::Cancelled))
                    }
                    chunk = byte_stream.next() => match chunk {
                        Some(Ok(bytes)) => Ok(bytes),
                        Some(Err(e)) => Err(anyhow::Error::new(e).context("byte stream read error")),
                        None => break, // End of stream
                    }
                };

                let chunk = match chunk_res {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(err = %e, "error reading chunk from byte stream");
                        Err(e)?;
                        break;
                    }
                };

                buf.extend_from_slice(&chunk);
                let mut start = 0usize;
                for i in 0..buf.len() {
                    if buf[i] != b'\n' {
                        continue;
                    }
                    let line = &buf[start..i];
                    start = i + 1;
                    let Ok(s) = std::str::from_utf8(line) else {
                        continue;
                    };
                    let Some(payload) = sse_payload(s) else {
                        continue;
                    };

                    if let Ok(json) = serde_json::from_str::<ChatStreamChunk>(payload) {
                        if let Some(usage) = &json.usage {
                            client.add_tokens(usage.total_tokens);
                            client.set_prompt_tokens(usage.prompt_tokens);
                        }

                        for ch in json.choices {
                            if !ch.delta.content.is_empty() {
                                yield StreamEvent::Token(ch.delta.content);
                            }
                            if !ch.delta.tool_calls.is_empty() {
                                yield StreamEvent::ToolCallDeltas(ch.delta.tool_calls);
                            }
                        }
                    } else {
                        warn!(payload, "failed to parse stream chunk");
                    }
                }
                if start > 0 {
                    buf.drain(0..start);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
