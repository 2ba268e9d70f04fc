use anyhow::{Result, anyhow};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::llm::types::{ChatMessage, ChatRequest, ChoiceMessage, ToolDef};
use crate::llm::{LlmErrorKind, classify_error, should_retry};

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    pub base_url: String,
    pub api_key: String,
    pub(crate) inner: reqwest::Client,
    pub llm_cfg: LlmConfig,
    /// Tracks total tokens used by this client
    pub tokens_used: Arc<AtomicU32>,
    /// Tracks prompt tokens used by this client (for status display)
    pub prompt_tokens_used: Arc<AtomicU32>,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let inner = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            inner,
            llm_cfg: LlmConfig::default(),
            tokens_used: Arc::new(AtomicU32::new(0)),
            prompt_tokens_used: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn with_llm_config(mut self, cfg: LlmConfig) -> Self {
        let builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        // Keep the existing client if the rebuild fails; it only lacks timeouts.
        if let Ok(c) = builder.build() {
            self.inner = c;
        }
        self.llm_cfg = cfg;
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let mut base = self.base_url.trim_end_matches('/').to_string();
        if let Some(pos) = base.rfind("/v1") {
            base.truncate(pos);
            base = base.trim_end_matches('/').to_string();
        }
        format!("{base}/v1/chat/completions")
    }

    pub(crate) fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {}", self.api_key).parse().unwrap(),
        );
        headers
    }

    pub fn get_tokens_used(&self) -> u32 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    pub fn add_tokens(&self, tokens: u32) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    pub fn get_prompt_tokens_used(&self) -> u32 {
        self.prompt_tokens_used.load(Ordering::Relaxed)
    }

    pub fn set_prompt_tokens(&self, tokens: u32) {
        self.prompt_tokens_used.store(tokens, Ordering::Relaxed);
    }

    pub(crate) fn backoff_delay(&self, attempt: usize, retry_after_secs: Option<u64>) -> Duration {
        if self.llm_cfg.respect_retry_after
            && let Some(secs) = retry_after_secs
        {
            return Duration::from_secs(secs);
        }
        let base = self.llm_cfg.retry_base_ms;
        let exp = base.saturating_mul(1u64 << (attempt as u32 - 1));
        let jitter = self.llm_cfg.retry_jitter_ms as i64;
        let half = jitter / 2;
        let rnd = fastrand::i64(-half..=half).max(0) as u64;
        Duration::from_millis(exp.saturating_add(rnd))
    }

    /// One non-streaming chat-completions round trip, retried per config on
    /// transient failures. Tool definitions are optional.
    pub async fn chat_once(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<&[ToolDef]>,
        temperature: Option<f32>,
        cancel: Option<CancellationToken>,
    ) -> Result<ChoiceMessage> {
        let cancel_token = cancel.unwrap_or_default();
        let max_attempts = self.llm_cfg.max_retries.saturating_add(1);
        let mut attempt = 1usize;

        loop {
            match self
                .chat_once_inner(model, messages.clone(), tools, temperature, &cancel_token)
                .await
            {
                Ok((msg, _retry_after)) => return Ok(msg),
                Err((e, retry_after)) => {
                    let kind = classify_error(None, &e);
                    if kind == LlmErrorKind::Cancelled || attempt >= max_attempts {
                        return Err(e);
                    }
                    if !should_retry(&kind) {
                        return Err(e);
                    }
                    let wait = self.backoff_delay(attempt, retry_after);
                    warn!(attempt, err = %e, wait_ms = %wait.as_millis(), "retrying chat request");
                    tokio::select! {
                        biased;
                        _ = cancel_token.cancelled() => {
                            return Err(anyhow!(LlmErrorKind::Cancelled));
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn chat_once_inner(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<&[ToolDef]>,
        temperature: Option<f32>,
        cancel_token: &CancellationToken,
    ) -> Result<(ChoiceMessage, Option<u64>), (anyhow::Error, Option<u64>)> {
        let url = self.endpoint();
        let req = ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            stream: None,
            tools: tools.map(|t| t.to_vec()),
            tool_choice: None,
        };

        let req_builder = self.inner.post(&url).headers(self.headers()).json(&req);
        let timeout = Duration::from_millis(self.llm_cfg.timeout_ms);
        let resp_fut = tokio::time::timeout(timeout, req_builder.send());

        let resp = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                return Err((anyhow!(LlmErrorKind::Cancelled), None));
            }
            res = resp_fut => match res {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    let err = anyhow::Error::new(e).context("send chat request");
                    let kind = classify_error(None, &err);
                    return Err((err.context(kind), None));
                }
                Err(_) => return Err((anyhow!(LlmErrorKind::Timeout), None)),
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let text = resp.text().await.unwrap_or_default().trim().to_owned();
            let kind = classify_error(Some(status), &anyhow!("http error"));
            let err = anyhow!(kind).context(format!("chat error: {status} - {text}"));
            return Err((err, retry_after));
        }

        let body: crate::llm::types::ChatResponse = resp
            .json()
            .await
            .map_err(|e| (anyhow!(LlmErrorKind::Deserialize).context(e.to_string()), None))?;

        if let Some(usage) = &body.usage {
            self.add_tokens(usage.total_tokens);
            self.set_prompt_tokens(usage.prompt_tokens);
        }

        debug!(choices = body.choices.len(), "chat_once response");
        let msg = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| (anyhow!("no choices in chat response"), None))?;
        Ok((msg, None))
    }
}
