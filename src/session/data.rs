use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Speaker of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionMeta {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub title_is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub meta: SessionMeta,
    /// Last updated timestamp (RFC3339 string)
    pub timestamp: String,
    /// Conversation turns in submission order
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
    /// Number of tokens consumed
    pub token_count: u64,
    /// Number of requests sent to the model
    pub requests: u64,
    /// Number of tool calls made
    pub tool_calls: u64,
    /// Tool call success counts by tool name
    #[serde(default)]
    pub tool_call_successes: HashMap<String, u64>,
    /// Tool call failure counts by tool name
    #[serde(default)]
    pub tool_call_failures: HashMap<String, u64>,
}

impl SessionData {
    pub fn new() -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let meta = SessionMeta {
            id,
            created_at: now.clone(),
            title: "New Session".to_string(),
            title_is_default: true,
        };
        Self {
            meta,
            timestamp: now,
            turns: Vec::new(),
            token_count: 0,
            requests: 0,
            tool_calls: 0,
            tool_call_successes: HashMap::new(),
            tool_call_failures: HashMap::new(),
        }
    }

    fn touch(&mut self) {
        self.timestamp = Utc::now().to_rfc3339();
    }

    /// Append a turn to the conversation.
    pub fn append_turn(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        self.touch();
    }

    /// Clear the conversation.
    pub fn clear_turns(&mut self) {
        self.turns.clear();
        self.touch();
    }

    pub fn increment_token_count(&mut self, count: u64) {
        self.token_count += count;
        self.touch();
    }

    pub fn increment_requests(&mut self) {
        self.requests += 1;
        self.touch();
    }

    pub fn increment_tool_calls(&mut self) {
        self.tool_calls += 1;
        self.touch();
    }

    pub fn record_tool_call_success(&mut self, tool_name: &str) {
        *self
            .tool_call_successes
            .entry(tool_name.to_string())
            .or_insert(0) += 1;
        self.touch();
    }

    pub fn record_tool_call_failure(&mut self, tool_name: &str) {
        *self
            .tool_call_failures
            .entry(tool_name.to_string())
            .or_insert(0) += 1;
        self.touch();
    }

    /// Set the session title from the first prompt.
    pub fn set_initial_prompt(&mut self, prompt: &str) {
        self.meta.title = prompt.chars().take(30).collect();
        self.touch();
    }
}
