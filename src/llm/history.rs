use crate::llm::types::ChatMessage;
use crate::session::ChatTurn;

/// Message list builder for one request: system prompt first, then prior
/// turns, then the new user input. Oldest non-system messages are dropped
/// once the character cap is exceeded.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
    max_chars: usize,
    system_added: bool,
    system_prompt: Option<String>,
}

impl ChatHistory {
    pub fn new(max_chars: usize, system_prompt: Option<String>) -> Self {
        Self {
            messages: Vec::new(),
            max_chars,
            system_added: false,
            system_prompt,
        }
    }

    pub fn append_system_once(&mut self) {
        if self.system_added {
            return;
        }
        if let Some(sys) = self.system_prompt.clone() {
            self.messages.insert(0, ChatMessage::system(sys));
            self.system_added = true;
        }
    }

    pub fn append_turns(&mut self, turns: &[ChatTurn]) {
        for turn in turns {
            self.messages.push(ChatMessage {
                role: turn.role.as_str().into(),
                content: Some(turn.content.clone()),
                tool_calls: vec![],
                tool_call_id: None,
            });
        }
        self.trim_to_max();
    }

    pub fn append_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
        self.trim_to_max();
    }

    pub fn build_messages(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    fn content_len(m: &ChatMessage) -> usize {
        m.content.as_deref().map(str::len).unwrap_or(0)
    }

    fn trim_to_max(&mut self) {
        // Keep total character count under max_chars, preserving the system
        // message at index 0 if present.
        let mut total: usize = self.messages.iter().map(Self::content_len).sum();
        let floor = if self.system_added { 2 } else { 1 };
        while total > self.max_chars && self.messages.len() > floor {
            let idx = if self.system_added { 1 } else { 0 };
            let removed = self.messages.remove(idx);
            total -= Self::content_len(&removed);
        }
    }
}
