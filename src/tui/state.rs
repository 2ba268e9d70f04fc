use tui_textarea::TextArea;
use unicode_width::UnicodeWidthChar;

/// Who a rendered line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgRole {
    User,
    Assistant,
    Tool,
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MsgRole,
    pub content: String,
}

pub const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// All mutable TUI state. Rendering reads it; the event loop mutates it.
pub struct TuiApp {
    pub title: String,
    pub messages: Vec<Message>,
    pub input: TextArea<'static>,
    pub busy: bool,
    pub spinner_idx: usize,
    /// Lines scrolled up from the bottom of the transcript.
    pub scroll_from_bottom: usize,
    pub status: String,
}

impl TuiApp {
    pub fn new(title: impl Into<String>) -> Self {
        let mut input = TextArea::default();
        input.set_cursor_line_style(ratatui::style::Style::default());
        Self {
            title: title.into(),
            messages: Vec::new(),
            input,
            busy: false,
            spinner_idx: 0,
            scroll_from_bottom: 0,
            status: String::new(),
        }
    }

    pub fn push_message(&mut self, role: MsgRole, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
        self.scroll_from_bottom = 0;
    }

    /// Append one streamed fragment to the assistant message being built,
    /// starting a new one when the transcript does not end with one.
    pub fn append_stream_token(&mut self, token: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == MsgRole::Assistant => last.content.push_str(token),
            _ => self.push_message(MsgRole::Assistant, token),
        }
        self.scroll_from_bottom = 0;
    }

    pub fn take_input(&mut self) -> String {
        let text = self.input.lines().join("\n").trim().to_string();
        self.input = TextArea::default();
        self.input
            .set_cursor_line_style(ratatui::style::Style::default());
        text
    }

    pub fn tick_spinner(&mut self) {
        self.spinner_idx = (self.spinner_idx + 1) % SPINNER.len();
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(lines);
    }
}

/// Hard-wrap `text` to `width` display columns, breaking on character
/// boundaries. Returns at least one line.
pub fn wrap_line(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut out = Vec::new();
    let mut line = String::new();
    let mut cols = 0usize;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if cols + w > width && !line.is_empty() {
            out.push(std::mem::take(&mut line));
            cols = 0;
        }
        line.push(ch);
        cols += w;
    }
    out.push(line);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_tokens_accumulate_into_one_message() {
        let mut app = TuiApp::new("test");
        app.append_stream_token("Hel");
        app.append_stream_token("lo");
        assert_eq!(app.messages.len(), 1);
        assert_eq!(app.messages[0].content, "Hello");
        assert_eq!(app.messages[0].role, MsgRole::Assistant);
    }

    #[test]
    fn stream_tokens_start_fresh_after_tool_line() {
        let mut app = TuiApp::new("test");
        app.append_stream_token("thinking");
        app.push_message(MsgRole::Tool, "[tool] web_search => OK");
        app.append_stream_token("answer");
        assert_eq!(app.messages.len(), 3);
        assert_eq!(app.messages[2].content, "answer");
    }

    #[test]
    fn take_input_clears_the_box() {
        let mut app = TuiApp::new("test");
        app.input.insert_str("hello world");
        assert_eq!(app.take_input(), "hello world");
        assert!(app.take_input().is_empty());
    }

    #[test]
    fn wrap_line_breaks_at_width() {
        let lines = wrap_line("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn wrap_line_handles_wide_chars() {
        // Each CJK char is two columns, so two fit per 4-column row.
        let lines = wrap_line("こんにちは", 4);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "こん");
    }

    #[test]
    fn wrap_line_empty_yields_one_line() {
        assert_eq!(wrap_line("", 10), vec![String::new()]);
    }

    #[test]
    fn scroll_clamps_at_bottom() {
        let mut app = TuiApp::new("test");
        app.scroll_down(3);
        assert_eq!(app.scroll_from_bottom, 0);
        app.scroll_up(5);
        app.scroll_down(2);
        assert_eq!(app.scroll_from_bottom, 3);
    }

    #[test]
    fn new_message_resets_scroll() {
        let mut app = TuiApp::new("test");
        app.scroll_up(10);
        app.push_message(MsgRole::User, "hi");
        assert_eq!(app.scroll_from_bottom, 0);
    }
}
