use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::tui::state::{MsgRole, SPINNER, TuiApp, wrap_line};

fn role_prefix(role: MsgRole) -> (&'static str, Style) {
    match role {
        MsgRole::User => ("you", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        MsgRole::Assistant => (
            "scout",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        MsgRole::Tool => ("tool", Style::default().fg(Color::Yellow)),
        MsgRole::Info => ("info", Style::default().fg(Color::Blue)),
        MsgRole::Error => ("error", Style::default().fg(Color::Red)),
    }
}

/// Flatten the transcript into display rows, hard-wrapped to `width`.
pub(crate) fn transcript_lines(app: &TuiApp, width: usize) -> Vec<Line<'static>> {
    let body_width = width.saturating_sub(7).max(8);
    let mut lines = Vec::new();
    for msg in &app.messages {
        let (prefix, style) = role_prefix(msg.role);
        let mut first = true;
        for raw in msg.content.split('\n') {
            for wrapped in wrap_line(raw, body_width) {
                let head = if first {
                    format!("{prefix:>5}: ")
                } else {
                    "       ".to_string()
                };
                first = false;
                lines.push(Line::from(vec![
                    Span::styled(head, style),
                    Span::raw(wrapped),
                ]));
            }
        }
        lines.push(Line::raw(""));
    }
    lines
}

pub fn render(f: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_transcript(f, app, chunks[0]);
    render_input(f, app, chunks[1]);
    render_status(f, app, chunks[2]);
}

fn render_transcript(f: &mut Frame, app: &TuiApp, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(app.title.clone());
    let inner = block.inner(area);

    let lines = transcript_lines(app, inner.width as usize);
    let visible = inner.height as usize;
    let total = lines.len();
    let bottom = total.saturating_sub(app.scroll_from_bottom);
    let start = bottom.saturating_sub(visible);
    let window: Vec<Line> = lines[start..bottom].to_vec();

    f.render_widget(Paragraph::new(window).block(block), area);
}

fn render_input(f: &mut Frame, app: &TuiApp, area: Rect) {
    let title = if app.busy { "…" } else { "message" };
    let mut input = app.input.clone();
    input.set_block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(&input, area);
}

fn render_status(f: &mut Frame, app: &TuiApp, area: Rect) {
    let spinner = if app.busy {
        SPINNER[app.spinner_idx % SPINNER.len()]
    } else {
        " "
    };
    let status = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" {spinner} "),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(app.status.clone()),
    ]))
    .style(Style::default().bg(Color::DarkGray));
    f.render_widget(status, area);
}
