mod state;
mod view;

use anyhow::Result;
use crossterm::{cursor, execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::AgentEvent;
use crate::llm::OpenAIClient;
use crate::orchestrator::Orchestrator;
use crate::session::Role;

pub use state::{MsgRole, TuiApp};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const HELP_TEXT: &str = "/help  /clear  /session list|new|delete <id>  /quit\nEnter sends, Esc cancels a running request (quits when idle), PgUp/PgDn scroll";

/// Interactive chat TUI. Owns the terminal for its lifetime.
pub async fn run_tui(orch: Orchestrator, client: OpenAIClient) -> Result<()> {
    let mut stdout = std::io::stdout();
    terminal::enable_raw_mode()?;
    execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut term = Terminal::new(backend)?;

    let res = run_loop(&mut term, orch, client).await;

    let mut stdout = std::io::stdout();
    execute!(stdout, terminal::LeaveAlternateScreen, cursor::Show)?;
    terminal::disable_raw_mode()?;
    res
}

struct Turn {
    cancel: CancellationToken,
    tokens_before: u32,
}

async fn run_loop(
    term: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    orch: Orchestrator,
    client: OpenAIClient,
) -> Result<()> {
    let mut app = TuiApp::new("scout - /help for commands");
    app.push_message(MsgRole::Info, "Welcome to scout. Ask me anything.");
    for turn in orch.load_history() {
        let role = match turn.role {
            Role::User => MsgRole::User,
            Role::Assistant => MsgRole::Assistant,
        };
        app.push_message(role, turn.content.clone());
    }
    app.status = orch
        .sessions
        .current_session_info()
        .unwrap_or_else(|| "no session".to_string());

    let orch = Arc::new(Mutex::new(orch));
    let (ev_tx, ev_rx) = std::sync::mpsc::channel::<AgentEvent>();
    let mut in_flight: Option<Turn> = None;

    loop {
        drain_events(&mut app, &ev_rx, &mut in_flight, &orch, &client).await;
        if app.busy {
            app.tick_spinner();
        }
        term.draw(|f| view::render(f, &app))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let ev = event::read()?;
        let Event::Key(key) = ev else { continue };
        if key.kind == KeyEventKind::Release {
            continue;
        }

        match key.code {
            KeyCode::Esc => {
                if let Some(turn) = &in_flight {
                    turn.cancel.cancel();
                    app.push_message(MsgRole::Info, "cancelling…");
                } else {
                    break;
                }
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::PageUp => app.scroll_up(10),
            KeyCode::PageDown => app.scroll_down(10),
            KeyCode::Enter if key.modifiers.is_empty() => {
                let text = app.take_input();
                if text.is_empty() {
                    continue;
                }
                if text.starts_with('/') {
                    if handle_command(&text, &mut app, &orch)? {
                        break;
                    }
                    continue;
                }
                if app.busy {
                    app.push_message(MsgRole::Info, "a request is already running");
                    continue;
                }
                app.push_message(MsgRole::User, text.clone());
                app.busy = true;
                let cancel = CancellationToken::new();
                in_flight = Some(Turn {
                    cancel: cancel.clone(),
                    tokens_before: client.get_tokens_used(),
                });
                spawn_turn(orch.clone(), text, ev_tx.clone(), cancel);
            }
            _ => {
                app.input.input(Event::Key(key));
            }
        }
    }
    Ok(())
}

fn spawn_turn(
    orch: Arc<Mutex<Orchestrator>>,
    text: String,
    tx: Sender<AgentEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut orch = orch.lock().await;
        match orch
            .run_turn(&text, Some(tx.clone()), Some(cancel))
            .await
        {
            Ok(resp) => {
                let _ = tx.send(AgentEvent::Done(resp.content));
            }
            Err(e) => {
                let _ = tx.send(AgentEvent::Error(e.to_string()));
            }
        }
    });
}

async fn drain_events(
    app: &mut TuiApp,
    rx: &Receiver<AgentEvent>,
    in_flight: &mut Option<Turn>,
    orch: &Arc<Mutex<Orchestrator>>,
    client: &OpenAIClient,
) {
    for ev in rx.try_iter() {
        match ev {
            AgentEvent::Token(t) => app.append_stream_token(&t),
            AgentEvent::ToolStart { name, arguments } => {
                app.push_message(MsgRole::Tool, format!("[tool] {name}({arguments})"));
            }
            AgentEvent::ToolEnd { name, ok } => {
                let status = if ok { "OK" } else { "ERR" };
                app.push_message(MsgRole::Tool, format!("[tool] {name} => {status}"));
            }
            AgentEvent::Done(_) => {
                app.busy = false;
                if let Some(turn) = in_flight.take() {
                    let used = client.get_tokens_used().saturating_sub(turn.tokens_before);
                    let mut orch = orch.lock().await;
                    orch.record_token_usage(used as u64);
                    app.status = orch
                        .sessions
                        .current_session_info()
                        .unwrap_or_else(|| "no session".to_string());
                }
                info!("turn completed");
            }
            AgentEvent::Error(e) => {
                app.busy = false;
                *in_flight = None;
                app.push_message(MsgRole::Error, e);
            }
        }
    }
}

/// Handle a slash command. Returns true when the app should exit.
fn handle_command(
    text: &str,
    app: &mut TuiApp,
    orch: &Arc<Mutex<Orchestrator>>,
) -> Result<bool> {
    let mut parts = text.trim().split_whitespace();
    match parts.next() {
        Some("/quit") | Some("/exit") => return Ok(true),
        Some("/help") => app.push_message(MsgRole::Info, HELP_TEXT),
        Some("/clear") => {
            let Ok(mut orch) = orch.try_lock() else {
                app.push_message(MsgRole::Info, "busy; try again after the reply");
                return Ok(false);
            };
            orch.sessions.clear_current_conversation()?;
            app.messages.clear();
            app.push_message(MsgRole::Info, "conversation cleared");
        }
        Some("/session") => {
            let Ok(mut orch) = orch.try_lock() else {
                app.push_message(MsgRole::Info, "busy; try again after the reply");
                return Ok(false);
            };
            match parts.next() {
                Some("list") => {
                    let metas = orch.sessions.list_sessions()?;
                    if metas.is_empty() {
                        app.push_message(MsgRole::Info, "no saved sessions");
                    }
                    for meta in metas {
                        app.push_message(
                            MsgRole::Info,
                            format!("{}  {}  {}", meta.id, meta.created_at, meta.title),
                        );
                    }
                }
                Some("new") => {
                    orch.sessions.create_session()?;
                    app.messages.clear();
                    app.push_message(MsgRole::Info, "started a new session");
                    app.status = orch
                        .sessions
                        .current_session_info()
                        .unwrap_or_else(|| "no session".to_string());
                }
                Some("delete") => match parts.next() {
                    Some(id) => {
                        orch.sessions.delete_session(id)?;
                        app.push_message(MsgRole::Info, format!("deleted session {id}"));
                    }
                    None => app.push_message(MsgRole::Info, "usage: /session delete <id>"),
                },
                _ => app.push_message(MsgRole::Info, "usage: /session list|new|delete <id>"),
            }
        }
        _ => app.push_message(MsgRole::Info, "unknown command; /help for a list"),
    }
    Ok(false)
}
