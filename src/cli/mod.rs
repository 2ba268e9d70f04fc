use anyhow::Result;
use std::io::{self, BufRead, BufReader, Write};

use crate::agent::AgentEvent;
use crate::llm::OpenAIClient;
use crate::orchestrator::Orchestrator;
use crate::session::Role;

pub fn print_help() {
    println!(
        "/help                 Show help\n/clear                Clear the conversation\n/session list         List saved sessions\n/session new          Start a fresh session\n/session delete <id>  Delete a session\n/quit                 Quit"
    );
}

/// Handle a slash command. Returns true when the loop should exit.
fn handle_command(line: &str, orch: &mut Orchestrator) -> Result<bool> {
    let mut parts = line.trim().split_whitespace();
    match parts.next() {
        Some("/help") => print_help(),
        Some("/quit") | Some("/exit") => return Ok(true),
        Some("/clear") => {
            orch.sessions.clear_current_conversation()?;
            println!("conversation cleared");
        }
        Some("/session") => match parts.next() {
            Some("list") => {
                for meta in orch.sessions.list_sessions()? {
                    println!("{}  {}  {}", meta.id, meta.created_at, meta.title);
                }
            }
            Some("new") => {
                orch.sessions.create_session()?;
                println!("started a new session");
            }
            Some("delete") => match parts.next() {
                Some(id) => {
                    orch.sessions.delete_session(id)?;
                    println!("deleted session {id}");
                }
                None => eprintln!("usage: /session delete <id>"),
            },
            _ => eprintln!("usage: /session list|new|delete <id>"),
        },
        _ => eprintln!("unknown command; /help for a list"),
    }
    Ok(false)
}

fn print_turn(role: Role, content: &str) {
    let who = match role {
        Role::User => "you",
        Role::Assistant => "scout",
    };
    println!("{who}: {content}");
}

/// Line-oriented REPL for non-TTY use and `--no-tui`.
pub async fn run_cli_loop(mut orch: Orchestrator, client: OpenAIClient) -> Result<()> {
    println!("scout (CLI) - type /help for commands");
    for turn in orch.load_history() {
        print_turn(turn.role, &turn.content);
    }

    let stdin = io::stdin();
    for line in BufReader::new(stdin).lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text.starts_with('/') {
            if handle_command(text, &mut orch)? {
                break;
            }
            continue;
        }

        // Print events as they arrive while the submission runs.
        let (tx, rx) = std::sync::mpsc::channel::<AgentEvent>();
        let printer = std::thread::spawn(move || {
            for ev in rx {
                match ev {
                    AgentEvent::Token(t) => {
                        print!("{t}");
                        let _ = io::stdout().flush();
                    }
                    AgentEvent::ToolStart { name, arguments } => {
                        println!("[tool] {name}({arguments})");
                    }
                    AgentEvent::ToolEnd { name, ok } => {
                        let status = if ok { "OK" } else { "ERR" };
                        println!("[tool] {name} => {status}");
                    }
                    _ => {}
                }
            }
        });

        let tokens_before = client.get_tokens_used();
        print!("scout: ");
        let _ = io::stdout().flush();
        let res = orch.run_turn(text, Some(tx), None).await;
        let _ = printer.join();
        match res {
            Ok(_) => println!(),
            Err(e) => eprintln!("\nerror: {e}"),
        }
        orch.record_token_usage(client.get_tokens_used().saturating_sub(tokens_before) as u64);
    }

    Ok(())
}
