mod agent;
mod assets;
mod cli;
mod config;
mod llm;
mod logging;
mod orchestrator;
mod session;
mod tools;
mod tui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use tracing::info;

use crate::agent::ToolCallingAgent;
use crate::config::{AppConfig, CliOverrides};
use crate::llm::OpenAIClient;
use crate::orchestrator::Orchestrator;
use crate::session::SessionManager;
use crate::tools::LookupTools;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "scout",
    version,
    about = "Interactive research chat agent (CLI/TUI)"
)]
struct Cli {
    /// Use plain CLI mode (disable TUI)
    #[arg(long, action = ArgAction::SetTrue)]
    no_tui: bool,

    /// OpenAI-compatible API base URL (env: OPENAI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Model name (env: OPENAI_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// API key (set via env OPENAI_API_KEY recommended)
    #[arg(long)]
    api_key: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resume the most recent session instead of starting fresh
    #[arg(long, action = ArgAction::SetTrue)]
    resume: bool,

    /// Directory for session storage (defaults to the user data dir)
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Log level (error,warn,info,debug,trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let cfg = AppConfig::resolve(CliOverrides {
        base_url: cli.base_url,
        model: cli.model,
        api_key: cli.api_key,
        temperature: cli.temperature,
        config_file: cli.config,
        no_tui: cli.no_tui,
        resume: cli.resume,
        log_level: cli.log_level,
        session_dir: cli.session_dir,
    })?;
    logging::init_logging(Path::new("scout.log"), &cfg.log_level)?;
    info!(model = %cfg.model, base_url = %cfg.base_url, "starting scout");

    let client = OpenAIClient::new(cfg.base_url.clone(), cfg.api_key.clone())?
        .with_llm_config(cfg.llm.clone());
    let tools = LookupTools::new(cfg.lookup.clone())?;
    let reasoner = Arc::new(ToolCallingAgent::new(client.clone(), tools));

    let mut sessions = match &cfg.session_root {
        Some(root) => SessionManager::with_root(root)?,
        None => SessionManager::new()?,
    };
    if cfg.resume {
        sessions.load_latest_session()?;
    }
    if sessions.current_session.is_none() {
        sessions.create_session()?;
    }

    let no_tui = cfg.no_tui || !atty::is(atty::Stream::Stdout);
    let orch = Orchestrator::new(cfg, reasoner, sessions);

    if no_tui {
        cli::run_cli_loop(orch, client).await
    } else {
        tui::run_tui(orch, client).await
    }
}
