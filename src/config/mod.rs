use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Resolved application configuration.
/// Precedence: CLI flags > environment > config file > defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub no_tui: bool,
    pub resume: bool,
    pub log_level: String,
    pub session_root: Option<PathBuf>,
    pub llm: LlmConfig,
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
    pub respect_retry_after: bool,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
            max_retries: 3,
            retry_base_ms: 1000,
            retry_jitter_ms: 2000,
            respect_retry_after: true,
            timeout_ms: 300_000,
        }
    }
}

/// Endpoints and limits for the lookup tools.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    pub web_search_endpoint: String,
    pub wikipedia_endpoint: String,
    pub max_results: usize,
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            web_search_endpoint: "https://html.duckduckgo.com/html/".to_string(),
            wikipedia_endpoint: "https://en.wikipedia.org/w/api.php".to_string(),
            max_results: 5,
            timeout_ms: 10_000,
        }
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Shape of the optional TOML config file. Every field is optional so the
/// file can set just the keys the user cares about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub log_level: Option<String>,
    pub llm: Option<PartialLlmConfig>,
    pub lookup: Option<PartialLookupConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLlmConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub retry_base_ms: Option<u64>,
    pub retry_jitter_ms: Option<u64>,
    pub respect_retry_after: Option<bool>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialLookupConfig {
    pub web_search_endpoint: Option<String>,
    pub wikipedia_endpoint: Option<String>,
    pub max_results: Option<usize>,
    pub timeout_ms: Option<u64>,
}

/// CLI flag values that feed into config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub config_file: Option<PathBuf>,
    pub no_tui: bool,
    pub resume: bool,
    pub log_level: Option<String>,
    pub session_dir: Option<PathBuf>,
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scout-chat").join("config.toml"))
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let cfg: FileConfig =
        toml::from_str(&s).with_context(|| format!("parse config file {}", path.display()))?;
    Ok(cfg)
}

impl AppConfig {
    /// Resolve the full configuration. A missing API key is a hard error:
    /// there is no useful degraded mode without one.
    pub fn resolve(cli: CliOverrides) -> Result<Self> {
        let file_cfg = match cli.config_file.clone().or_else(default_config_path) {
            Some(path) if path.exists() => load_file_config(&path).unwrap_or_else(|e| {
                warn!(?e, "ignoring unreadable config file");
                FileConfig::default()
            }),
            _ => FileConfig::default(),
        };

        let api_key = cli
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .or(file_cfg.api_key);
        let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
            bail!(
                "no API key configured: set OPENAI_API_KEY, pass --api-key, or add api_key to the config file"
            );
        };

        let base_url = cli
            .base_url
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .or(file_cfg.base_url)
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let model = cli
            .model
            .or_else(|| std::env::var("OPENAI_MODEL").ok())
            .or(file_cfg.model)
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let temperature = cli
            .temperature
            .or(file_cfg.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let log_level = cli
            .log_level
            .or(file_cfg.log_level)
            .unwrap_or_else(|| "info".to_string());

        let llm = merge_llm(file_cfg.llm);
        let lookup = merge_lookup(file_cfg.lookup);

        Ok(Self {
            base_url,
            model,
            api_key,
            temperature,
            no_tui: cli.no_tui,
            resume: cli.resume,
            log_level,
            session_root: cli.session_dir,
            llm,
            lookup,
        })
    }
}

fn merge_llm(partial: Option<PartialLlmConfig>) -> LlmConfig {
    let d = LlmConfig::default();
    let Some(p) = partial else { return d };
    LlmConfig {
        connect_timeout_ms: p.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
        request_timeout_ms: p.request_timeout_ms.unwrap_or(d.request_timeout_ms),
        max_retries: p.max_retries.unwrap_or(d.max_retries),
        retry_base_ms: p.retry_base_ms.unwrap_or(d.retry_base_ms),
        retry_jitter_ms: p.retry_jitter_ms.unwrap_or(d.retry_jitter_ms),
        respect_retry_after: p.respect_retry_after.unwrap_or(d.respect_retry_after),
        timeout_ms: p.timeout_ms.unwrap_or(d.timeout_ms),
    }
}

fn merge_lookup(partial: Option<PartialLookupConfig>) -> LookupConfig {
    let d = LookupConfig::default();
    let Some(p) = partial else { return d };
    LookupConfig {
        web_search_endpoint: p.web_search_endpoint.unwrap_or(d.web_search_endpoint),
        wikipedia_endpoint: p.wikipedia_endpoint.unwrap_or(d.wikipedia_endpoint),
        max_results: p.max_results.unwrap_or(d.max_results),
        timeout_ms: p.timeout_ms.unwrap_or(d.timeout_ms),
    }
}
