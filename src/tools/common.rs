use anyhow::Result;
use std::time::Duration;

use crate::config::LookupConfig;

/// HTTP-backed lookup tools the model can call while answering.
#[derive(Debug, Clone)]
pub struct LookupTools {
    pub(crate) http: reqwest::Client,
    pub(crate) cfg: LookupConfig,
}

impl LookupTools {
    pub fn new(cfg: LookupConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(concat!("scout-chat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, cfg })
    }
}
