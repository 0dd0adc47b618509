use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use catalog_core::StrategyKind;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Task queue transport setting, kept for parity with the original
    /// Celery broker configuration. The in-process scheduler never reads
    /// it; logged once at startup as unused.
    pub broker_url: Option<String>,
    pub data_dir: String,
    pub extractor_name: String,
    pub message_strategy: StrategyKind,
    pub target_chat: String,
    pub chat_bot_token: String,
    pub chat_api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let message_strategy = match env::var("MESSAGE_STRATEGY").ok().as_deref() {
            Some("S1") => StrategyKind::S1,
            Some("S3") => StrategyKind::S3,
            Some("S2") | None => StrategyKind::S2,
            Some(other) => {
                anyhow::bail!("MESSAGE_STRATEGY must be one of S1, S2, S3, got {other}");
            }
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            broker_url: env::var("BROKER_URL").ok(),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            extractor_name: env::var("EXTRACTOR_NAME")
                .unwrap_or_else(|_| "products".to_string()),
            message_strategy,
            target_chat: env::var("TARGET_CHAT").context("TARGET_CHAT must be set")?,
            chat_bot_token: env::var("CHAT_BOT_TOKEN").context("CHAT_BOT_TOKEN must be set")?,
            chat_api_base_url: env::var("CHAT_API_BASE_URL")
                .context("CHAT_API_BASE_URL must be set")?,
        })
    }
}
