use anyhow::{Context, Result};
use async_trait::async_trait;
use catalog_core::CrawlExecutor;
use std::path::PathBuf;
use tokio::process::Command;

/// Invokes the extractor as a subprocess, mirroring the original system's
/// `subprocess.run(["scrapy", "crawl", spider, ...])`. The scheduler does
/// not parse its stdout; the extractor reconciles products on its own.
pub struct SubprocessCrawlExecutor {
    pub data_dir: PathBuf,
    pub crawl_log: Option<String>,
}

impl SubprocessCrawlExecutor {
    pub fn new(data_dir: impl Into<PathBuf>, crawl_log: Option<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            crawl_log,
        }
    }

    fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.data_dir.join("logs"))
            .context("failed to create data_dir/logs")?;
        std::fs::create_dir_all(self.data_dir.join("state"))
            .context("failed to create data_dir/state")?;
        Ok(())
    }
}

#[async_trait]
impl CrawlExecutor for SubprocessCrawlExecutor {
    async fn run(&self, extractor_name: &str, full: bool) -> Result<()> {
        self.ensure_dirs()?;

        let mode = if full { "full" } else { "incremental" };
        let mut cmd = Command::new(extractor_name);
        cmd.env("CRAWL_MODE", mode);
        if let Some(log_file) = &self.crawl_log {
            cmd.arg("-s").arg(format!("LOG_FILE={}", log_file));
        }

        tracing::info!(mode, extractor_name, "starting crawl");
        let status = cmd
            .status()
            .await
            .with_context(|| format!("failed to spawn extractor {extractor_name}"))?;
        if !status.success() {
            anyhow::bail!("extractor {extractor_name} exited with {status}");
        }

        let state_file = self.data_dir.join("state").join("crawl_state.txt");
        tokio::fs::write(&state_file, chrono::Utc::now().to_rfc3339())
            .await
            .context("failed to write crawl state marker")?;

        Ok(())
    }
}
