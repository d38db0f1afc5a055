use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

/// Run settings. Every key can be overridden with a `JOBS_`-prefixed
/// environment variable, e.g. `JOBS_DB_PATH=/tmp/jobs.sqlite`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub sitemap_url: String,
    /// Regex a URL must match to count as a job detail page.
    pub detail_pattern: String,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    /// Rows per parallel extraction batch.
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: "data/jobs.sqlite".into(),
            sitemap_url: "https://empleos.example.mx/sitemap-ofertas.xml".into(),
            detail_pattern: r"^https://empleos\.example\.mx/oferta/[a-z0-9-]+-(\d+)$".into(),
            concurrency: 10,
            max_retries: 3,
            base_backoff_ms: 2000,
            batch_size: 500,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        defaults()
            .context("Failed to set default settings")?
            .add_source(Environment::with_prefix("JOBS").try_parsing(true))
            .build()
            .context("Failed to read JOBS_* settings")?
            .try_deserialize()
            .context("Invalid JOBS_* settings")
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let d = Settings::default();
    Config::builder()
        .set_default("db_path", d.db_path)?
        .set_default("sitemap_url", d.sitemap_url)?
        .set_default("detail_pattern", d.detail_pattern)?
        .set_default("concurrency", d.concurrency as i64)?
        .set_default("max_retries", d.max_retries as i64)?
        .set_default("base_backoff_ms", d.base_backoff_ms as i64)?
        .set_default("batch_size", d.batch_size as i64)
}
