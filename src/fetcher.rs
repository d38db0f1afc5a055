use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use rusqlite::Connection;
use scraper::Html;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{QueuedPage, ScrapeRow, ScrapeWriter};
use crate::parser::classify::{self, Classification, PageKind};

/// Scrape stats returned after completion.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub total: usize,
    pub ok: usize,
    pub blocked: usize,
    pub errors: usize,
}

/// Retry knobs shared by every worker.
#[derive(Debug, Clone)]
struct RetryPolicy {
    max_retries: u32,
    base_backoff_ms: u64,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

fn spider_client() -> Result<Spider> {
    let api_key = std::env::var("SPIDER_API_KEY")
        .map_err(|_| anyhow!("SPIDER_API_KEY environment variable must be set"))?;
    Spider::new(Some(api_key)).map_err(|e| anyhow!("Failed to create Spider client: {}", e))
}

/// Scrape pages concurrently, saving each result to DB as it arrives.
pub async fn scrape_pages_streaming(
    conn: &Connection,
    pages: Vec<QueuedPage>,
    settings: &Settings,
) -> Result<ScrapeStats> {
    let spider = Arc::new(spider_client()?);
    let detail_re = Arc::new(Regex::new(&settings.detail_pattern).context("Invalid detail URL pattern")?);
    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let policy = RetryPolicy {
        max_retries: settings.max_retries,
        base_backoff_ms: settings.base_backoff_ms,
    };
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Workers send results, the loop below saves them
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ScrapeRow>(settings.concurrency.max(1) * 2);

    for page in pages {
        let spider = Arc::clone(&spider);
        let sem = Arc::clone(&semaphore);
        let detail_re = Arc::clone(&detail_re);
        let policy = policy.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let kind = page_kind(&detail_re, &page.url);
            let row = match scrape_with_retry(&spider, &page, kind, &policy).await {
                Ok(row) => row,
                Err(e) => {
                    warn!("Task failed for {}: {:#}", page.url, e);
                    // Still record the attempt so the page is marked visited
                    ScrapeRow {
                        page_id: page.id,
                        url: page.url,
                        html: None,
                        status: None,
                        classification: None,
                        error: Some(e.to_string()),
                        latency_ms: None,
                    }
                }
            };
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every worker has dropped its sender
    drop(tx);

    let mut stats = ScrapeStats {
        total,
        ..Default::default()
    };
    let mut writer = ScrapeWriter::new(conn)?;

    while let Some(row) = rx.recv().await {
        match (&row.error, row.classification) {
            (Some(_), _) => stats.errors += 1,
            (None, Some("valid")) => stats.ok += 1,
            (None, _) => stats.blocked += 1,
        }
        writer.save(&row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} pages ({} ok, {} blocked, {} errors)",
        stats.total, stats.ok, stats.blocked, stats.errors
    );
    Ok(stats)
}

pub fn page_kind(detail_re: &Regex, url: &str) -> PageKind {
    if detail_re.is_match(url) {
        PageKind::Detail
    } else {
        PageKind::Listing
    }
}

/// Fetch until the page is genuine or retries run out. Rate limits, server
/// errors and walls all back off and try again with a fresh request.
async fn scrape_with_retry(
    spider: &Spider,
    page: &QueuedPage,
    kind: PageKind,
    policy: &RetryPolicy,
) -> Result<ScrapeRow> {
    let mut attempt = 0;
    loop {
        let row = scrape_one(spider, page, kind).await?;

        let reason = match (&row.error, row.classification) {
            (Some(e), _) if is_transient(e) => Some(e.clone()),
            (None, Some(c)) if c != Classification::Valid.as_str() => Some(c.to_string()),
            _ => None,
        };

        let Some(reason) = reason else {
            return Ok(row);
        };
        if attempt >= policy.max_retries {
            warn!("Giving up on {} after {} attempts: {}", page.url, attempt + 1, reason);
            return Ok(row);
        }

        let backoff = policy.backoff(attempt);
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            reason,
            page.url,
            attempt + 1,
            policy.max_retries,
            backoff.as_secs_f64()
        );
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

fn is_transient(error: &str) -> bool {
    ["429", "rate", "500", "502", "503", "504", "timed out"]
        .iter()
        .any(|marker| error.contains(marker))
}

async fn scrape_one(spider: &Spider, page: &QueuedPage, kind: PageKind) -> Result<ScrapeRow> {
    let start = Instant::now();
    let response = spider
        .scrape_url(&page.url, Some(raw_params()), "application/json")
        .await;
    let elapsed = start.elapsed().as_millis() as i64;

    let row = match response {
        Ok(value) => {
            let (html, status) = parse_response(value);
            let classification = html
                .as_deref()
                .map(|h| classify_html(h, kind))
                .transpose()?
                .map(Classification::as_str);
            ScrapeRow {
                page_id: page.id,
                url: page.url.clone(),
                html,
                status,
                classification,
                error: None,
                latency_ms: Some(elapsed),
            }
        }
        Err(e) => ScrapeRow {
            page_id: page.id,
            url: page.url.clone(),
            html: None,
            status: None,
            classification: None,
            error: Some(e.to_string()),
            latency_ms: Some(elapsed),
        },
    };
    Ok(row)
}

/// Parses and drops the DOM before the caller awaits again.
fn classify_html(html: &str, kind: PageKind) -> Result<Classification> {
    let doc = Html::parse_document(html);
    Ok(classify::classify(&doc, kind)?)
}

fn raw_params() -> RequestParams {
    RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
        ..Default::default()
    }
}

/// Spider answers with a JSON array (sometimes double-encoded as a string)
/// of `{content, status}` objects.
fn parse_response(value: serde_json::Value) -> (Option<String>, Option<i32>) {
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(value.clone()),
        None => value,
    };
    let first = parsed.as_array().and_then(|arr| arr.first());

    let content = first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string);
    let status = first
        .and_then(|obj| obj.get("status"))
        .and_then(|s| s.as_i64())
        .map(|s| s as i32);
    (content, status)
}

/// Fetch a single URL and return its raw HTML.
pub async fn scrape_single_page(url: &str) -> Result<String> {
    let spider = spider_client()?;
    let response = spider
        .scrape_url(url, Some(raw_params()), "application/json")
        .await
        .map_err(|e| anyhow!("Spider scrape failed: {}", e))?;

    parse_response(response)
        .0
        .ok_or_else(|| anyhow!("No content in spider response"))
}
