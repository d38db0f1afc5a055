use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use jobboard_scraper::config::Settings;
use jobboard_scraper::parser::{self, Extraction, RawDocument};
use jobboard_scraper::run::{self, RunState};
use jobboard_scraper::{db, fetcher, sitemap};

#[derive(Parser)]
#[command(name = "jobboard_scraper", about = "Job posting scraper and extractor via spider.cloud")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sitemap and populate URL queue
    Init,
    /// Fetch unvisited pages via spider.cloud
    Scrape {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract job records from fetched pages
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Stop after saving this many new records
        #[arg(short, long)]
        target: Option<usize>,
    },
    /// Scrape + process in one pipeline
    Run {
        /// Max pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Stop after saving this many new records
        #[arg(short, long)]
        target: Option<usize>,
    },
    /// Extract one document (local HTML file or URL) and print the record as JSON
    Extract {
        /// Path to an HTML file, or an http(s) URL to fetch
        input: String,
        /// Canonical URL of the document when reading from a file
        #[arg(long)]
        url: Option<String>,
    },
    /// Show scraping statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init => {
            let conn = open(&settings)?;
            let urls = sitemap::fetch_detail_urls(&settings.sitemap_url, &settings.detail_pattern).await?;
            let inserted = db::insert_pages(&conn, &urls)?;
            println!("Inserted {} new job URLs ({} total found)", inserted, urls.len());
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = open(&settings)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are scraped.");
                return Ok(());
            }
            println!("Scraping {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::scrape_pages_streaming(&conn, pages, &settings).await?;
            println!(
                "Done: {} scraped ({} ok, {} blocked, {} errors).",
                stats.total, stats.ok, stats.blocked, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit, target } => {
            let conn = open(&settings)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let mut state = RunState::new(target, db::fetch_job_urls(&conn)?);
            run::process_pages(&conn, &pages, &mut state, &settings, Utc::now())?;
            state.print();
            Ok(())
        }
        Commands::Run { limit, target } => {
            let conn = open(&settings)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Scrape (streaming to DB)
            let t_scrape = Instant::now();
            println!("Pipeline: scraping {} pages (streaming to DB)...", pages.len());
            let stats = fetcher::scrape_pages_streaming(&conn, pages, &settings).await?;
            println!(
                "Scraped {} pages ({} ok, {} blocked, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.blocked,
                stats.errors,
                t_scrape.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (no genuine pages were fetched).");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let mut state = RunState::new(target, db::fetch_job_urls(&conn)?);
            run::process_pages(&conn, &unprocessed, &mut state, &settings, Utc::now())?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            state.print();
            Ok(())
        }
        Commands::Extract { input, url } => extract_one(&input, url).await,
        Commands::Stats => {
            let conn = open(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Total:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Scraped:   {}", s.scraped);
            println!("Errors:    {}", s.errors);
            println!("Blocked:   {}", s.blocked);
            println!("Jobs:      {}", s.jobs);
            for (reason, n) in &s.rejections {
                println!("  {:<26} {}", reason, n);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open(settings: &Settings) -> Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

async fn extract_one(input: &str, url: Option<String>) -> Result<()> {
    let doc = if input.starts_with("http://") || input.starts_with("https://") {
        let html = fetcher::scrape_single_page(input).await?;
        RawDocument::new(url.unwrap_or_else(|| input.to_string()), html)
    } else {
        let path = PathBuf::from(input);
        let html = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let url = url.unwrap_or_else(|| format!("file://{}", path.display()));
        RawDocument::new(url, html)
    };

    let extraction = parser::extract(&doc, Utc::now())
        .with_context(|| format!("Failed to extract {}", doc.url))?;
    match &extraction {
        Extraction::Record(record) => {
            println!("{}", serde_json::to_string_pretty(record)?);
            for (field, probe) in extraction.winning_probes() {
                tracing::debug!(field, probe, "winning probe");
            }
        }
        other => eprintln!("No record for {}: {}", doc.url, other.outcome()),
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
