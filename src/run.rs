use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::Settings;
use crate::db::{self, RejectionRow, StoredPage};
use crate::parser::{self, Extraction, JobRecord, RawDocument};

/// Run-wide accumulator threaded through every batch.
#[derive(Debug, Default)]
pub struct RunState {
    /// Stop once this many new records are saved.
    pub target: Option<usize>,
    pub saved: usize,
    seen: HashSet<String>,
    tallies: BTreeMap<&'static str, usize>,
}

impl RunState {
    pub fn new(target: Option<usize>, known_urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            target,
            seen: known_urls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn done(&self) -> bool {
        self.target.is_some_and(|t| self.saved >= t)
    }

    /// False when the URL was already recorded in this or an earlier run.
    fn claim(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    fn tally(&mut self, outcome: &'static str) {
        *self.tallies.entry(outcome).or_default() += 1;
    }

    pub fn count(&self, outcome: &str) -> usize {
        self.tallies.get(outcome).copied().unwrap_or(0)
    }

    pub fn print(&self) {
        println!("Saved {} job records.", self.saved);
        for (outcome, n) in &self.tallies {
            println!("  {:<26} {}", outcome, n);
        }
    }
}

/// Extract every page in parallel batches and persist results in order,
/// stopping as soon as the state's target is reached.
pub fn process_pages(
    conn: &Connection,
    pages: &[StoredPage],
    state: &mut RunState,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<()> {
    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    for chunk in pages.chunks(settings.batch_size.max(1)) {
        if state.done() {
            break;
        }

        let results = chunk
            .par_iter()
            .map(|page| {
                let doc = RawDocument::new(page.url.as_str(), page.html.as_str());
                parser::extract(&doc, now).with_context(|| format!("Failed to extract {}", page.url))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut records: Vec<(i64, &JobRecord)> = Vec::new();
        let mut rejections = Vec::new();

        for (page, extraction) in chunk.iter().zip(&results) {
            if state.done() {
                break;
            }
            match extraction {
                Extraction::Record(record) => {
                    if !state.claim(&record.url) {
                        debug!(url = %record.url, "duplicate record skipped");
                        state.tally("duplicate");
                        continue;
                    }
                    records.push((page.page_data_id, record.as_ref()));
                    state.saved += 1;
                }
                Extraction::Rejected(_) => rejections.push(rejection(page, extraction)),
                Extraction::Retry(_) => {
                    rejections.push(rejection(page, extraction));
                    if db::requeue(conn, page.page_id, settings.max_retries + 1)? {
                        debug!(url = %page.url, "page requeued for another fetch");
                    }
                }
            }
            state.tally(extraction.outcome());
        }

        db::save_batch(conn, &records, &rejections)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    info!(saved = state.saved, target = ?state.target, "processing finished");
    Ok(())
}

fn rejection(page: &StoredPage, extraction: &Extraction) -> RejectionRow {
    RejectionRow {
        page_data_id: page.page_data_id,
        url: page.url.clone(),
        reason: extraction.outcome().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ScrapeRow, ScrapeWriter};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap()
    }

    fn store(conn: &Connection, pages: &[(&str, &str)]) {
        let urls: Vec<String> = pages.iter().map(|(u, _)| u.to_string()).collect();
        db::insert_pages(conn, &urls).unwrap();
        let queued = db::fetch_unvisited(conn, None).unwrap();
        let mut w = ScrapeWriter::new(conn).unwrap();
        for (q, (_, html)) in queued.iter().zip(pages) {
            w.save(&ScrapeRow {
                page_id: q.id,
                url: q.url.clone(),
                html: Some(html.to_string()),
                status: Some(200),
                classification: Some("valid"),
                error: None,
                latency_ms: None,
            })
            .unwrap();
        }
    }

    fn setup(pages: &[(&str, &str)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        store(&conn, pages);
        conn
    }

    const JOB_A: &str = "<html><body><h1>Asesor de Ventas</h1></body></html>";
    const JOB_B: &str = "<html><body><h1>Chofer Repartidor</h1></body></html>";

    #[test]
    fn stops_at_target() {
        let conn = setup(&[("https://e.mx/oferta/a-1", JOB_A), ("https://e.mx/oferta/b-2", JOB_B)]);
        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        let mut state = RunState::new(Some(1), []);
        process_pages(&conn, &pages, &mut state, &Settings::default(), now()).unwrap();

        assert_eq!(state.saved, 1);
        assert!(state.done());
        assert_eq!(db::fetch_unprocessed(&conn, None).unwrap().len(), 1);
    }

    #[test]
    fn known_urls_are_not_saved_again() {
        let conn = setup(&[("https://e.mx/oferta/a-1", JOB_A)]);
        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        let mut state = RunState::new(None, ["https://e.mx/oferta/a-1".to_string()]);
        process_pages(&conn, &pages, &mut state, &Settings::default(), now()).unwrap();
        assert_eq!(state.saved, 0);
        assert_eq!(state.count("duplicate"), 1);
    }

    #[test]
    fn rejections_and_retries_are_logged() {
        let conn = setup(&[
            ("https://e.mx/oferta/a-1", JOB_A),
            ("https://e.mx/oferta/x-2", "<html><body><p>Sin contenido</p></body></html>"),
            ("https://e.mx/oferta/y-3", r#"<head><meta property="og:title" content="Ok"></head>"#),
        ]);
        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        let mut state = RunState::new(None, []);
        process_pages(&conn, &pages, &mut state, &Settings::default(), now()).unwrap();

        assert_eq!(state.saved, 1);
        assert_eq!(state.count("record"), 1);
        assert_eq!(state.count("invalid-no-content"), 1);
        assert_eq!(state.count("missing-title"), 1);
        assert!(db::fetch_unprocessed(&conn, None).unwrap().is_empty());
        // the empty page went back into the fetch queue
        assert_eq!(db::fetch_unvisited(&conn, None).unwrap().len(), 1);
    }
}
