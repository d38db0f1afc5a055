use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::JobRecord;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            attempts   INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id             INTEGER PRIMARY KEY,
            page_id        INTEGER NOT NULL REFERENCES pages(id),
            url            TEXT NOT NULL,
            html           TEXT,
            status         INTEGER,
            classification TEXT,
            error          TEXT,
            latency_ms     INTEGER,
            scraped_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_page ON page_data(page_id);

        -- Append-only: a URL is recorded once
        CREATE TABLE IF NOT EXISTS jobs (
            id               INTEGER PRIMARY KEY,
            page_data_id     INTEGER NOT NULL REFERENCES page_data(id),
            url              TEXT UNIQUE NOT NULL,
            source           TEXT,
            title            TEXT NOT NULL,
            company          TEXT,
            location         TEXT,
            date_posted      TEXT,
            description_html TEXT,
            description_text TEXT,
            employment_type  TEXT,
            salary_currency  TEXT,
            salary_period    TEXT,
            salary_min       REAL,
            salary_max       REAL,
            salary_amount    REAL,
            salary_text      TEXT,
            record_json      TEXT NOT NULL,
            extracted_at     TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((description_html IS NULL) = (description_text IS NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company);

        CREATE TABLE IF NOT EXISTS rejections (
            id           INTEGER PRIMARY KEY,
            page_data_id INTEGER NOT NULL REFERENCES page_data(id),
            url          TEXT NOT NULL,
            reason       TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_rejections_reason ON rejections(reason);
        ",
    )?;
    Ok(())
}

// ── Queue ──

pub fn insert_pages(conn: &Connection, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url) VALUES (?1)")?;
        for url in urls {
            count += stmt.execute([url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// A queued page waiting to be fetched.
#[derive(Debug, Clone)]
pub struct QueuedPage {
    pub id: i64,
    pub url: String,
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<QueuedPage>> {
    let sql = format!(
        "SELECT id, url FROM pages WHERE visited = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueuedPage {
                id: row.get(0)?,
                url: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Put a page back in the queue after its stored body turned out to be a
/// wall; `max_attempts` stops a permanently blocked URL from cycling.
pub fn requeue(conn: &Connection, page_id: i64, max_attempts: u32) -> Result<bool> {
    let n = conn.execute(
        "UPDATE pages SET visited = 0 WHERE id = ?1 AND attempts < ?2",
        rusqlite::params![page_id, max_attempts],
    )?;
    Ok(n > 0)
}

pub struct ScrapeRow {
    pub page_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub classification: Option<&'static str>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Prepared statements for saving scrape results as they stream in.
pub struct ScrapeWriter<'c> {
    insert: rusqlite::Statement<'c>,
    visit: rusqlite::Statement<'c>,
}

impl<'c> ScrapeWriter<'c> {
    pub fn new(conn: &'c Connection) -> Result<Self> {
        Ok(Self {
            insert: conn.prepare(
                "INSERT INTO page_data (page_id, url, html, status, classification, error, latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            visit: conn.prepare(
                "UPDATE pages SET visited = 1, visited_at = datetime('now'), attempts = attempts + 1
                 WHERE id = ?1",
            )?,
        })
    }

    pub fn save(&mut self, row: &ScrapeRow) -> Result<()> {
        self.insert.execute(rusqlite::params![
            row.page_id, row.url, row.html, row.status, row.classification, row.error, row.latency_ms,
        ])?;
        self.visit.execute([row.page_id])?;
        Ok(())
    }
}

// ── Processing ──

/// A fetched body the extractor has not looked at yet.
#[derive(Debug, Clone)]
pub struct StoredPage {
    pub page_data_id: i64,
    pub page_id: i64,
    pub url: String,
    pub html: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let sql = format!(
        "SELECT pd.id, pd.page_id, pd.url, pd.html
         FROM page_data pd
         WHERE pd.html IS NOT NULL
           AND pd.classification = 'valid'
           AND NOT EXISTS (SELECT 1 FROM jobs j WHERE j.page_data_id = pd.id OR j.url = pd.url)
           AND NOT EXISTS (SELECT 1 FROM rejections r WHERE r.page_data_id = pd.id)
         ORDER BY pd.id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                page_data_id: row.get(0)?,
                page_id: row.get(1)?,
                url: row.get(2)?,
                html: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every job URL already on record, to seed a run's dedup set.
pub fn fetch_job_urls(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT url FROM jobs")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct RejectionRow {
    pub page_data_id: i64,
    pub url: String,
    pub reason: String,
}

/// Insert records and rejections in one transaction. Returns how many
/// records were new.
pub fn save_batch(
    conn: &Connection,
    records: &[(i64, &JobRecord)],
    rejections: &[RejectionRow],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    {
        let mut j_stmt = tx.prepare(
            "INSERT OR IGNORE INTO jobs
             (page_data_id, url, source, title, company, location, date_posted,
              description_html, description_text, employment_type,
              salary_currency, salary_period, salary_min, salary_max, salary_amount, salary_text,
              record_json)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
        )?;
        for (page_data_id, record) in records {
            let json = serde_json::to_value(record)?;
            let employment_type = match &json["employmentType"] {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            inserted += j_stmt.execute(rusqlite::params![
                page_data_id,
                record.url,
                record.source,
                record.title,
                record.company,
                record.location,
                record.date_posted_iso(),
                record.description_html(),
                record.description_text(),
                employment_type,
                json["salary_currency"].as_str(),
                json["salary_period"].as_str(),
                json["salary_min"].as_f64(),
                json["salary_max"].as_f64(),
                json["salary_amount"].as_f64(),
                json["salary_text"].as_str(),
                json.to_string(),
            ])?;
        }

        let mut r_stmt = tx.prepare(
            "INSERT INTO rejections (page_data_id, url, reason) VALUES (?1, ?2, ?3)",
        )?;
        for r in rejections {
            r_stmt.execute(rusqlite::params![r.page_data_id, r.url, r.reason])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub scraped: usize,
    pub errors: usize,
    pub blocked: usize,
    pub jobs: usize,
    pub rejections: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let total = count("SELECT COUNT(*) FROM pages")?;
    let visited = count("SELECT COUNT(*) FROM pages WHERE visited = 1")?;
    let scraped = count("SELECT COUNT(*) FROM page_data")?;
    let errors = count("SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL")?;
    let blocked = count(
        "SELECT COUNT(*) FROM page_data WHERE classification IS NOT NULL AND classification != 'valid'",
    )?;
    let jobs = count("SELECT COUNT(*) FROM jobs")?;

    let mut stmt = conn.prepare(
        "SELECT reason, COUNT(*) FROM rejections GROUP BY reason ORDER BY COUNT(*) DESC",
    )?;
    let rejections = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        scraped,
        errors,
        blocked,
        jobs,
        rejections,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{extract, Extraction, RawDocument};
    use chrono::TimeZone;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn scraped(conn: &Connection, url: &str, html: &str, classification: &'static str) -> i64 {
        insert_pages(conn, &[url.to_string()]).unwrap();
        let page = fetch_unvisited(conn, None)
            .unwrap()
            .into_iter()
            .find(|p| p.url == url)
            .unwrap();
        let mut w = ScrapeWriter::new(conn).unwrap();
        w.save(&ScrapeRow {
            page_id: page.id,
            url: url.into(),
            html: Some(html.into()),
            status: Some(200),
            classification: Some(classification),
            error: None,
            latency_ms: Some(10),
        })
        .unwrap();
        page.id
    }

    #[test]
    fn queue_dedups_urls() {
        let conn = memory();
        let urls = vec!["https://a/1".to_string(), "https://a/1".to_string(), "https://a/2".to_string()];
        assert_eq!(insert_pages(&conn, &urls).unwrap(), 2);
        assert_eq!(fetch_unvisited(&conn, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn only_valid_unprocessed_bodies_are_fetched() {
        let conn = memory();
        scraped(&conn, "https://a/1", "<h1>Cajero</h1>", "valid");
        scraped(&conn, "https://a/2", "<title>Inicia sesión</title>", "invalid-interstitial");
        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://a/1");
    }

    #[test]
    fn records_and_rejections_are_saved_once() {
        let conn = memory();
        let url = "https://empleos.example.mx/oferta/cajero-1";
        scraped(&conn, url, "<h1>Cajero de tienda</h1>", "valid");
        let page = fetch_unprocessed(&conn, None).unwrap().remove(0);

        let now = chrono::Utc.with_ymd_and_hms(2025, 10, 20, 0, 0, 0).unwrap();
        let Extraction::Record(record) = extract(&RawDocument::new(&page.url, &page.html), now).unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(save_batch(&conn, &[(page.page_data_id, &*record)], &[]).unwrap(), 1);
        assert_eq!(save_batch(&conn, &[(page.page_data_id, &*record)], &[]).unwrap(), 0);
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
        assert_eq!(fetch_job_urls(&conn).unwrap(), vec![url.to_string()]);

        let stored: String = conn
            .query_row("SELECT title FROM jobs WHERE url = ?1", [url], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "Cajero de tienda");

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.jobs, 1);
        assert_eq!(stats.visited, 1);
    }

    #[test]
    fn requeue_respects_attempt_cap() {
        let conn = memory();
        let id = scraped(&conn, "https://a/1", "<p></p>", "valid");
        assert!(requeue(&conn, id, 3).unwrap());
        assert!(!requeue(&conn, id, 1).unwrap());
    }
}
