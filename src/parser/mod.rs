pub mod classify;
pub mod company;
pub mod dates;
pub mod fields;
pub mod probes;
pub mod record;
pub mod salary;
pub mod sanitize;
pub mod structured;
pub mod text;

use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::debug;

pub use classify::{Classification, PageKind, Signal};
pub use record::{JobRecord, Rejection};

/// Fetched markup plus its canonical URL.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub content: String,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }
}

/// Faults in the engine itself, as opposed to pages that simply lack data.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid probe selector {selector:?}: {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Record(Box<JobRecord>),
    Rejected(Rejection),
    /// The page was a wall or came back empty; fetch it again.
    Retry(Classification),
}

impl Extraction {
    /// Which probe produced each field of an accepted record.
    pub fn winning_probes(&self) -> &[(&'static str, &'static str)] {
        match self {
            Extraction::Record(record) => &record.provenance,
            _ => &[],
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Extraction::Record(_) => "record",
            Extraction::Rejected(r) => r.as_str(),
            Extraction::Retry(c) => c.as_str(),
        }
    }
}

/// Classify a detail page and, if it is genuine, build its record.
///
/// Pure and synchronous: `now` anchors relative dates, so the same input
/// always yields the same output.
pub fn extract(doc: &RawDocument, now: DateTime<Utc>) -> Result<Extraction, ExtractError> {
    let html = Html::parse_document(&doc.content);

    let classification = classify::classify(&html, PageKind::Detail)?;
    if !classification.is_valid() {
        debug!(url = %doc.url, %classification, "page needs retry");
        return Ok(Extraction::Retry(classification));
    }

    let structured = structured::read(&html);
    let page = probes::Page {
        html: &html,
        structured: structured.as_ref(),
    };
    let fields = fields::resolve_all(&page, now)?;

    Ok(match record::assemble(&doc.url, fields) {
        Ok(record) => Extraction::Record(Box::new(record)),
        Err(rejection) => {
            debug!(url = %doc.url, %rejection, "record rejected");
            Extraction::Rejected(rejection)
        }
    })
}
