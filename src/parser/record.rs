use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use url::Url;

use super::classify::WALL_PHRASES;
use super::fields::{EmploymentType, Fields, INTERSTITIAL_PHRASES};
use super::salary::Salary;
use super::sanitize::Description;
use super::text;

pub const MAX_TITLE_LEN: usize = 200;

/// One accepted job posting. Built once by [`assemble`], never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub url: String,
    pub source: Option<String>,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
    pub description: Option<Description>,
    pub employment_type: Option<EmploymentType>,
    pub salary: Option<Salary>,
    /// `(field, probe)` pairs, not serialized.
    pub provenance: Vec<(&'static str, &'static str)>,
}

impl JobRecord {
    pub fn date_posted_iso(&self) -> Option<String> {
        self.date_posted
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn description_html(&self) -> Option<&str> {
        self.description.as_ref().map(|d| d.html.as_str())
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_ref().map(|d| d.text.as_str())
    }
}

impl Serialize for JobRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let structured = match &self.salary {
            Some(Salary::Structured(s)) => Some(s),
            _ => None,
        };
        let salary_text = match &self.salary {
            Some(Salary::Text(t)) => Some(t.as_str()),
            _ => None,
        };

        let mut state = serializer.serialize_struct("JobRecord", 15)?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("title", &self.title)?;
        state.serialize_field("company", &self.company)?;
        state.serialize_field("location", &self.location)?;
        state.serialize_field("datePosted", &self.date_posted_iso())?;
        state.serialize_field("description_html", &self.description_html())?;
        state.serialize_field("description_text", &self.description_text())?;
        state.serialize_field("employmentType", &self.employment_type)?;
        state.serialize_field("salary_currency", &structured.and_then(|s| s.currency.as_deref()))?;
        state.serialize_field("salary_period", &structured.and_then(|s| s.period.as_deref()))?;
        state.serialize_field("salary_min", &structured.and_then(|s| s.min()))?;
        state.serialize_field("salary_max", &structured.and_then(|s| s.max()))?;
        state.serialize_field("salary_amount", &structured.and_then(|s| s.amount))?;
        state.serialize_field("salary_text", &salary_text)?;
        state.end()
    }
}

/// Why a page with otherwise valid markup produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingTitle,
    TitleTooLong(usize),
    InterstitialTitle,
    InterstitialDescription,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MissingTitle => "missing-title",
            Rejection::TitleTooLong(_) => "title-too-long",
            Rejection::InterstitialTitle => "interstitial-title",
            Rejection::InterstitialDescription => "interstitial-description",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TitleTooLong(len) => write!(f, "{} ({len} chars)", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Apply the cross-field guards and build the record.
pub fn assemble(url: &str, fields: Fields) -> Result<JobRecord, Rejection> {
    let title = fields.title.ok_or(Rejection::MissingTitle)?;

    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(Rejection::TitleTooLong(len));
    }
    if text::contains_any(&text::fold(&title), INTERSTITIAL_PHRASES) {
        return Err(Rejection::InterstitialTitle);
    }
    // Descriptions legitimately mention accounts and sign-ups; only the
    // wall phrasing itself disqualifies them.
    if let Some(desc) = &fields.description {
        if text::contains_any(&text::fold(&desc.text), WALL_PHRASES) {
            return Err(Rejection::InterstitialDescription);
        }
    }

    Ok(JobRecord {
        url: url.to_string(),
        source: source_of(url),
        title,
        company: fields.company,
        location: fields.location,
        date_posted: fields.date_posted,
        description: fields.description,
        employment_type: fields.employment_type,
        salary: fields.salary,
        provenance: fields.provenance,
    })
}

/// Host of the page URL without a leading `www.`.
pub fn source_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}
