use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::salary::{self, StructuredSalary};
use super::text;

const JOB_POSTING_TYPE: &str = "JobPosting";

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Projection of the first schema.org `JobPosting` embedded in a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredJob {
    pub title: Option<String>,
    pub company: Option<String>,
    pub date_posted: Option<String>,
    /// Either markup or plain text, as published.
    pub description: Option<String>,
    pub location: Option<String>,
    pub salary: Option<StructuredSalary>,
    pub employment_type: Vec<String>,
}

/// Number of JSON-LD script blocks on the page, parsable or not.
pub fn block_count(doc: &Html) -> usize {
    doc.select(&LD_JSON).count()
}

/// Scan every JSON-LD block and project the first job posting found.
pub fn read(doc: &Html) -> Option<StructuredJob> {
    let mut postings = Vec::new();
    for (idx, script) in doc.select(&LD_JSON).enumerate() {
        let raw: String = script.text().collect();
        let body = raw
            .trim()
            .trim_start_matches("<![CDATA[")
            .trim_end_matches("]]>")
            .trim();
        match serde_json::from_str::<Value>(body) {
            Ok(value) => collect_postings(value, &mut postings),
            Err(e) => debug!(block = idx, error = %e, "skipping malformed JSON-LD block"),
        }
    }
    postings.first().map(project)
}

fn collect_postings(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_postings(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_postings(graph, out);
            }
            let obj = Value::Object(map);
            if is_job_posting(&obj) {
                out.push(obj);
            }
        }
        _ => {}
    }
}

fn is_job_posting(v: &Value) -> bool {
    match v.get("@type") {
        Some(Value::String(t)) => is_job_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_job_type),
        _ => false,
    }
}

fn is_job_type(t: &str) -> bool {
    let t = t.trim();
    t == JOB_POSTING_TYPE || t.rsplit('/').next() == Some(JOB_POSTING_TYPE)
}

fn project(item: &Value) -> StructuredJob {
    let title = str_at(item, "title").or_else(|| str_at(item, "name"));

    let company = match item.get("hiringOrganization") {
        Some(Value::String(s)) => non_empty(s),
        Some(org) => str_at(org, "name"),
        None => None,
    };

    let description = item
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let employment_type = match item.get("employmentType") {
        Some(Value::String(s)) => non_empty(s).into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).filter_map(non_empty).collect(),
        _ => Vec::new(),
    };

    StructuredJob {
        title,
        company,
        date_posted: str_at(item, "datePosted"),
        description,
        location: item.get("jobLocation").and_then(flatten_location),
        salary: item.get("baseSalary").and_then(salary::normalize),
        employment_type,
    }
}

/// `jobLocation` may be one `Place` or a list of them; each contributes its
/// locality, region and country joined by ", ", places joined by "; ".
fn flatten_location(v: &Value) -> Option<String> {
    let places: Vec<&Value> = match v {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let joined: Vec<String> = places
        .into_iter()
        .filter_map(place_parts)
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join("; "))
    }
}

fn place_parts(place: &Value) -> Option<String> {
    let address = place.get("address").unwrap_or(place);
    if let Value::String(s) = address {
        return non_empty(s);
    }

    let mut parts: Vec<String> = Vec::new();
    for key in ["addressLocality", "addressRegion", "addressCountry"] {
        let part = match address.get(key) {
            Some(Value::String(s)) => non_empty(s),
            Some(obj @ Value::Object(_)) => str_at(obj, "name"),
            _ => None,
        };
        if let Some(part) = part {
            if parts.last().map(|p| p.eq_ignore_ascii_case(&part)) != Some(true) {
                parts.push(part);
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn str_at(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    text::normalize(s, usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(blocks: &[&str]) -> Html {
        let scripts: String = blocks
            .iter()
            .map(|b| format!(r#"<script type="application/ld+json">{b}</script>"#))
            .collect();
        Html::parse_document(&format!("<html><head>{scripts}</head><body></body></html>"))
    }

    #[test]
    fn no_blocks_is_none() {
        assert_eq!(read(&page(&[])), None);
    }

    #[test]
    fn non_job_types_are_ignored() {
        let doc = page(&[r#"{"@type": "Organization", "name": "Empresa"}"#, r#"{"@type":"BreadcrumbList"}"#]);
        assert_eq!(read(&doc), None);
    }

    #[test]
    fn malformed_block_does_not_stop_scan() {
        let doc = page(&[
            r#"{"@type": "JobPosting", "title": "#,
            r#"{"@type": "JobPosting", "title": "Cajero"}"#,
        ]);
        assert_eq!(read(&doc).unwrap().title.as_deref(), Some("Cajero"));
    }

    #[test]
    fn array_and_type_array_variants() {
        let doc = page(&[r#"[{"@type":"WebSite"},{"@type":["Thing","JobPosting"],"name":"Almacenista"}]"#]);
        assert_eq!(read(&doc).unwrap().title.as_deref(), Some("Almacenista"));
    }

    #[test]
    fn graph_wrapper() {
        let doc = page(&[r#"{"@context":"https://schema.org","@graph":[{"@type":"WebPage"},{"@type":"JobPosting","title":"Chofer"}]}"#]);
        assert_eq!(read(&doc).unwrap().title.as_deref(), Some("Chofer"));
    }

    #[test]
    fn full_projection() {
        let doc = page(&[r#"{
            "@context": "https://schema.org/",
            "@type": "JobPosting",
            "title": "Asesor de Ventas",
            "datePosted": "2025-10-18",
            "description": "<p>Atención a clientes</p>",
            "employmentType": ["FULL_TIME", "TEMPORARY"],
            "hiringOrganization": {"@type": "Organization", "name": "Empresa XYZ"},
            "jobLocation": [
                {"@type": "Place", "address": {"addressLocality": "Ciudad de México", "addressRegion": "Ciudad de México", "addressCountry": "MX"}},
                {"@type": "Place", "address": {"addressLocality": "Monterrey", "addressRegion": "Nuevo León", "addressCountry": {"@type": "Country", "name": "MX"}}}
            ],
            "baseSalary": {"@type": "MonetaryAmount", "currency": "MXN", "value": {"@type": "QuantitativeValue", "minValue": 10000, "maxValue": 15000, "unitText": "MONTH"}}
        }"#]);
        let job = read(&doc).unwrap();
        assert_eq!(job.company.as_deref(), Some("Empresa XYZ"));
        assert_eq!(job.date_posted.as_deref(), Some("2025-10-18"));
        assert_eq!(
            job.location.as_deref(),
            Some("Ciudad de México, MX; Monterrey, Nuevo León, MX")
        );
        assert_eq!(job.employment_type, vec!["FULL_TIME", "TEMPORARY"]);
        let salary = job.salary.unwrap();
        assert_eq!(salary.min(), Some(10000.0));
        assert_eq!(salary.currency.as_deref(), Some("MXN"));
    }

    #[test]
    fn organization_as_string_and_cdata() {
        let doc = page(&[r#"<![CDATA[{"@type":"JobPosting","title":"Guardia","hiringOrganization":"Seguridad Privada SA"}]]>"#]);
        let job = read(&doc).unwrap();
        assert_eq!(job.company.as_deref(), Some("Seguridad Privada SA"));
        assert!(job.salary.is_none());
        assert!(job.employment_type.is_empty());
    }

    #[test]
    fn first_posting_wins() {
        let doc = page(&[
            r#"{"@type":"JobPosting","title":"Primero"}"#,
            r#"{"@type":"JobPosting","title":"Segundo"}"#,
        ]);
        assert_eq!(read(&doc).unwrap().title.as_deref(), Some("Primero"));
    }
}
