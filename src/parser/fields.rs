use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::probes::{self, Locator, Page, Predicate, Probe};
use super::salary::Salary;
use super::sanitize::{self, Description};
use super::structured::StructuredJob;
use super::{company, dates, text, ExtractError};

pub const MAX_LOCATION_LEN: usize = 120;

/// Phrases that mark login walls and block pages rather than job content.
pub const INTERSTITIAL_PHRASES: &[&str] = &[
    "inicia sesión",
    "inicia sesion",
    "iniciar sesión",
    "iniciar sesion",
    "crea tu cuenta",
    "crear cuenta",
    "crear una cuenta",
    "regístrate para",
    "registrate para",
    "acceso denegado",
    "verifica que eres humano",
    "verificación de seguridad",
    "sign in",
    "log in",
    "create an account",
    "access denied",
    "verify you are human",
    "are you a robot",
];

static POSTED_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s,·|–-]*(?:publicad[oa]|actualizad[oa]|posted)?\s*\bhace\s+\S+.*$|[\s,·|–-]*\bposted\b.*\bago\b.*$")
        .unwrap()
});

const LOCATION_TAILS: &[&str] = &[
    "ver mapa",
    "ver en mapa",
    "ver en el mapa",
    "ver ubicación",
    "ver detalle legal",
    "aviso de privacidad",
    "view map",
];

static LOCATION_TAIL_RE: LazyLock<Regex> = LazyLock::new(|| company::phrase_regex(LOCATION_TAILS));

// ── Probe tables ──

const TITLE_REJECT: &[&str] = INTERSTITIAL_PHRASES;

pub const TITLE_PROBES: &[Probe] = &[
    Probe::new("jsonld.title", Locator::Structured(sj_title), Predicate::between(1, 400)),
    Probe::new(
        "detail.title-testid",
        Locator::Text(r#"[data-testid="job-title"]"#),
        Predicate::between(3, 250).rejecting(TITLE_REJECT),
    ),
    Probe::new(
        "detail.box-title",
        Locator::Text("h1.box_detail_title"),
        Predicate::between(3, 250).rejecting(TITLE_REJECT),
    ),
    Probe::new(
        "legacy.header-title",
        Locator::Text(".job-header h1, #job-title"),
        Predicate::between(3, 250).rejecting(TITLE_REJECT),
    ),
    Probe::new("generic.h1", Locator::Text("h1"), Predicate::between(3, 250).rejecting(TITLE_REJECT)),
    Probe::new(
        "generic.og-title",
        Locator::Attr(r#"meta[property="og:title"]"#, "content"),
        Predicate::between(3, 300),
    ),
];

const COMPANY_REJECT: &[&str] = &["inicia sesión", "iniciar sesión", "sign in", "log in"];

pub const COMPANY_PROBES: &[Probe] = &[
    Probe::new("jsonld.hiringOrganization", Locator::Structured(sj_company), Predicate::between(1, 400)),
    Probe::new(
        "detail.company-testid",
        Locator::Text(r#"[data-testid="company-name"]"#),
        Predicate::between(2, 400).rejecting(COMPANY_REJECT),
    ),
    Probe::new(
        "detail.company-link",
        Locator::Text(r#".box_detail a[href*="/empresas/"]"#),
        Predicate::between(2, 400).rejecting(COMPANY_REJECT),
    ),
    Probe::new(
        "legacy.company",
        Locator::Text(".job-header .company, [itemprop=\"hiringOrganization\"]"),
        Predicate::between(2, 400).rejecting(COMPANY_REJECT),
    ),
    Probe::new(
        "generic.company-class",
        Locator::Text(r#"[class*="company"], [class*="empresa"]"#),
        Predicate::between(2, 400).rejecting(COMPANY_REJECT),
    ),
];

pub const LOCATION_PROBES: &[Probe] = &[
    Probe::new("jsonld.jobLocation", Locator::Structured(sj_location), Predicate::between(1, 400)),
    Probe::new(
        "detail.location-testid",
        Locator::Text(r#"[data-testid="job-location"]"#),
        Predicate::between(2, 300),
    ),
    Probe::new(
        "detail.location-box",
        Locator::Text(".box_detail .location, .box_detail [itemprop=\"addressLocality\"]"),
        Predicate::between(2, 300),
    ),
    Probe::new(
        "legacy.location",
        Locator::Text(".job-header .location"),
        Predicate::between(2, 300),
    ),
    Probe::new(
        "generic.location-class",
        Locator::Text(r#"[class*="location"], [class*="ubicacion"]"#),
        Predicate::between(2, 300),
    ),
];

pub const DATE_PROBES: &[Probe] = &[
    Probe::new("jsonld.datePosted", Locator::Structured(sj_date), Predicate::between(1, 80)),
    Probe::new("detail.time", Locator::Attr("time[datetime]", "datetime"), Predicate::between(8, 40)),
    Probe::new(
        "detail.date-testid",
        Locator::Text(r#"[data-testid="job-date"]"#),
        Predicate::between(3, 80),
    ),
    Probe::new("legacy.date", Locator::Text(".job-header .date"), Predicate::between(3, 80)),
    Probe::new(
        "generic.date-class",
        Locator::Text(r#"[class*="date"], [class*="fecha"]"#),
        Predicate::between(3, 80),
    ),
];

pub const EMPLOYMENT_TYPE_PROBES: &[Probe] = &[
    Probe::new(
        "detail.jobtype-testid",
        Locator::Text(r#"[data-testid="job-type"]"#),
        Predicate::between(3, 60),
    ),
    Probe::new(
        "detail.contract",
        Locator::Text(".box_detail .contract, .box_detail [itemprop=\"employmentType\"]"),
        Predicate::between(3, 60),
    ),
    Probe::new(
        "generic.jornada-class",
        Locator::Text(r#"[class*="jornada"], [class*="contrato"]"#),
        Predicate::between(3, 60),
    ),
];

pub const SALARY_TEXT_PROBES: &[Probe] = &[
    Probe::new(
        "detail.salary-testid",
        Locator::Text(r#"[data-testid="job-salary"]"#),
        Predicate::between(2, 120).with_digit(),
    ),
    Probe::new(
        "detail.salary-box",
        Locator::Text(".box_detail .salary"),
        Predicate::between(2, 120).with_digit(),
    ),
    Probe::new(
        "generic.salary-class",
        Locator::Text(r#"[class*="salary"], [class*="sueldo"], [class*="salario"]"#),
        Predicate::between(2, 120).with_digit(),
    ),
];

pub const DESCRIPTION_PROBES: &[Probe] = &[
    Probe::new("jsonld.description", Locator::Structured(sj_description), Predicate::between(1, usize::MAX)),
    Probe::new(
        "detail.description-testid",
        Locator::Markup(r#"[data-testid="job-description"]"#),
        Predicate::between(30, usize::MAX),
    ),
    Probe::new(
        "detail.description-box",
        Locator::Markup(".box_detail .description, #job-description"),
        Predicate::between(30, usize::MAX),
    ),
    Probe::new(
        "generic.description-class",
        Locator::Markup(r#"[class*="description"], [class*="descripcion"]"#),
        Predicate::between(30, usize::MAX),
    ),
    Probe::new(
        "generic.og-description",
        Locator::Attr(r#"meta[property="og:description"]"#, "content"),
        Predicate::between(30, usize::MAX),
    ),
];

fn sj_title(s: &StructuredJob) -> Option<String> {
    s.title.clone()
}

fn sj_company(s: &StructuredJob) -> Option<String> {
    s.company.clone()
}

fn sj_location(s: &StructuredJob) -> Option<String> {
    s.location.clone()
}

fn sj_date(s: &StructuredJob) -> Option<String> {
    s.date_posted.clone()
}

fn sj_description(s: &StructuredJob) -> Option<String> {
    s.description.clone()
}

// ── Resolution ──

/// Serialized as a bare string or a list, the way the posting published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EmploymentType {
    One(String),
    Many(Vec<String>),
}

/// Every field after post-processing, plus the probe that produced it.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
    pub employment_type: Option<EmploymentType>,
    pub salary: Option<Salary>,
    pub description: Option<Description>,
    pub provenance: Vec<(&'static str, &'static str)>,
}

pub fn resolve_all(page: &Page, now: DateTime<Utc>) -> Result<Fields, ExtractError> {
    let mut fields = Fields::default();

    if let Some(c) = probes::resolve(page, TITLE_PROBES)? {
        fields.provenance.push(("title", c.probe));
        fields.title = Some(c.text);
    }

    if let Some((c, name)) = probes::resolve_with(page, COMPANY_PROBES, |c| company::clean(&c.raw))? {
        fields.provenance.push(("company", c.probe));
        fields.company = Some(name);
    }

    if let Some((c, loc)) = probes::resolve_with(page, LOCATION_PROBES, |c| clean_location(&c.text))? {
        fields.provenance.push(("location", c.probe));
        fields.location = Some(loc);
    }

    if let Some(c) = probes::resolve(page, DATE_PROBES)? {
        fields.date_posted = dates::interpret(&c.text, now);
        if fields.date_posted.is_some() {
            fields.provenance.push(("date_posted", c.probe));
        }
    }

    fields.employment_type = match page.structured.map(|s| s.employment_type.as_slice()) {
        Some([one]) => {
            fields.provenance.push(("employment_type", "jsonld.employmentType"));
            Some(EmploymentType::One(one.clone()))
        }
        Some(many @ [_, _, ..]) => {
            fields.provenance.push(("employment_type", "jsonld.employmentType"));
            Some(EmploymentType::Many(many.to_vec()))
        }
        _ => probes::resolve(page, EMPLOYMENT_TYPE_PROBES)?.map(|c| {
            fields.provenance.push(("employment_type", c.probe));
            EmploymentType::One(c.text)
        }),
    };

    fields.salary = match page.structured.and_then(|s| s.salary.clone()) {
        Some(structured) => {
            fields.provenance.push(("salary", "jsonld.baseSalary"));
            Some(Salary::Structured(structured))
        }
        None => probes::resolve(page, SALARY_TEXT_PROBES)?.map(|c| {
            fields.provenance.push(("salary", c.probe));
            Salary::Text(c.text)
        }),
    };

    // A description the sanitizer rejects stays rejected; it does not fall
    // through to weaker probes.
    if let Some(c) = probes::resolve(page, DESCRIPTION_PROBES)? {
        fields.description = sanitize::from_raw(&c.raw);
        if fields.description.is_some() {
            fields.provenance.push(("description", c.probe));
        }
    }

    Ok(fields)
}

/// Drop "publicado hace …" suffixes and map/legal tails; `None` when nothing
/// is left.
pub fn clean_location(raw: &str) -> Option<String> {
    let collapsed = text::collapse(raw);
    let mut loc = POSTED_SUFFIX_RE.replace(&collapsed, "").into_owned();

    if let Some(pos) = LOCATION_TAIL_RE.find_iter(&loc).map(|m| m.start()).find(|&pos| pos > 0) {
        loc.truncate(pos);
    }

    let trimmed = loc.trim_end_matches(|c: char| c.is_whitespace() || ",.;:-–·|".contains(c));
    text::normalize(trimmed, MAX_LOCATION_LEN)
}
