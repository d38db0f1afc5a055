//! Declarative field probes and the one resolver that walks them.
//!
//! Each field owns an ordered `&[Probe]`: structured data first, then
//! template hooks, then broad fallbacks. The first candidate passing its
//! probe's predicate wins; order is the only tie-break.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::sanitize;
use super::structured::StructuredJob;
use super::text;
use super::ExtractError;

/// Where a probe looks.
#[derive(Clone, Copy)]
pub enum Locator {
    /// A value derived from the embedded job posting.
    Structured(fn(&StructuredJob) -> Option<String>),
    /// Text content of elements matching a CSS selector, in document order.
    Text(&'static str),
    /// Inner markup of matching elements; the predicate sees their visible text.
    Markup(&'static str),
    /// An attribute of matching elements.
    Attr(&'static str, &'static str),
}

/// Acceptance rule applied to a candidate's normalized text.
#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    pub min_len: usize,
    pub max_len: usize,
    /// Lower-case phrases that disqualify a candidate.
    pub blacklist: &'static [&'static str],
    pub needs_digit: bool,
}

impl Predicate {
    pub const fn between(min_len: usize, max_len: usize) -> Self {
        Self {
            min_len,
            max_len,
            blacklist: &[],
            needs_digit: false,
        }
    }

    pub const fn rejecting(self, blacklist: &'static [&'static str]) -> Self {
        Self { blacklist, ..self }
    }

    pub const fn with_digit(self) -> Self {
        Self {
            needs_digit: true,
            ..self
        }
    }

    pub fn accepts(&self, normalized: &str) -> bool {
        let len = normalized.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }
        if self.needs_digit && !normalized.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        let folded = normalized.to_lowercase();
        !text::contains_any(&folded, self.blacklist)
    }
}

#[derive(Clone, Copy)]
pub struct Probe {
    pub name: &'static str,
    pub locator: Locator,
    pub predicate: Predicate,
}

impl Probe {
    pub const fn new(name: &'static str, locator: Locator, predicate: Predicate) -> Self {
        Self {
            name,
            locator,
            predicate,
        }
    }

    pub fn selector(&self) -> Option<&'static str> {
        match self.locator {
            Locator::Structured(_) => None,
            Locator::Text(s) | Locator::Markup(s) | Locator::Attr(s, _) => Some(s),
        }
    }
}

/// What a probe located: `raw` as found (line breaks and markup intact),
/// `text` whitespace-collapsed for predicates and simple fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub probe: &'static str,
    pub raw: String,
    pub text: String,
}

/// The inputs every probe may consult.
pub struct Page<'a> {
    pub html: &'a Html,
    pub structured: Option<&'a StructuredJob>,
}

/// First accepted candidate, in table order.
pub fn resolve(page: &Page, probes: &[Probe]) -> Result<Option<Candidate>, ExtractError> {
    resolve_with(page, probes, |c| Some(c.text.clone())).map(|hit| hit.map(|(c, _)| c))
}

/// Like [`resolve`], but runs `post` on each accepted candidate; a `None` from
/// `post` sends the resolver on to the next candidate.
pub fn resolve_with<T, F>(
    page: &Page,
    probes: &[Probe],
    mut post: F,
) -> Result<Option<(Candidate, T)>, ExtractError>
where
    F: FnMut(&Candidate) -> Option<T>,
{
    for probe in probes {
        for candidate in locate(page, probe)? {
            if !probe.predicate.accepts(&candidate.text) {
                continue;
            }
            if let Some(value) = post(&candidate) {
                debug!(probe = probe.name, "field resolved");
                return Ok(Some((candidate, value)));
            }
        }
    }
    Ok(None)
}

/// True when any element matches one of the probes' selectors.
pub fn any_match(html: &Html, probes: &[Probe]) -> Result<bool, ExtractError> {
    for selector in probes.iter().filter_map(Probe::selector) {
        if html.select(&parse_selector(selector)?).next().is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn locate(page: &Page, probe: &Probe) -> Result<Vec<Candidate>, ExtractError> {
    let found = match probe.locator {
        Locator::Structured(get) => page
            .structured
            .and_then(get)
            .map(|raw| candidate(probe, visible_text(&raw), raw))
            .into_iter()
            .collect(),
        Locator::Text(selector) => select(page.html, selector)?
            .into_iter()
            .map(|el| {
                let raw = el.text().collect::<Vec<_>>().join("\n");
                candidate(probe, text::collapse(&raw), raw)
            })
            .collect(),
        Locator::Markup(selector) => select(page.html, selector)?
            .into_iter()
            .map(|el| {
                let raw = el.inner_html();
                candidate(probe, sanitize::plain_text(&raw), raw)
            })
            .collect(),
        Locator::Attr(selector, attr) => select(page.html, selector)?
            .into_iter()
            .filter_map(|el| el.value().attr(attr).map(str::to_string))
            .map(|raw| candidate(probe, text::collapse(&raw), raw))
            .collect(),
    };
    Ok(found)
}

fn candidate(probe: &Probe, text: String, raw: String) -> Candidate {
    Candidate {
        probe: probe.name,
        raw,
        text,
    }
}

fn visible_text(raw: &str) -> String {
    if raw.contains('<') {
        sanitize::plain_text(raw)
    } else {
        text::collapse(raw)
    }
}

fn select<'a>(html: &'a Html, selector: &'static str) -> Result<Vec<ElementRef<'a>>, ExtractError> {
    let parsed = parse_selector(selector)?;
    Ok(html.select(&parsed).collect())
}

fn parse_selector(selector: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    fn structured_title(s: &StructuredJob) -> Option<String> {
        s.title.clone()
    }

    const TABLE: &[Probe] = &[
        Probe::new("structured", Locator::Structured(structured_title), Predicate::between(1, 200)),
        Probe::new("exact", Locator::Text("h1.job-title"), Predicate::between(3, 200).rejecting(&["inicia sesión"])),
        Probe::new("generic", Locator::Text("h1"), Predicate::between(1, 300)),
    ];

    #[test]
    fn structured_wins_over_markup() {
        let html = Html::parse_document("<h1 class='job-title'>Marcado</h1>");
        let sj = StructuredJob {
            title: Some("Estructurado".into()),
            ..Default::default()
        };
        let page = Page {
            html: &html,
            structured: Some(&sj),
        };
        let hit = resolve(&page, TABLE).unwrap().unwrap();
        assert_eq!(hit.text, "Estructurado");
        assert_eq!(hit.probe, "structured");
    }

    #[test]
    fn earlier_probe_wins_even_when_shorter() {
        let html = Html::parse_document(
            "<h1>Un título genérico mucho más largo y detallado</h1><h1 class='job-title'>Cajero</h1>",
        );
        let page = Page {
            html: &html,
            structured: None,
        };
        let hit = resolve(&page, TABLE).unwrap().unwrap();
        assert_eq!(hit.probe, "exact");
        assert_eq!(hit.text, "Cajero");
    }

    #[test]
    fn blacklisted_candidate_falls_through() {
        let html = Html::parse_document("<h1 class='job-title'>Inicia sesión</h1><h2>x</h2>");
        let page = Page {
            html: &html,
            structured: None,
        };
        // the generic probe still matches the same h1 with its laxer predicate
        let hit = resolve(&page, TABLE).unwrap().unwrap();
        assert_eq!(hit.probe, "generic");
    }

    #[test]
    fn nothing_matches_is_none() {
        let html = Html::parse_document("<p>sin encabezados</p>");
        let page = Page {
            html: &html,
            structured: None,
        };
        assert_eq!(resolve(&page, TABLE).unwrap(), None);
    }

    #[test]
    fn post_rejection_moves_to_next_candidate() {
        let html = Html::parse_document("<h1 class='job-title'>Primero</h1><h1>Segundo</h1>");
        let page = Page {
            html: &html,
            structured: None,
        };
        let (c, v) = resolve_with(&page, TABLE, |c| (c.text != "Primero").then(|| c.text.len()))
            .unwrap()
            .unwrap();
        assert_eq!(c.text, "Segundo");
        assert_eq!(v, 7);
    }

    #[test]
    fn markup_and_attr_locators() {
        let html = Html::parse_document(
            r#"<head><meta property="og:title" content=" Chofer  repartidor "></head>
               <div id="desc"><p>Reparto <b>local</b></p><script>x()</script></div>"#,
        );
        let page = Page {
            html: &html,
            structured: None,
        };
        let table = [
            Probe::new("og", Locator::Attr(r#"meta[property="og:title"]"#, "content"), Predicate::between(1, 100)),
        ];
        assert_eq!(resolve(&page, &table).unwrap().unwrap().text, "Chofer repartidor");

        let table = [Probe::new("desc", Locator::Markup("#desc"), Predicate::between(1, 100).rejecting(NONE))];
        let hit = resolve(&page, &table).unwrap().unwrap();
        assert_eq!(hit.text, "Reparto local");
        assert!(hit.raw.contains("<b>local</b>"));
    }

    #[test]
    fn invalid_selector_is_a_fault() {
        let html = Html::parse_document("<p></p>");
        let page = Page {
            html: &html,
            structured: None,
        };
        let table = [Probe::new("broken", Locator::Text("h1[["), Predicate::between(1, 10))];
        assert!(matches!(
            resolve(&page, &table),
            Err(ExtractError::Selector { selector: "h1[[", .. })
        ));
    }

    #[test]
    fn predicate_digit_requirement() {
        let p = Predicate::between(1, 50).with_digit();
        assert!(p.accepts("$10,000 mensual"));
        assert!(!p.accepts("A convenir"));
    }
}
