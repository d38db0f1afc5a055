use std::fmt;
use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::fields::{INTERSTITIAL_PHRASES, TITLE_PROBES};
use super::{probes, sanitize, structured, text, ExtractError};

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static PASSWORD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="password"]"#).unwrap());
static FORM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form[action]").unwrap());

/// Body phrases that only appear on walls and challenge pages. Plain
/// "iniciar sesión" is not here: every genuine page carries it in the nav.
pub const WALL_PHRASES: &[&str] = &[
    "inicia sesión para continuar",
    "inicia sesión para ver",
    "inicia sesion para continuar",
    "regístrate para ver",
    "registrate para ver",
    "verifica que eres humano",
    "verificando que eres humano",
    "sign in to continue",
    "verify you are human",
    "checking your browser",
    "please enable cookies",
    "access denied",
    "acceso denegado",
];

const LOGIN_ACTIONS: &[&str] = &["login", "signin", "sign-in", "auth", "account", "cuenta"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Listing,
    Detail,
}

/// Why a page was judged to be an interstitial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    LoginTitle,
    WallText,
    PasswordInput,
    LoginForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Valid,
    Interstitial(Signal),
    NoContent,
}

impl Classification {
    pub fn is_valid(self) -> bool {
        self == Classification::Valid
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Valid => "valid",
            Classification::Interstitial(_) => "invalid-interstitial",
            Classification::NoContent => "invalid-no-content",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether a fetched page is genuine content or something the fetcher
/// should retry under a different session.
pub fn classify(doc: &Html, kind: PageKind) -> Result<Classification, ExtractError> {
    if let Some(signal) = interstitial_signal(doc) {
        return Ok(Classification::Interstitial(signal));
    }
    if kind == PageKind::Detail && !has_job_evidence(doc)? {
        return Ok(Classification::NoContent);
    }
    Ok(Classification::Valid)
}

fn interstitial_signal(doc: &Html) -> Option<Signal> {
    let title_text = first_text(doc, &TITLE);
    let heading_text = first_text(doc, &HEADING);
    if [title_text, heading_text]
        .iter()
        .any(|t| text::contains_any(t, INTERSTITIAL_PHRASES))
    {
        return Some(Signal::LoginTitle);
    }

    if doc.select(&PASSWORD).next().is_some() {
        return Some(Signal::PasswordInput);
    }

    let login_form = doc.select(&FORM).any(|form| {
        form.value()
            .attr("action")
            .map(|a| a.to_lowercase())
            .is_some_and(|a| LOGIN_ACTIONS.iter().any(|marker| a.contains(marker)))
    });
    if login_form {
        return Some(Signal::LoginForm);
    }

    let body_text = doc
        .select(&BODY)
        .next()
        .map(|body| text::fold(&sanitize::visible_text(body)))
        .unwrap_or_default();
    if text::contains_any(&body_text, WALL_PHRASES) {
        return Some(Signal::WallText);
    }
    None
}

fn has_job_evidence(doc: &Html) -> Result<bool, ExtractError> {
    if doc.select(&HEADING).next().is_some() || structured::block_count(doc) > 0 {
        return Ok(true);
    }
    probes::any_match(doc, TITLE_PROBES)
}

fn first_text(doc: &Html, selector: &Selector) -> String {
    doc.select(selector)
        .next()
        .map(|el| text::fold(&el.text().collect::<String>()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_str(html: &str) -> Classification {
        classify(&Html::parse_document(html), PageKind::Detail).unwrap()
    }

    #[test]
    fn genuine_detail_page() {
        let c = classify_str(
            r#"<html><head><title>Asesor de Ventas - Empleo</title></head>
               <body><nav><a href="/login">Iniciar sesión</a></nav><h1>Asesor de Ventas</h1></body></html>"#,
        );
        assert_eq!(c, Classification::Valid);
    }

    #[test]
    fn login_title() {
        let c = classify_str("<html><head><title>Inicia sesión | Portal</title></head><body><h1>Hola</h1></body></html>");
        assert_eq!(c, Classification::Interstitial(Signal::LoginTitle));
        assert_eq!(c.as_str(), "invalid-interstitial");
    }

    #[test]
    fn password_input() {
        let c = classify_str(r#"<body><h1>Bienvenido</h1><input type="password" name="pwd"></body>"#);
        assert_eq!(c, Classification::Interstitial(Signal::PasswordInput));
    }

    #[test]
    fn login_form_action() {
        let c = classify_str(r#"<body><h1>Empleos</h1><form action="https://cuenta.example.com/Auth/SignIn"><input name="email"></form></body>"#);
        assert_eq!(c, Classification::Interstitial(Signal::LoginForm));
    }

    #[test]
    fn search_form_is_fine() {
        let c = classify_str(r#"<body><form action="/empleos"><input name="q"></form><h1>Cajero</h1></body>"#);
        assert_eq!(c, Classification::Valid);
    }

    #[test]
    fn challenge_body_text() {
        let c = classify_str("<body><p>Por favor verifica que eres humano</p></body>");
        assert_eq!(c, Classification::Interstitial(Signal::WallText));
    }

    #[test]
    fn titles_containing_login_words_are_genuine() {
        for title in [
            "UX Design Intern",
            "Redactor de blog institucional",
            "Ejecutivo para crear cuentas corporativas",
        ] {
            let c = classify_str(&format!("<html><head><title>{title}</title></head><body><h1>{title}</h1></body></html>"));
            assert_eq!(c, Classification::Valid, "{title}");
        }
    }

    #[test]
    fn script_strings_are_not_wall_text() {
        let c = classify_str(
            r#"<body><h1>Cajero</h1>
               <script>var i18n = {err: "Acceso denegado", c: "please enable cookies"};</script>
               <noscript>Checking your browser</noscript></body>"#,
        );
        assert_eq!(c, Classification::Valid);
    }

    #[test]
    fn wall_text_in_overlay_still_counts() {
        let c = classify_str(r#"<body><div class="modal"><p>Inicia sesión para continuar</p></div></body>"#);
        assert_eq!(c, Classification::Interstitial(Signal::WallText));
    }

    #[test]
    fn detail_without_evidence() {
        let c = classify_str("<html><body><p>Algo salió mal</p></body></html>");
        assert_eq!(c, Classification::NoContent);
        assert_eq!(c.to_string(), "invalid-no-content");
    }

    #[test]
    fn json_ld_alone_is_evidence() {
        let c = classify_str(r#"<head><script type="application/ld+json">{}</script></head><body></body>"#);
        assert_eq!(c, Classification::Valid);
    }

    #[test]
    fn listing_pages_skip_evidence_check() {
        let doc = Html::parse_document("<body><ul><li>Vacante</li></ul></body>");
        assert_eq!(classify(&doc, PageKind::Listing).unwrap(), Classification::Valid);
    }
}
