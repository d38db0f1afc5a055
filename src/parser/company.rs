use std::sync::LazyLock;

use regex::Regex;

use super::text;

pub const MAX_COMPANY_LEN: usize = 80;

static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n|·•]").unwrap());
static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| phrase_regex(BOILERPLATE));

/// Tails that follow the company name on this template family.
const BOILERPLATE: &[&str] = &[
    "aviso de privacidad",
    "política de privacidad",
    "politica de privacidad",
    "ver detalle legal",
    "detalle legal",
    "inicia sesión",
    "inicia sesion",
    "iniciar sesión",
    "iniciar sesion",
    "regístrate",
    "registrate",
    "evaluaciones",
    "reseñas",
    "opiniones",
    "empresa verificada",
    "see legal detail",
    "privacy notice",
    "sign in",
    "log in",
    "reviews",
];

/// Case-insensitive whole-word alternation over `phrases`.
pub(crate) fn phrase_regex(phrases: &[&str]) -> Regex {
    let alternation = phrases.iter().map(|p| regex::escape(p)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).unwrap()
}

/// Strip separators, ratings and legal/login tails from a raw company string.
pub fn clean(raw: &str) -> Option<String> {
    let head = SEPARATOR_RE.split(raw).find(|s| !s.trim().is_empty())?;

    let mut name = head
        .split_whitespace()
        .filter(|tok| !is_rating_token(tok))
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(pos) = BOILERPLATE_RE.find_iter(&name).map(|m| m.start()).find(|&pos| pos > 0) {
        name.truncate(pos);
    }

    let trimmed = name.trim_end_matches(|c: char| c.is_whitespace() || ",.;:-–—(".contains(c));
    text::normalize(trimmed, MAX_COMPANY_LEN)
}

/// Ratings and review counts: short runs of digits, separators and stars.
fn is_rating_token(tok: &str) -> bool {
    let core = tok.trim_matches(|c| c == '(' || c == ')');
    !core.is_empty()
        && core.chars().count() <= 6
        && core.chars().any(|c| c.is_ascii_digit() || "★☆⭐".contains(c))
        && core.chars().all(|c| c.is_ascii_digit() || ".,★☆⭐".contains(c))
}
