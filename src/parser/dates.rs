use std::sync::LazyLock;

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use regex::Regex;

static ABSOLUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})(?:[t ](\d{2}):(\d{2})(?::(\d{2}))?(?:\.\d+)?(z|[+-]\d{2}:?\d{2})?)?")
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Locale words the relative-date matcher understands.
pub struct DateVocabulary {
    pub units: &'static [(&'static str, Unit)],
    /// Words meaning a quantity of one ("un", "una").
    pub one: &'static [&'static str],
    /// Standalone words and the day offset they stand for ("hoy", "ayer").
    pub day_words: &'static [(&'static str, i64)],
}

pub static SPANISH: DateVocabulary = DateVocabulary {
    units: &[
        ("minuto", Unit::Minute),
        ("minutos", Unit::Minute),
        ("min", Unit::Minute),
        ("hora", Unit::Hour),
        ("horas", Unit::Hour),
        ("h", Unit::Hour),
        ("día", Unit::Day),
        ("días", Unit::Day),
        ("dia", Unit::Day),
        ("dias", Unit::Day),
        ("semana", Unit::Week),
        ("semanas", Unit::Week),
        ("mes", Unit::Month),
        ("meses", Unit::Month),
        ("año", Unit::Year),
        ("años", Unit::Year),
        ("ano", Unit::Year),
        ("anos", Unit::Year),
    ],
    one: &["un", "una", "uno"],
    day_words: &[("hoy", 0), ("ayer", 1), ("anteayer", 2)],
};

/// Interpret a posted-date expression with the default Spanish vocabulary.
pub fn interpret(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    interpret_with(raw, now, &SPANISH)
}

/// An absolute `YYYY-MM-DD` date anywhere in the text wins; otherwise a
/// relative "<n> <unit>" offset from `now`; otherwise `None`.
pub fn interpret_with(raw: &str, now: DateTime<Utc>, vocab: &DateVocabulary) -> Option<DateTime<Utc>> {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if let Some(abs) = absolute(&text) {
        return Some(abs);
    }
    relative(&text, now, vocab)
}

fn absolute(text: &str) -> Option<DateTime<Utc>> {
    let caps = ABSOLUTE_RE.captures(text)?;
    let whole = caps.get(0)?.as_str();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&whole.to_uppercase()) {
        return Some(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    let time = match (caps.get(4), caps.get(5)) {
        (Some(h), Some(m)) => {
            let s = caps.get(6).map_or(Some(0), |s| s.as_str().parse().ok())?;
            NaiveTime::from_hms_opt(h.as_str().parse().ok()?, m.as_str().parse().ok()?, s)?
        }
        _ => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    Some(NaiveDateTime::new(date, time).and_utc())
}

fn relative(text: &str, now: DateTime<Utc>, vocab: &DateVocabulary) -> Option<DateTime<Utc>> {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '+'))
        .filter(|w| !w.is_empty())
        .collect();

    for pair in words.windows(2) {
        let quantity = match pair[0].trim_end_matches('+').parse::<u32>() {
            Ok(n) => n,
            Err(_) if vocab.one.contains(&pair[0]) => 1,
            Err(_) => continue,
        };
        if let Some(unit) = lookup(vocab, pair[1]) {
            return subtract(now, quantity, unit);
        }
    }

    words
        .iter()
        .find_map(|w| vocab.day_words.iter().find(|(d, _)| d == w))
        .and_then(|(_, days)| now.checked_sub_signed(TimeDelta::try_days(*days)?))
}

fn lookup(vocab: &DateVocabulary, word: &str) -> Option<Unit> {
    vocab
        .units
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, unit)| *unit)
}

fn subtract(now: DateTime<Utc>, n: u32, unit: Unit) -> Option<DateTime<Utc>> {
    let n64 = i64::from(n);
    match unit {
        Unit::Minute => now.checked_sub_signed(TimeDelta::try_minutes(n64)?),
        Unit::Hour => now.checked_sub_signed(TimeDelta::try_hours(n64)?),
        Unit::Day => now.checked_sub_signed(TimeDelta::try_days(n64)?),
        Unit::Week => now.checked_sub_signed(TimeDelta::try_weeks(n64)?),
        Unit::Month => now.checked_sub_months(Months::new(n)),
        Unit::Year => now.checked_sub_months(Months::new(n.checked_mul(12)?)),
    }
}
