use serde_json::Value;

/// Salary as it leaves the engine: typed fields from structured data, or the
/// raw text a probe found on the page. Never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Salary {
    Structured(StructuredSalary),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSalary {
    pub currency: Option<String>,
    pub period: Option<String>,
    pub range: Option<SalaryRange>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SalaryRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StructuredSalary {
    pub fn min(&self) -> Option<f64> {
        self.range.and_then(|r| r.min)
    }

    pub fn max(&self) -> Option<f64> {
        self.range.and_then(|r| r.max)
    }
}

/// Normalize a schema.org `baseSalary` value. Accepts a bare number, a
/// `MonetaryAmount` (`{currency, value}`) whose value is a number or a
/// `QuantitativeValue`, or a `QuantitativeValue` on its own.
pub fn normalize(raw: &Value) -> Option<StructuredSalary> {
    let (outer, inner) = match raw {
        Value::Object(map) => match map.get("value") {
            Some(v @ Value::Object(_)) => (raw, v),
            _ => (raw, raw),
        },
        Value::Number(_) | Value::String(_) => {
            let amount = number(raw)?;
            return Some(StructuredSalary {
                currency: None,
                period: None,
                range: None,
                amount: Some(amount),
            });
        }
        _ => return None,
    };

    let currency = string_field(outer, &["currency", "salaryCurrency"])
        .or_else(|| string_field(inner, &["currency"]))
        .map(|c| c.to_uppercase());
    let period = string_field(inner, &["unitText"])
        .or_else(|| string_field(outer, &["unitText"]))
        .map(|p| p.to_uppercase());

    let min = inner.get("minValue").and_then(number);
    let max = inner.get("maxValue").and_then(number);
    let range = (min.is_some() || max.is_some()).then_some(SalaryRange { min, max });

    // A range always wins over a bare amount.
    let amount = if range.is_some() {
        None
    } else {
        inner
            .get("value")
            .filter(|v| !v.is_object())
            .and_then(number)
    };

    if currency.is_none() && period.is_none() && range.is_none() && amount.is_none() {
        return None;
    }

    Some(StructuredSalary {
        currency,
        period,
        range,
        amount,
    })
}

fn string_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        v.get(*k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|n| *n >= 0.0),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Amount from text such as "$12,500.00 MXN", with commas as thousands
/// separators. Signs, several dots or a comma after the dot are refused.
fn parse_amount(s: &str) -> Option<f64> {
    if s.contains('-') || s.matches('.').count() > 1 {
        return None;
    }
    if let (Some(dot), Some(comma)) = (s.find('.'), s.rfind(',')) {
        if comma > dot {
            return None;
        }
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().ok()
}
