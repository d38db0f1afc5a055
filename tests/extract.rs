use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::Value;

use jobboard_scraper::parser::{extract, Classification, Extraction, JobRecord, RawDocument, Signal};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap()
}

fn run(fixture: &str) -> Extraction {
    let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
    let doc = RawDocument::new(format!("https://www.empleos.example.mx/oferta/{}-1001", fixture), html);
    extract(&doc, now()).unwrap()
}

fn record(fixture: &str) -> Box<JobRecord> {
    match run(fixture) {
        Extraction::Record(r) => r,
        other => panic!("{fixture}: expected a record, got {other:?}"),
    }
}

#[test]
fn json_ld_posting() {
    let r = record("asesor_jsonld");
    assert_eq!(r.title, "Asesor de Ventas");
    assert_eq!(r.company.as_deref(), Some("Empresa XYZ"));
    assert_eq!(r.location.as_deref(), Some("Ciudad de México"));
    assert_eq!(r.source.as_deref(), Some("empleos.example.mx"));
    assert_eq!(r.salary, None);

    let v: Value = serde_json::to_value(&r).unwrap();
    assert_eq!(v["datePosted"], "2025-10-18T00:00:00Z");
    assert_eq!(v["employmentType"], "FULL_TIME");
    for key in ["salary_currency", "salary_period", "salary_min", "salary_max", "salary_amount", "salary_text"] {
        assert_eq!(v[key], Value::Null, "{key}");
    }

    let html = r.description_html().unwrap();
    assert!(html.contains("<strong>asesor de ventas</strong>"));
    assert!(html.contains("<li>Manejo de caja</li>"));
    assert!(r.description_text().unwrap().contains("Atención a clientes"));
}

#[test]
fn json_ld_beats_template_markup() {
    let out = run("asesor_jsonld");
    let probes = out.winning_probes();
    assert!(probes.contains(&("title", "jsonld.title")));
    assert!(probes.contains(&("company", "jsonld.hiringOrganization")));
    assert!(probes.contains(&("location", "jsonld.jobLocation")));
}

#[test]
fn password_form_is_an_interstitial() {
    let out = run("login_wall");
    assert_eq!(out, Extraction::Retry(Classification::Interstitial(Signal::PasswordInput)));
    assert_eq!(out.outcome(), "invalid-interstitial");
}

#[test]
fn style_only_description_is_dropped() {
    let r = record("style_description");
    assert_eq!(r.title, "Auxiliar Contable");
    assert_eq!(r.description_html(), None);
    assert_eq!(r.description_text(), None);
    assert_eq!(r.company.as_deref(), Some("Contadores Asociados SC"));
    assert_eq!(
        r.date_posted,
        Some(Utc.with_ymd_and_hms(2025, 10, 15, 15, 30, 0).unwrap())
    );

    let v: Value = serde_json::to_value(&r).unwrap();
    assert_eq!(v["description_html"], Value::Null);
    assert_eq!(v["description_text"], Value::Null);
}

#[test]
fn template_without_structured_data() {
    let r = record("template_only");
    assert_eq!(r.title, "Ayudante General");
    assert_eq!(r.company.as_deref(), Some("Distribuidora ABC"));
    assert_eq!(r.location.as_deref(), Some("Puebla, Pue"));
    assert_eq!(r.date_posted, Some(now() - TimeDelta::days(30)));

    let v: Value = serde_json::to_value(&r).unwrap();
    assert_eq!(v["salary_text"], "$8,500.00 (Mensual)");
    assert_eq!(v["salary_min"], Value::Null);
    assert_eq!(v["employmentType"], "Tiempo completo");

    let html = r.description_html().unwrap();
    assert!(html.starts_with("<p>Carga y descarga"));
    assert!(!html.contains("script"));
    assert!(!html.contains("trackView"));
    assert!(!html.contains("Postúlate"));
    let text = r.description_text().unwrap();
    assert!(text.contains("Secundaria terminada"));
    assert!(!text.contains("Postúlate"));
}

#[test]
fn extraction_is_deterministic() {
    assert_eq!(run("template_only"), run("template_only"));
}

#[test]
fn job_titles_with_login_substrings_become_records() {
    let pages = [
        "<html><body><h1>UX Design Intern</h1></body></html>".to_string(),
        "<html><body><h1>Redactor de blog institucional</h1></body></html>".to_string(),
        r#"<html><head><script type="application/ld+json">{"@type":"JobPosting","title":"UX Design Intern"}</script></head><body></body></html>"#.to_string(),
    ];
    for html in pages {
        let doc = RawDocument::new("https://empleos.example.mx/oferta/ux-1", html.as_str());
        let out = extract(&doc, now()).unwrap();
        assert_eq!(out.outcome(), "record", "{html}");
    }
}

#[test]
fn script_strings_do_not_make_a_wall() {
    let doc = RawDocument::new(
        "https://empleos.example.mx/oferta/cajero-2",
        r#"<html><body><h1>Cajero</h1><script>var i18n={err:"Acceso denegado"};</script></body></html>"#,
    );
    match extract(&doc, now()).unwrap() {
        Extraction::Record(r) => assert_eq!(r.title, "Cajero"),
        other => panic!("expected a record, got {other:?}"),
    }
}
