//! Reduce description markup to a small safe tag set plus a plain-text projection.
//!
//! The tree is never mutated: removed nodes are skipped, disallowed elements
//! are unwrapped by writing only their children, and allowed elements are
//! re-emitted without attributes (anchors keep `href`).

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use super::text;

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "ul", "ol", "li", "strong", "b", "em", "i", "u", "a", "h2", "h3", "h4", "h5", "h6",
];

const REMOVED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "canvas",
    "form", "input", "button", "select", "textarea", "label", "head", "title", "meta", "link",
];

/// Elements a browser never renders as text.
const NON_RENDERED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const BLOCK_TAGS: &[&str] = &[
    "p", "br", "ul", "ol", "li", "h1", "h2", "h3", "h4", "h5", "h6", "div", "section", "article",
    "header", "footer", "main", "aside", "nav", "table", "thead", "tbody", "tfoot", "tr", "td",
    "th", "blockquote", "pre", "dl", "dt", "dd", "hr", "figure", "figcaption", "address",
];

/// Class/id tokens marking popups and overlays layered over the content.
const OVERLAY_MARKERS: &[&str] = &["modal", "popup", "overlay", "cookie", "cookies", "lightbox", "backdrop"];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[a-zA-Z][a-zA-Z0-9]*[\s/>]").unwrap());
static ESCAPED_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&lt;/?[a-zA-Z][a-zA-Z0-9]*(\s|/|&gt;)").unwrap());
static BRACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^{}]*\}").unwrap());
static CONTENT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:p|br|ul|ol|li|strong|b|em|i|u|a|h[2-6])[\s>/]").unwrap());
static BLANK_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Sanitized description: markup and its plain-text projection travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub html: String,
    pub text: String,
}

/// Accept a description of unknown shape: markup, entity-escaped markup, or
/// plain text.
pub fn from_raw(raw: &str) -> Option<Description> {
    if TAG_RE.is_match(raw) {
        sanitize(raw)
    } else if ESCAPED_TAG_RE.is_match(raw) {
        sanitize(&plain_text_raw(raw))
    } else {
        from_plain_text(raw)
    }
}

/// Sanitize an HTML fragment. `None` when nothing readable survives or the
/// result looks like leaked stylesheet/script text.
pub fn sanitize(fragment: &str) -> Option<Description> {
    let doc = Html::parse_fragment(fragment);
    let root = doc.root_element();

    let mut html = String::with_capacity(fragment.len());
    write_children(root, &mut html);
    let html = html.trim().to_string();

    let mut raw_text = String::new();
    project_children(root, &mut raw_text);
    let text = text::collapse(&raw_text);

    if text.is_empty() {
        return None;
    }
    if looks_like_code(&html) {
        debug!(len = html.len(), "description rejected as style/script leakage");
        return None;
    }
    Some(Description { html, text })
}

/// Wrap plain text into paragraphs: blank lines split paragraphs, single
/// newlines become `<br>`.
pub fn from_plain_text(raw: &str) -> Option<Description> {
    if BRACE_RE.is_match(raw) {
        debug!("plain-text description rejected as style/script leakage");
        return None;
    }
    let mut markup = String::with_capacity(raw.len() + 16);
    for para in BLANK_LINE_RE.split(&raw.replace("\r\n", "\n")) {
        let lines: Vec<&str> = para.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        markup.push_str("<p>");
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                markup.push_str("<br>");
            }
            escape_text(line, &mut markup);
        }
        markup.push_str("</p>");
    }
    sanitize(&markup)
}

/// Whitespace-collapsed text of a fragment, skipping non-content nodes.
pub fn plain_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let mut out = String::new();
    project_children(doc.root_element(), &mut out);
    text::collapse(&out)
}

/// Rendered text under `el`: script, style, noscript and template contents
/// are skipped, everything else (overlays included) is kept.
pub fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    visible_children(el, &mut out);
    text::collapse(&out)
}

fn visible_children(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if !NON_RENDERED_TAGS.contains(&e.name()) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    let block = BLOCK_TAGS.contains(&e.name());
                    if block {
                        out.push(' ');
                    }
                    visible_children(child_el, out);
                    if block {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

/// Text of a fragment with entities decoded and nothing skipped.
fn plain_text_raw(fragment: &str) -> String {
    Html::parse_fragment(fragment).root_element().text().collect()
}

fn looks_like_code(html: &str) -> bool {
    BRACE_RE.is_match(html) && !CONTENT_TAG_RE.is_match(html)
}

fn write_children(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => escape_text(t, out),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef, out: &mut String) {
    let value = el.value();
    if is_removed(value) {
        return;
    }
    let name = value.name();

    if !ALLOWED_TAGS.contains(&name) {
        let block = BLOCK_TAGS.contains(&name);
        if block {
            push_break(out);
        }
        write_children(el, out);
        if block {
            push_break(out);
        }
        return;
    }

    out.push('<');
    out.push_str(name);
    if name == "a" {
        if let Some(href) = value.attr("href").filter(|h| is_safe_href(h)) {
            out.push_str(" href=\"");
            escape_attr(href, out);
            out.push('"');
        }
    }
    out.push('>');
    if name == "br" {
        return;
    }
    write_children(el, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn project_children(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    project_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn project_element(el: ElementRef, out: &mut String) {
    let value = el.value();
    if is_removed(value) {
        return;
    }
    let block = BLOCK_TAGS.contains(&value.name());
    if block {
        out.push(' ');
    }
    project_children(el, out);
    if block {
        out.push(' ');
    }
}

fn is_removed(el: &Element) -> bool {
    if REMOVED_TAGS.contains(&el.name()) || el.attr("hidden").is_some() {
        return true;
    }
    if el.attr("aria-hidden").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")) {
        return true;
    }
    if let Some(style) = el.attr("style") {
        let style: String = style.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    el.attr("class")
        .into_iter()
        .chain(el.attr("id"))
        .flat_map(|v| v.split(|c: char| c.is_whitespace() || c == '-' || c == '_'))
        .any(|token| OVERLAY_MARKERS.contains(&token.to_lowercase().as_str()))
}

fn is_safe_href(href: &str) -> bool {
    let lower = href.trim().to_lowercase();
    !lower.is_empty() && !lower.starts_with("javascript:") && !lower.starts_with("data:")
}

/// Unwrapped block elements leave one line break so adjacent words stay apart.
fn push_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
