use anyhow::{Context, Result};
use quick_xml::events::Event;
use regex::Regex;
use tracing::{info, warn};

/// What a sitemap document lists.
#[derive(Debug, PartialEq, Eq)]
enum Listing {
    /// `<urlset>`: page URLs.
    Pages(Vec<String>),
    /// `<sitemapindex>`: child sitemaps.
    Index(Vec<String>),
}

/// Fetch the board's sitemap (following one level of sitemap index) and
/// return the job detail URLs it lists.
pub async fn fetch_detail_urls(sitemap_url: &str, detail_pattern: &str) -> Result<Vec<String>> {
    let client = reqwest::Client::new();
    let re = Regex::new(detail_pattern).context("Invalid detail URL pattern")?;

    info!("Fetching sitemap: {}", sitemap_url);
    let all_urls = match parse_sitemap(&fetch(&client, sitemap_url).await?)? {
        Listing::Pages(urls) => urls,
        Listing::Index(children) => {
            info!("Sitemap index with {} children", children.len());
            let mut urls = Vec::new();
            for child in children {
                match fetch(&client, &child).await.and_then(|xml| parse_sitemap(&xml)) {
                    Ok(Listing::Pages(found)) => urls.extend(found),
                    Ok(Listing::Index(_)) => warn!("Skipping nested sitemap index {}", child),
                    Err(e) => warn!("Skipping sitemap {}: {:#}", child, e),
                }
            }
            urls
        }
    };
    info!("Total URLs in sitemap: {}", all_urls.len());

    let filtered = filter_detail_urls(all_urls, &re);
    info!("Detail pages after filtering: {}", filtered.len());
    Ok(filtered)
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("Failed to fetch sitemap {url}"))
}

/// Keep detail pages only (drop listing, category and city pages), deduped
/// in first-seen order.
fn filter_detail_urls(urls: Vec<String>, re: &Regex) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| re.is_match(u))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

fn parse_sitemap(xml: &str) -> Result<Listing> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut is_index = false;
    let mut in_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"url" | b"sitemap" => in_entry = true,
                b"loc" if in_entry => in_loc = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc => {
                locs.push(e.unescape()?.trim().to_string());
            }
            Ok(Event::CData(e)) if in_loc => {
                locs.push(String::from_utf8_lossy(&e.into_inner()).trim().to_string());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(if is_index {
        Listing::Index(locs)
    } else {
        Listing::Pages(locs)
    })
}
