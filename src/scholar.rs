//! Google Scholar profile retrieval.
//!
//! Fetches a profile's citations page over plain HTTP and extracts the
//! figures from the "Cited by" table and the publication list.

use crate::cookies::CookieManager;
use crate::error::{MetricsError, OptionExt, Result};
use crate::metrics::{
    parse_count, parse_index, MetricsRecord, PublicationCount, DEFAULT_PUBLICATIONS,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use scraper::{Html, Selector};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Publications requested per page; a full page means there may be more.
pub const PAGE_SIZE: usize = 100;

/// User agent string for requests
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
);

/// Free-text signs of Google's "sorry" interstitial
const CAPTCHA_PHRASES: [&str; 2] = ["Solving the above CAPTCHA", "unusual traffic"];

/// Options for one profile retrieval
#[derive(Debug, Clone)]
pub struct ScholarOptions {
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Custom base URL for mirror sites
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Cookie file override
    pub cookies: Option<PathBuf>,
}

/// Retrieve the metrics of one Scholar profile.
///
/// # Errors
///
/// Network failures, non-success statuses, CAPTCHA pages and pages without
/// profile data are all errors. Figures missing from an otherwise valid
/// profile page are reported as 0.
pub async fn fetch_profile_metrics(
    profile_id: &str,
    options: &ScholarOptions,
) -> Result<MetricsRecord> {
    let scholar_url = options
        .base_url
        .as_ref()
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string());

    let url = build_profile_url(&scholar_url, profile_id)?;
    info!(
        profile = profile_id,
        url = %url,
        proxy = options.proxy.as_deref().unwrap_or("direct"),
        "Fetching Scholar profile"
    );

    let cookie_header = CookieManager::resolve(options.cookies.as_deref()).header();
    if cookie_header.is_empty() {
        debug!("No cookies loaded; requests go out without a session");
    }

    let client = build_http_client(options.proxy.as_deref(), options.timeout)?;
    let html = fetch_page(&client, &url, &cookie_header).await?;

    let record = parse_profile(&html, profile_id).inspect_err(|e| {
        if matches!(e, MetricsError::Captcha) {
            warn!(profile = profile_id, "CAPTCHA detected");
        }
    })?;
    info!(metrics = %record, "Parsed profile metrics");
    Ok(record)
}

/// Build HTTP client with optional proxy
fn build_http_client(proxy: Option<&str>, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            MetricsError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| MetricsError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Build the profile URL, asking for the largest publication page
fn build_profile_url(base_url: &str, profile_id: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/citations", base_url))
        .map_err(|e| MetricsError::Config(format!("Invalid base URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("user", profile_id)
        .append_pair("hl", "en") // English labels for consistent parsing
        .append_pair("cstart", "0")
        .append_pair("pagesize", &PAGE_SIZE.to_string());

    Ok(url)
}

async fn fetch_page(client: &reqwest::Client, url: &Url, cookie_header: &str) -> Result<String> {
    let mut request = client
        .get(url.as_str())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Cache-Control", "no-cache")
        .header("Pragma", "no-cache")
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "none")
        .header("Sec-Fetch-User", "?1")
        .header("Upgrade-Insecure-Requests", "1");

    if !cookie_header.is_empty() {
        request = request.header("Cookie", cookie_header);
    }

    let response = request.send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(MetricsError::RateLimited(retry_after(response.headers())));
    }

    if !status.is_success() {
        return Err(MetricsError::Api {
            code: status.as_u16(),
            message: format!("HTTP error: {}", status),
        });
    }

    Ok(response.text().await?)
}

/// Seconds from a `Retry-After` header, when given as delta-seconds
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| MetricsError::Parse(e.to_string()))
}

/// Parse a Scholar profile page into a metrics record.
///
/// A page without profile markers is a CAPTCHA when it carries the CAPTCHA
/// form or interstitial text, and a missing profile otherwise.
pub fn parse_profile(html: &str, profile_id: &str) -> Result<MetricsRecord> {
    let document = Html::parse_document(html);

    let name_selector = selector("#gsc_prf_in")?;
    let row_selector = selector("#gsc_rsb_st tbody tr")?;
    let label_selector = selector("td.gsc_rsb_sc1")?;
    let value_selector = selector("td.gsc_rsb_std")?;
    let publication_selector = selector("tr.gsc_a_tr")?;
    let more_selector = selector("#gsc_bpf_more")?;
    let captcha_selector = selector("#gs_captcha_f, #captcha-form")?;

    if document.select(&captcha_selector).next().is_some() {
        return Err(MetricsError::Captcha);
    }

    let has_name = document.select(&name_selector).next().is_some();
    let rows: Vec<_> = document.select(&row_selector).collect();
    if !has_name && rows.is_empty() {
        if CAPTCHA_PHRASES.iter().any(|phrase| html.contains(phrase)) {
            return Err(MetricsError::Captcha);
        }
        return Err(MetricsError::ProfileNotFound(profile_id.to_string()));
    }

    let mut record = MetricsRecord {
        citations: Some(0),
        h_index: Some(0),
        i10_index: Some(0),
        publications: None,
    };

    for row in rows {
        let Some(label) = row.select(&label_selector).next() else {
            continue;
        };
        let label = label.text().collect::<String>().trim().to_lowercase();
        // First value column is "All", second is "Since <year>"
        let value = row
            .select(&value_selector)
            .next()
            .map(|v| v.text().collect::<String>())
            .ok_or_parse("stats row without a value")?;

        match label.as_str() {
            "citations" => record.citations = Some(parse_count(&value)?),
            "h-index" => record.h_index = Some(parse_index(&value)?),
            "i10-index" => record.i10_index = Some(parse_index(&value)?),
            other => debug!(label = other, "Ignoring stats row"),
        }
    }

    let listed = document.select(&publication_selector).count();
    let more_available = document
        .select(&more_selector)
        .next()
        .is_some_and(|button| button.value().attr("disabled").is_none());

    record.publications = Some(match u32::try_from(listed) {
        Ok(0) | Err(_) => {
            debug!("No publication rows, using default count");
            DEFAULT_PUBLICATIONS
        }
        Ok(n) if listed >= PAGE_SIZE || more_available => PublicationCount::at_least(n),
        Ok(n) => PublicationCount::exact(n),
    });

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn profile_page(stats: &str, publications: usize, more_enabled: bool) -> String {
        let rows: String = (0..publications)
            .map(|i| {
                format!(
                    r#"<tr class="gsc_a_tr"><td class="gsc_a_t">Paper {}</td></tr>"#,
                    i
                )
            })
            .collect();
        let button = if more_enabled {
            r#"<button id="gsc_bpf_more" type="button">Show more</button>"#
        } else {
            r#"<button id="gsc_bpf_more" type="button" disabled="">Show more</button>"#
        };
        format!(
            r#"<html><body>
            <div id="gsc_prf_in">Jane Doe</div>
            <table id="gsc_rsb_st">
            <thead><tr><th></th><th>All</th><th>Since 2020</th></tr></thead>
            <tbody>{}</tbody></table>
            <table id="gsc_a_t"><tbody id="gsc_a_b">{}</tbody></table>
            {}
            </body></html>"#,
            stats, rows, button
        )
    }

    fn stats_row(label: &str, all: &str, since: &str) -> String {
        format!(
            r#"<tr><td class="gsc_rsb_sc1"><a class="gsc_rsb_f">{}</a></td>
            <td class="gsc_rsb_std">{}</td><td class="gsc_rsb_std">{}</td></tr>"#,
            label, all, since
        )
    }

    fn full_stats() -> String {
        [
            stats_row("Citations", "1,234", "800"),
            stats_row("h-index", "15", "11"),
            stats_row("i10-index", "18", "12"),
        ]
        .concat()
    }

    #[test]
    fn test_build_profile_url() {
        let url = build_profile_url("https://scholar.google.com", "tIcTCNgAAAAJ")
            .expect("Failed to build URL");
        assert!(url.as_str().starts_with("https://scholar.google.com/citations?"));
        assert!(url.as_str().contains("user=tIcTCNgAAAAJ"));
        assert!(url.as_str().contains("pagesize=100"));
    }

    #[test]
    fn test_parse_full_profile() {
        let record = parse_profile(&profile_page(&full_stats(), 27, false), "x")
            .expect("Parse failed");
        assert_eq!(record.citations, Some(1234));
        assert_eq!(record.h_index, Some(15));
        assert_eq!(record.i10_index, Some(18));
        assert_eq!(record.publications, Some(PublicationCount::exact(27)));
    }

    #[test]
    fn test_parse_publications_lower_bound() {
        let record = parse_profile(&profile_page(&full_stats(), 5, true), "x")
            .expect("Parse failed");
        assert_eq!(record.publications, Some(PublicationCount::at_least(5)));

        let record = parse_profile(&profile_page(&full_stats(), PAGE_SIZE, false), "x")
            .expect("Parse failed");
        assert_eq!(record.publications, Some(PublicationCount::at_least(100)));
    }

    #[test]
    fn test_missing_figures_default_to_zero() {
        let stats = stats_row("Citations", "42", "10");
        let record = parse_profile(&profile_page(&stats, 0, false), "x").expect("Parse failed");
        assert_eq!(record.citations, Some(42));
        assert_eq!(record.h_index, Some(0));
        assert_eq!(record.i10_index, Some(0));
        assert_eq!(record.publications, Some(DEFAULT_PUBLICATIONS));
    }

    #[test]
    fn test_empty_page_is_not_a_profile() {
        let result = parse_profile("<html><body></body></html>", "missing");
        assert!(matches!(result, Err(MetricsError::ProfileNotFound(_))));
    }

    #[test]
    fn test_garbled_value_is_parse_error() {
        let stats = stats_row("h-index", "n/a", "n/a");
        let result = parse_profile(&profile_page(&stats, 1, false), "x");
        assert!(matches!(result, Err(MetricsError::Parse(_))));
    }

    #[test]
    fn test_captcha_page_detected() {
        let interstitial = r#"<html><body>
            <p>Our systems have detected unusual traffic from your computer network.</p>
            </body></html>"#;
        assert!(matches!(parse_profile(interstitial, "x"), Err(MetricsError::Captcha)));

        let form = r#"<html><body><form id="gs_captcha_f" action="/sorry">
            <div id="gsc_prf_in">leftover</div></form></body></html>"#;
        assert!(matches!(parse_profile(form, "x"), Err(MetricsError::Captcha)));
    }

    #[test]
    fn test_profile_mentioning_phrase_is_not_captcha() {
        let page = profile_page(&full_stats(), 3, false)
            .replace("Paper 1", "Detecting unusual traffic in urban road networks");
        let record = parse_profile(&page, "x").expect("profile with that title still parses");
        assert_eq!(record.citations, Some(1234));
        assert_eq!(record.publications, Some(PublicationCount::exact(3)));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(retry_after(&headers), Some(120));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }
}
