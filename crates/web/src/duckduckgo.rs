use crate::{SearchHit, SearchProvider, DEFAULT_MAX_RESULTS};
use anyhow::Result;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const NO_RESULTS: &str =
    "No search results found. The search service might be blocked or unavailable.";

#[derive(Debug, Clone, Copy)]
enum Backend {
    Html,
    Lite,
}

/// Scrapes DuckDuckGo's script-free result pages directly.
///
/// The html page is tried first and the lite page is the fallback when it
/// fails or comes back empty.
pub struct DuckDuckGoClient {
    http_client: Client,
    html_url: String,
    lite_url: String,
    max_results: usize,
}

impl Default for DuckDuckGoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DuckDuckGoClient {
    pub fn new() -> Self {
        Self::with_base_urls(
            "https://html.duckduckgo.com/html/",
            "https://lite.duckduckgo.com/lite/",
        )
    }

    pub fn with_base_urls(html_url: impl Into<String>, lite_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            html_url: html_url.into(),
            lite_url: lite_url.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    async fn fetch(&self, backend: Backend, query: &str) -> Result<Vec<SearchHit>> {
        let base = match backend {
            Backend::Html => &self.html_url,
            Backend::Lite => &self.lite_url,
        };
        let search_url = format!("{}?q={}", base, utf8_percent_encode(query, NON_ALPHANUMERIC));

        let resp = self
            .http_client
            .get(&search_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("{:?} backend answered {}", backend, resp.status()));
        }
        let html = resp.text().await?;

        let mut hits = match backend {
            Backend::Html => parse_html_results(&html),
            Backend::Lite => parse_lite_results(&html),
        };
        hits.truncate(self.max_results);
        Ok(hits)
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(anyhow::anyhow!("Search query is required"));
        }

        let mut last_error = None;
        for backend in [Backend::Html, Backend::Lite] {
            match self.fetch(backend, query).await {
                Ok(hits) if !hits.is_empty() => {
                    debug!("{:?} backend returned {} hits", backend, hits.len());
                    return Ok(hits);
                }
                Ok(_) => debug!("{:?} backend returned no hits", backend),
                Err(e) => {
                    warn!("{:?} backend failed: {}", backend, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        match last_error {
            Some(error) => Err(anyhow::anyhow!("{NO_RESULTS} Last error: {error}")),
            None => Err(anyhow::anyhow!(NO_RESULTS)),
        }
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Resolves DuckDuckGo redirect links to their `uddg` target
fn resolve_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| url.to_string()),
        Err(_) => href.to_string(),
    }
}

fn parse_html_results(html: &str) -> Vec<SearchHit> {
    let (Some(result_selector), Some(link_selector), Some(snippet_selector)) = (
        selector(".result"),
        selector(".result__a"),
        selector(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&result_selector)
        .filter_map(|result| {
            let link = result.select(&link_selector).next()?;
            let href = resolve_href(link.value().attr("href").unwrap_or_default());
            if href.is_empty() {
                return None;
            }
            Some(SearchHit {
                title: text_of(link),
                href,
                body: result
                    .select(&snippet_selector)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_lite_results(html: &str) -> Vec<SearchHit> {
    let (Some(link_selector), Some(snippet_selector)) =
        (selector("a.result-link"), selector("td.result-snippet"))
    else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let snippets: Vec<String> = document.select(&snippet_selector).map(text_of).collect();
    document
        .select(&link_selector)
        .enumerate()
        .map(|(i, link)| SearchHit {
            title: text_of(link),
            href: resolve_href(link.value().attr("href").unwrap_or_default()),
            body: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.href.is_empty())
        .collect()
}
