//! Retrieval tool: web search plus concurrent page fetch.
//!
//! One call runs a Programmable Search query, fetches the top links at the
//! same time, and concatenates the page text in search order with a source
//! header per page.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use relaybot_core::config::schema::SearchConfig;

use super::base::{require_string, Tool};

/// Name the dialogue model calls the tool by.
pub const RETRIEVAL_TOOL_NAME: &str = "comprehensive_search_and_scrape";

/// Returned when the search finds nothing.
pub const NO_INFORMATION: &str = "No relevant information could be found on the web.";

/// Returned when results exist but no page behind them could be read.
pub const NO_READABLE_SOURCES: &str =
    "Related results were found, but their contents could not be read.";

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/537.36 (KHTML, like Gecko)";

// ─────────────────────────────────────────────
// RetrievalTool
// ─────────────────────────────────────────────

pub struct RetrievalTool {
    config: SearchConfig,
    client: Client,
}

impl RetrievalTool {
    pub fn new(config: SearchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs.max(1)))
            .build()
            .context("building retrieval HTTP client")?;
        Ok(Self { config, client })
    }

    /// Run the search and return the top result items in rank order.
    async fn search(&self, query: &str) -> anyhow::Result<Vec<Value>> {
        if !self.config.is_configured() {
            anyhow::bail!("search is not configured (set search.apiKey and search.engineId)");
        }

        let num = self.config.max_results.clamp(1, 10).to_string();
        let resp = self
            .client
            .get(&self.config.api_base)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("search request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("search API returned {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse search response: {e}"))?;

        let mut items = body["items"].as_array().cloned().unwrap_or_default();
        items.truncate(self.config.max_results);
        Ok(items)
    }

    /// Search and gather page text into one evidence string.
    pub async fn retrieve(&self, query: &str) -> anyhow::Result<String> {
        info!(query = %query, "Retrieval started");

        let items = self.search(query).await?;
        if items.is_empty() {
            warn!(query = %query, "Search returned no results");
            return Ok(NO_INFORMATION.to_string());
        }

        let links: Vec<String> = items
            .iter()
            .filter_map(|item| item["link"].as_str())
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .collect();
        if links.is_empty() {
            warn!(query = %query, "Search results carry no links");
            return Ok(NO_READABLE_SOURCES.to_string());
        }

        let handles: Vec<_> = links
            .iter()
            .map(|url| {
                let client = self.client.clone();
                let url = url.clone();
                let max_chars = self.config.max_page_chars;
                tokio::spawn(async move { fetch_page(&client, &url, max_chars).await })
            })
            .collect();

        let mut evidence = String::new();
        let mut readable = 0;
        for (i, (url, handle)) in links.iter().zip(handles).enumerate() {
            let content = match handle.await {
                Ok(Ok(text)) => {
                    readable += 1;
                    text
                }
                Ok(Err(e)) => {
                    debug!(url = %url, error = %e, "Page fetch failed");
                    format!("(could not read this page: {e})")
                }
                Err(e) => format!("(could not read this page: {e})"),
            };
            evidence.push_str(&format!("\n\n--- [Source {} ({url})] ---\n{content}", i + 1));
        }

        if readable == 0 {
            warn!(query = %query, "No fetched page was readable");
            return Ok(NO_READABLE_SOURCES.to_string());
        }

        info!(query = %query, sources = links.len(), readable, "Retrieval finished");
        Ok(evidence.trim().to_string())
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVAL_TOOL_NAME
    }

    fn description(&self) -> &str {
        "The only tool available. Searches the web and combines several pages into detailed \
         information, for recent events or anything you do not know."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The core question or keywords to search for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let query = require_string(&params, "query")?;
        self.retrieve(&query).await
    }
}

// ─────────────────────────────────────────────
// Page fetch
// ─────────────────────────────────────────────

async fn fetch_page(client: &Client, url: &str, max_chars: usize) -> anyhow::Result<String> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("HTTP {}", resp.status());
    }
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = resp.text().await?;

    let text = if content_type.contains("html") || body.trim_start().starts_with('<') {
        html_to_text(&body)
    } else {
        body.trim().to_string()
    };
    if text.is_empty() {
        anyhow::bail!("page has no text");
    }
    Ok(text.chars().take(max_chars).collect())
}

/// Strip tags, scripts, and styles, then collapse whitespace.
fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut skipping = false;
    let mut tag = String::new();
    let mut reading_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                reading_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                match tag.to_lowercase().as_str() {
                    "script" | "style" => skipping = true,
                    "/script" | "/style" => skipping = false,
                    "br" | "br/" | "p" | "/p" | "div" | "/div" | "li" | "/h1" | "/h2" | "/h3" => {
                        out.push('\n')
                    }
                    _ => {}
                }
            }
            _ if in_tag => {
                if reading_tag && (ch.is_alphanumeric() || ch == '/') {
                    tag.push(ch);
                } else {
                    reading_tag = false;
                }
            }
            _ if skipping => {}
            _ => out.push(ch),
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> SearchConfig {
        SearchConfig {
            api_key: "key".into(),
            engine_id: "cx".into(),
            api_base: format!("{}/search", server.uri()),
            ..SearchConfig::default()
        }
    }

    fn html_page(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string(format!("<html><body><p>{body}</p></body></html>"))
    }

    #[test]
    fn test_html_to_text() {
        let html = "<style>p{}</style><h1>Title</h1><p>Hello <b>world</b> &amp; more</p><script>x()</script>";
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello world & more"));
        assert!(!text.contains("x()"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_definition() {
        let tool = RetrievalTool::new(SearchConfig::default()).unwrap();
        let def = tool.to_definition();
        assert_eq!(def.function.name, RETRIEVAL_TOOL_NAME);
        assert_eq!(def.function.parameters["required"][0], "query");
    }

    #[tokio::test]
    async fn test_unconfigured_search_is_an_error() {
        let tool = RetrievalTool::new(SearchConfig::default()).unwrap();
        assert!(tool.retrieve("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_concatenates_sources_in_search_order() {
        let server = MockServer::start().await;
        let links: Vec<String> = (1..=3).map(|i| format!("{}/page{i}", server.uri())).collect();

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust news"))
            .and(query_param("num", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": links.iter().map(|l| json!({"link": l})).collect::<Vec<_>>()
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page1"))
            .respond_with(html_page("first page").set_delay(Duration::from_millis(150)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page2"))
            .respond_with(html_page("second page"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(config(&server)).unwrap();
        let mut params = HashMap::new();
        params.insert("query".into(), json!("rust news"));
        let out = tool.execute(params).await.unwrap();

        let first = out.find("[Source 1 (").unwrap();
        let second = out.find("[Source 2 (").unwrap();
        let third = out.find("[Source 3 (").unwrap();
        assert!(first < second && second < third);
        assert!(out.starts_with("--- [Source 1"));
        assert!(out.contains("first page"));
        assert!(out.contains("second page"));
        assert!(out.contains(&links[2]));
        assert!(out.contains("could not read this page"));
    }

    #[tokio::test]
    async fn test_empty_results_return_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kind": "customsearch#search"})))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(config(&server)).unwrap();
        assert_eq!(tool.retrieve("nothing").await.unwrap(), NO_INFORMATION);
    }

    #[tokio::test]
    async fn test_unreadable_pages_return_sentinel() {
        let server = MockServer::start().await;
        let link = format!("{}/gone", server.uri());
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"link": link}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(config(&server)).unwrap();
        assert_eq!(tool.retrieve("q").await.unwrap(), NO_READABLE_SOURCES);
    }

    #[tokio::test]
    async fn test_results_without_links_return_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"title": "no link"}]})))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(config(&server)).unwrap();
        assert_eq!(tool.retrieve("q").await.unwrap(), NO_READABLE_SOURCES);
    }

    #[tokio::test]
    async fn test_client_applies_timeout_and_user_agent() {
        let server = MockServer::start().await;
        let slow = format!("{}/slow", server.uri());
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"link": slow}]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(html_page("too late").set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(SearchConfig {
            fetch_timeout_secs: 1,
            ..config(&server)
        })
        .unwrap();
        assert_eq!(tool.retrieve("q").await.unwrap(), NO_READABLE_SOURCES);
    }

    #[tokio::test]
    async fn test_search_http_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let tool = RetrievalTool::new(config(&server)).unwrap();
        let err = tool.retrieve("q").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
