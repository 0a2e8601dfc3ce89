use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// A start URL entry for crawler input.
#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

/// Input for the apify/website-content-crawler actor.
///
/// Only the fields we set are modelled; the actor fills in defaults for the rest.
#[derive(Debug, Clone, Serialize)]
pub struct ContentCrawlerInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    #[serde(rename = "maxCrawlPages")]
    pub max_crawl_pages: u32,
    #[serde(rename = "maxCrawlDepth")]
    pub max_crawl_depth: u32,
    /// "playwright:firefox", "playwright:chrome", "cheerio", ...
    #[serde(rename = "crawlerType")]
    pub crawler_type: String,
    #[serde(rename = "saveMarkdown")]
    pub save_markdown: bool,
    #[serde(rename = "removeCookieWarnings")]
    pub remove_cookie_warnings: bool,
}

impl ContentCrawlerInput {
    /// Single-page crawl of `url` with a JS-capable browser, returning markdown.
    pub fn single_page(url: &str) -> Self {
        Self {
            start_urls: vec![StartUrl {
                url: url.to_string(),
            }],
            max_crawl_pages: 1,
            max_crawl_depth: 0,
            crawler_type: "playwright:firefox".to_string(),
            save_markdown: true,
            remove_cookie_warnings: true,
        }
    }
}

/// Crawl metadata attached to each crawled page.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlInfo {
    #[serde(rename = "loadedUrl")]
    pub loaded_url: Option<String>,
    #[serde(rename = "httpStatusCode")]
    pub http_status_code: Option<u16>,
}

/// A single crawled page from the website-content-crawler dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub markdown: Option<String>,
    pub text: Option<String>,
    pub crawl: Option<CrawlInfo>,
}

impl CrawledPage {
    /// Returns markdown when the actor produced it, otherwise the plain text.
    pub fn content(&self) -> Option<&str> {
        self.markdown
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.text.as_deref())
    }
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Terminal state of an actor run as reported by the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

impl RunData {
    pub fn state(&self) -> RunState {
        match self.status.as_str() {
            "SUCCEEDED" => RunState::Succeeded,
            "FAILED" | "ABORTED" | "TIMED-OUT" => RunState::Failed,
            _ => RunState::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawled_page_prefers_markdown() {
        let page: CrawledPage = serde_json::from_value(serde_json::json!({
            "url": "https://example.com",
            "markdown": "# Hello",
            "text": "Hello"
        }))
        .unwrap();
        assert_eq!(page.content(), Some("# Hello"));
    }

    #[test]
    fn crawled_page_falls_back_to_text_when_markdown_blank() {
        let page: CrawledPage = serde_json::from_value(serde_json::json!({
            "url": "https://example.com",
            "markdown": "   ",
            "text": "Hello"
        }))
        .unwrap();
        assert_eq!(page.content(), Some("Hello"));
    }

    #[test]
    fn run_state_maps_terminal_statuses() {
        let run = |status: &str| RunData {
            id: "r".into(),
            status: status.into(),
            default_dataset_id: "d".into(),
            started_at: None,
            finished_at: None,
        };
        assert_eq!(run("SUCCEEDED").state(), RunState::Succeeded);
        assert_eq!(run("TIMED-OUT").state(), RunState::Failed);
        assert_eq!(run("ABORTED").state(), RunState::Failed);
        assert_eq!(run("RUNNING").state(), RunState::Running);
    }

    #[test]
    fn single_page_input_serializes_actor_field_names() {
        let input = ContentCrawlerInput::single_page("https://example.com/rent");
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["startUrls"][0]["url"], "https://example.com/rent");
        assert_eq!(value["maxCrawlPages"], 1);
        assert_eq!(value["saveMarkdown"], true);
    }
}
