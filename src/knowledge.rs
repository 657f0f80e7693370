use std::path::Path;
use std::time::Duration;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// A fetched document as persisted for the assistant. Exactly one of
/// `content` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    pub url: String,
    pub write_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct KnowledgeCollector {
    http: reqwest::Client,
}

impl Default for KnowledgeCollector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl KnowledgeCollector {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { http }
    }

    /// Fetches `url` and writes the extracted record to `write_path`. Fetch and
    /// extraction failures are recorded in the file; only a failed write is an `Err`.
    pub async fn collect(&self, url: &str, write_path: &Path) -> anyhow::Result<KnowledgeFile> {
        let mut knowledge = KnowledgeFile {
            url: url.to_string(),
            write_path: write_path.display().to_string(),
            title: None,
            content: None,
            error: None,
        };

        match fetch_and_extract(&self.http, url).await {
            Ok((title, body)) => {
                knowledge.title = Some(title);
                // tabs only; newlines and runs of spaces are kept
                knowledge.content = Some(body.replace('\t', ""));
                metrics::counter!("turbo4_knowledge_collected_total", "outcome" => "ok").increment(1);
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "knowledge fetch failed");
                knowledge.error = Some(e.to_string());
                metrics::counter!("turbo4_knowledge_collected_total", "outcome" => "error").increment(1);
            }
        }

        if let Some(parent) = write_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(write_path, serde_json::to_string_pretty(&knowledge)?).await?;
        tracing::info!(url, path = %write_path.display(), ok = knowledge.error.is_none(), "knowledge collected");
        Ok(knowledge)
    }
}

pub async fn fetch_and_extract(http: &reqwest::Client, url: &str) -> anyhow::Result<(String, String)> {
    let parsed = url::Url::parse(url)?;
    let resp = http.get(parsed).send().await?.error_for_status()?;
    let html = resp.text().await?;
    extract(&html)
}

/// Text of `<title>` and of `<body>`.
pub fn extract(html: &str) -> anyhow::Result<(String, String)> {
    let doc = Html::parse_document(html);
    let title = select_text(&doc, "title")?;
    let body = select_text(&doc, "body")?;
    Ok((title, body))
}

fn select_text(doc: &Html, selector: &str) -> anyhow::Result<String> {
    let sel = Selector::parse(selector).map_err(|e| anyhow::anyhow!("bad selector {selector}: {e:?}"))?;
    Ok(doc.select(&sel).flat_map(|el| el.text()).collect())
}
