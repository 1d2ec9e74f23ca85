use std::str::FromStr;

use chromiumoxide::Page;
use forage_core::error::AppError;
use forage_core::traits::Extractor;
use serde_json::{Map, Value, json};
use url::Url;

use crate::browser::BrowserSession;

/// Named CSS selector for one field to pull out of a rendered page.
///
/// The selector map is caller-supplied configuration: forage makes no
/// attempt to survive target markup changes, it just reports fields as
/// `null` when their selectors stop matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }
}

impl FromStr for FieldSpec {
    type Err = AppError;

    /// Parses `name=selector`, e.g. `title=h1.post-title`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, selector)) if !name.trim().is_empty() && !selector.trim().is_empty() => {
                Ok(Self::new(name.trim(), selector.trim()))
            }
            _ => Err(AppError::Config(format!(
                "invalid field spec '{s}', expected name=selector"
            ))),
        }
    }
}

/// Selector-driven extractor backed by a pooled [`BrowserSession`].
///
/// Opens a new tab, waits for the page body, pulls the configured fields,
/// optionally harvests media URLs, and closes the tab on every exit path.
#[derive(Debug, Clone, Default)]
pub struct PageExtractor {
    fields: Vec<FieldSpec>,
    collect_media: bool,
}

impl PageExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields = fields;
        self
    }

    /// Also collect `img`/`video` source URLs into a `media` array.
    pub fn with_media(mut self, collect: bool) -> Self {
        self.collect_media = collect;
        self
    }
}

impl Extractor<BrowserSession> for PageExtractor {
    async fn extract(&self, session: &BrowserSession, target: &str) -> Result<Value, AppError> {
        // Reject garbage before spending a navigation on it.
        Url::parse(target).map_err(|e| AppError::Fatal(format!("invalid target URL '{target}': {e}")))?;

        let timeout = session.navigation_timeout();
        match tokio::time::timeout(timeout, self.extract_inner(session, target)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }
}

impl PageExtractor {
    async fn extract_inner(&self, session: &BrowserSession, target: &str) -> Result<Value, AppError> {
        let page = session
            .browser()
            .new_page(target)
            .await
            .map_err(|e| AppError::Extraction(format!("Failed to navigate to {target}: {e}")))?;

        let outcome = self.read_page(&page, target).await;

        // Close the tab to free browser resources, on success and failure alike.
        let _ = page.close().await;
        outcome
    }

    async fn read_page(&self, page: &Page, target: &str) -> Result<Value, AppError> {
        // Wait until <body> is present — a minimal signal that the page
        // has rendered its main content.
        page.find_element("body")
            .await
            .map_err(|e| AppError::Extraction(format!("Page did not render body: {e}")))?;

        let mut payload = Map::new();
        payload.insert("url".into(), json!(target));
        if let Ok(Some(final_url)) = page.url().await {
            payload.insert("final_url".into(), json!(final_url));
        }
        if let Ok(Some(title)) = page.get_title().await {
            payload.insert("title".into(), json!(title));
        }

        for field in &self.fields {
            let value = match page.find_element(field.selector.as_str()).await {
                Ok(element) => element
                    .inner_text()
                    .await
                    .ok()
                    .flatten()
                    .map(|text| text.trim().to_string()),
                Err(_) => None,
            };
            if value.is_none() {
                tracing::debug!(
                    field = %field.name,
                    selector = %field.selector,
                    target,
                    "Field not found on page"
                );
            }
            payload.insert(field.name.clone(), value.map(Value::from).unwrap_or(Value::Null));
        }

        if self.collect_media {
            payload.insert("media".into(), Value::Array(media_urls(page).await));
        }

        Ok(Value::Object(payload))
    }
}

async fn media_urls(page: &Page) -> Vec<Value> {
    let mut seen: Vec<String> = Vec::new();
    for selector in ["img", "video", "video source"] {
        let Ok(elements) = page.find_elements(selector).await else {
            continue;
        };
        for element in elements {
            if let Ok(Some(src)) = element.attribute("src").await {
                if is_media_url(&src) && !seen.contains(&src) {
                    seen.push(src);
                }
            }
        }
    }
    seen.into_iter().map(Value::String).collect()
}

/// http(s) URLs only; data: URIs and relative fragments are noise.
fn is_media_url(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}
