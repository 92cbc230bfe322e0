use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PageFetcher;
use crate::cache::SharedFifoCache;
use crate::text::truncate_chars;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Gecko/20100101 Firefox/115.0";

/// Fetches pages over HTTP and reduces HTML or PDF bodies to whitespace-normalised text.
///
/// Results are kept in a bounded FIFO cache keyed by URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_chars: usize,
    cache: SharedFifoCache<String, String>,
}

impl HttpFetcher {
    pub fn new(max_chars: usize, cache_capacity: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            max_chars,
            cache: SharedFifoCache::new(cache_capacity),
        })
    }

    async fn download(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/pdf;q=0.8,*/*;q=0.7",
            )
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let body = response.bytes().await?;

        if is_pdf(&content_type, &body) {
            debug!("Extracting PDF text from {}", truncate_chars(url, 80));
            return tokio::task::spawn_blocking(move || pdf_to_text(&body)).await?;
        }

        Ok(html_to_text(&String::from_utf8_lossy(&body)))
    }
}

/// True for a PDF content type or a body starting with the `%PDF` magic bytes.
pub fn is_pdf(content_type: &str, body: &[u8]) -> bool {
    content_type.contains("application/pdf") || body.starts_with(b"%PDF")
}

/// Text layer of a PDF document, whitespace-normalised.
pub fn pdf_to_text(bytes: &[u8]) -> anyhow::Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)?;
    Ok(collapse_whitespace(&text))
}

fn collapse_whitespace(text: &str) -> String {
    static SPACE: OnceLock<Regex> = OnceLock::new();
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    space.replace_all(text, " ").trim().to_string()
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        if let Some(cached) = self.cache.get(&url.to_string()) {
            debug!("Cache HIT for URL: {}", truncate_chars(url, 80));
            return cached;
        }

        match self.download(url).await {
            Ok(text) => {
                let text = truncate_chars(&text, self.max_chars).to_string();
                info!(
                    "Fetched and cleaned URL. Content length: {}. URL: {}",
                    text.len(),
                    truncate_chars(url, 80)
                );
                self.cache.put(url.to_string(), text.clone());
                text
            }
            Err(e) => {
                warn!("Fetch/Parse error for {} ({})", truncate_chars(url, 80), e);
                String::new()
            }
        }
    }
}

/// Drops boilerplate elements and tags, decodes common entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    static BOILERPLATE: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    let boilerplate = BOILERPLATE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|nav|header|footer|aside|form|noscript)\b.*?</(script|style|nav|header|footer|aside|form|noscript)\s*>")
            .expect("valid regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]+>").expect("valid regex"));

    let stripped = boilerplate.replace_all(html, " ");
    let stripped = tags.replace_all(&stripped, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    collapse_whitespace(&decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_boilerplate_and_tags() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><nav><a href="/">Home</a></nav>
            <p>The telegraph&nbsp;changed <b>everything</b>.</p>
            <script>alert("x")</script><footer>(c) 2024</footer></body></html>"#;

        assert_eq!(html_to_text(html), "The telegraph changed everything .");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("  Samuel   Morse\n\nsent  a message. "), "Samuel Morse sent a message.");
    }

    #[test]
    fn detects_pdf_by_header_or_magic_bytes() {
        assert!(is_pdf("application/pdf", b""));
        assert!(is_pdf("application/octet-stream", b"%PDF-1.4\n"));
        assert!(!is_pdf("text/html; charset=utf-8", b"<html></html>"));
    }

    #[test]
    fn extracts_text_from_pdf() {
        let bytes = include_bytes!("../../tests/fixtures/telegraph.pdf");

        let text = pdf_to_text(bytes).unwrap();

        assert!(text.contains("telegraph"), "got: {}", text);
        assert!(text.contains("Morse"));
        assert!(text.chars().count() > 100);
        assert!(!text.contains('\n'));
    }
}
