//! Wikipedia summary lookup
//!
//! Finds the article best matching a seed text via the search API, then
//! fetches its summary from the REST endpoint.

use super::CapabilityError;
use serde::Deserialize;
use std::time::Duration;

const NO_MATCH: &str = "No relevant Wikipedia data found for this document.";

/// Characters of first-page text considered for the seed query
const SEED_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    title: String,
    #[serde(default)]
    extract: String,
}

/// A resolved article summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSummary {
    pub title: String,
    pub summary: String,
}

impl WikiSummary {
    pub fn format(&self) -> String {
        format!("📖 Wiki Summary: {}\n\n{}", self.title, self.summary)
    }
}

#[derive(Debug, Clone)]
pub struct WikiClient {
    http: reqwest::Client,
    base_url: String,
    sentences: usize,
}

impl WikiClient {
    /// Client for `https://<language>.wikipedia.org`
    pub fn new(language: &str) -> Result<Self, CapabilityError> {
        Self::with_base_url(format!("https://{}.wikipedia.org", language))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CapabilityError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("convertbot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sentences: 5,
        })
    }

    /// Best-matching article summary for `seed`
    pub async fn summarize(&self, seed: &str) -> Result<WikiSummary, CapabilityError> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(CapabilityError::NotFound(NO_MATCH.to_string()));
        }

        let summary = match self.lookup(seed).await {
            Ok(summary) => summary,
            Err(CapabilityError::Http(e)) => {
                tracing::warn!("Wikipedia lookup failed: {}", e);
                return Err(CapabilityError::NotFound(NO_MATCH.to_string()));
            }
            Err(e) => return Err(e),
        };
        let text = first_sentences(&summary.extract, self.sentences);
        if text.is_empty() {
            return Err(CapabilityError::NotFound(NO_MATCH.to_string()));
        }

        Ok(WikiSummary {
            title: summary.title,
            summary: text,
        })
    }

    async fn lookup(&self, seed: &str) -> Result<SummaryResponse, CapabilityError> {
        let title = self.search(seed).await?.unwrap_or_else(|| seed.to_string());
        self.fetch_summary(&title).await
    }

    async fn search(&self, seed: &str) -> Result<Option<String>, CapabilityError> {
        let response: SearchResponse = self
            .http
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", seed),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .query
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title))
    }

    async fn fetch_summary(&self, title: &str) -> Result<SummaryResponse, CapabilityError> {
        let mut url = reqwest::Url::parse(&format!("{}/api/rest_v1/page/summary/", self.base_url))
            .map_err(|e| CapabilityError::InvalidInput(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CapabilityError::InvalidInput("wiki base url".to_string()))?
            .pop_if_empty()
            .push(title);

        let response = self.http.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CapabilityError::NotFound(NO_MATCH.to_string()));
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

/// Query derived from a document's first page: the first line of its
/// first 100 characters, or `fallback` (the file name) when that is blank
pub fn seed_query(first_page: &str, fallback: &str) -> String {
    let head: String = first_page.chars().take(SEED_CHARS).collect();
    let line = head.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.is_empty() {
        fallback.trim().to_string()
    } else {
        line.to_string()
    }
}

/// First `count` sentences of `text`
pub fn first_sentences(text: &str, count: usize) -> String {
    let text = text.trim();
    let mut found = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map(|(_, next)| next.is_whitespace()).unwrap_or(true);
            if at_boundary {
                found += 1;
                if found == count {
                    return text[..i + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sentences() {
        let text = "One. Two! Three? Four. Five. Six. Seven.";
        assert_eq!(first_sentences(text, 5), "One. Two! Three? Four. Five.");
        assert_eq!(first_sentences("Short text", 5), "Short text");
        // Decimal points are not sentence ends
        assert_eq!(first_sentences("Pi is 3.14 roughly. Next.", 1), "Pi is 3.14 roughly.");
    }

    #[test]
    fn test_seed_query() {
        assert_eq!(seed_query("\n  Rust (language)\nbody text", "doc.pdf"), "Rust (language)");
        assert_eq!(seed_query("   \n\n", "doc"), "doc");
        let long = format!("{}\nsecond", "a".repeat(150));
        assert_eq!(seed_query(&long, "doc").len(), SEED_CHARS);
    }

    #[test]
    fn test_summary_format() {
        let summary = WikiSummary {
            title: "Rust".to_string(),
            summary: "A language.".to_string(),
        };
        assert_eq!(summary.format(), "📖 Wiki Summary: Rust\n\nA language.");
    }

    #[tokio::test]
    async fn test_blank_seed_is_not_found() {
        let client = WikiClient::with_base_url("http://127.0.0.1:9").unwrap();
        let err = client.summarize("   ").await.unwrap_err();
        assert_eq!(err.to_string(), NO_MATCH);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_not_found() {
        let client = WikiClient::with_base_url("http://127.0.0.1:9").unwrap();
        let err = client.summarize("Photosynthesis").await.unwrap_err();
        assert!(matches!(err, CapabilityError::NotFound(_)));
        assert_eq!(err.to_string(), NO_MATCH);
    }

    #[test]
    fn test_parse_responses() {
        let json = r#"{"batchcomplete":"","query":{"search":[{"ns":0,"title":"Rust (programming language)"}]}}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.query.unwrap().search[0].title, "Rust (programming language)");

        let empty: SearchResponse = serde_json::from_str(r#"{"batchcomplete":""}"#).unwrap();
        assert!(empty.query.is_none());

        let summary: SummaryResponse =
            serde_json::from_str(r#"{"title":"Rust","extract":"Rust is a language."}"#).unwrap();
        assert_eq!(summary.extract, "Rust is a language.");
    }
}
