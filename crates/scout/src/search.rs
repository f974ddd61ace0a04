pub mod parse;

pub use parse::parse_results;

use std::time::Duration;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::errors::{ClientError, ClientResult};

pub const DEFAULT_BASE_URL: &str = "https://searchapi.api.cloud.yandex.net";
pub const DEFAULT_OPERATIONS_URL: &str = "https://operation.api.cloud.yandex.net";

const MAX_POLL_ATTEMPTS: u32 = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One normalized search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub headline: String,
    pub modtime: String,
    pub lang: String,
    pub content: String,
}

/// Poll state of one submitted search operation; lives only for the
/// duration of the poll loop.
#[derive(Debug, Deserialize)]
struct SearchOperation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<OperationPayload>,
}

#[derive(Debug, Deserialize)]
struct OperationPayload {
    #[serde(rename = "rawData")]
    raw_data: Option<String>,
}

/// Per-call search parameters.
///
/// The page list is passed explicitly on every call; there is no shared
/// default that could alias between calls.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Result pages to fetch, zero-based
    pub pages: Vec<u32>,
    /// Result groups per page, 1..=100
    pub groups_on_page: u32,
    /// Documents per group, 1..=3
    pub docs_in_group: u32,
    /// Text passages extracted per document, 1..=5
    pub max_passages: u32,
    pub search_type: Option<String>,
    pub family_mode: Option<String>,
    pub fix_typo_mode: Option<String>,
    pub sort_mode: Option<String>,
    pub sort_order: Option<String>,
    pub group_mode: Option<String>,
    pub region: Option<String>,
    pub l10n: Option<String>,
    pub user_agent: Option<String>,
    pub response_format: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            pages: vec![0],
            groups_on_page: 20,
            docs_in_group: 1,
            max_passages: 5,
            search_type: None,
            family_mode: None,
            fix_typo_mode: None,
            sort_mode: None,
            sort_order: None,
            group_mode: None,
            region: None,
            l10n: None,
            user_agent: None,
            response_format: None,
        }
    }
}

/// Asynchronous client for the two-phase search API: submit one operation
/// per page, then poll each operation until its payload is ready.
pub struct SearchClient {
    client: Client,
    folder_id: String,
    search_type: String,
    family_mode: String,
    response_format: String,
    base_url: String,
    operations_url: String,
    poll_interval: Duration,
}

impl SearchClient {
    pub fn new(api_key: &str, folder_id: &str) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Api-Key {api_key}"))
            .map_err(|e| ClientError::Validation(format!("invalid api key: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {e}")))?;

        info!("search client initialized");
        Ok(Self {
            client,
            folder_id: folder_id.to_string(),
            search_type: "SEARCH_TYPE_RU".to_string(),
            family_mode: "FAMILY_MODE_STRICT".to_string(),
            response_format: "FORMAT_XML".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            operations_url: DEFAULT_OPERATIONS_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_operations_url<S: Into<String>>(mut self, operations_url: S) -> Self {
        self.operations_url = operations_url.into();
        self
    }

    pub fn with_search_type<S: Into<String>>(mut self, search_type: S) -> Self {
        self.search_type = search_type.into();
        self
    }

    pub fn with_family_mode<S: Into<String>>(mut self, family_mode: S) -> Self {
        self.family_mode = family_mode.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run one search across the requested pages and return the parsed
    /// records. Failures are contained per page and per operation: a page
    /// that cannot be submitted or an operation that never completes is
    /// dropped, never the whole batch.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchRecord> {
        info!(%query, pages = ?options.pages, "searching");

        let operations = self.submit_pages(query, options).await;
        let mut records = Vec::new();
        for operation_id in operations {
            if let Some(payload) = self.poll_operation(&operation_id).await {
                records.extend(parse_results(&payload));
            }
        }
        info!(count = records.len(), "search finished");
        records
    }

    fn request_body(&self, query: &str, page: u32, options: &SearchOptions) -> Value {
        let mut body = json!({
            "query": {
                "search_type": options.search_type.as_deref().unwrap_or(&self.search_type),
                "query_text": query,
                "family_mode": options.family_mode.as_deref().unwrap_or(&self.family_mode),
                "page": page,
                "fix_typo_mode": options.fix_typo_mode.as_deref().unwrap_or("FIX_TYPO_MODE_ON"),
            },
            "sort_spec": {
                "sort_mode": options.sort_mode.as_deref().unwrap_or("SORT_MODE_BY_RELEVANCE"),
                "sort_order": options.sort_order.as_deref().unwrap_or("SORT_ORDER_DESC"),
            },
            "group_spec": {
                "group_mode": options.group_mode.as_deref().unwrap_or("GROUP_MODE_DEEP"),
                "groups_on_page": options.groups_on_page,
                "docs_in_group": options.docs_in_group,
            },
            "max_passages": options.max_passages,
            "l10n": options.l10n.as_deref().unwrap_or("LOCALIZATION_RU"),
            "folder_id": self.folder_id,
            "response_format": options.response_format.as_deref().unwrap_or(&self.response_format),
        });
        if let Some(region) = &options.region {
            body["region"] = json!(region);
        }
        if let Some(user_agent) = &options.user_agent {
            body["user_agent"] = json!(user_agent);
        }
        body
    }

    /// Submit one async operation per page; pages that fail are skipped.
    async fn submit_pages(&self, query: &str, options: &SearchOptions) -> Vec<String> {
        let url = format!("{}/v2/web/searchAsync", self.base_url);
        let mut operations = Vec::new();

        for &page in &options.pages {
            let body = self.request_body(query, page, options);
            let response = match self.client.post(&url).json(&body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(page, "search submission failed: {e}");
                    continue;
                }
            };
            if response.status() != StatusCode::OK {
                let status = response.status();
                let error = response.text().await.unwrap_or_default();
                warn!(page, %status, %error, "search submission rejected");
                continue;
            }
            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(page, "unreadable submission reply: {e}");
                    continue;
                }
            };
            match body.get("id").and_then(Value::as_str) {
                Some(id) => {
                    debug!(page, operation = %id, "operation submitted");
                    operations.push(id.to_string());
                }
                None => warn!(page, "submission reply carried no operation id"),
            }
        }
        operations
    }

    /// Poll one operation until it reports done, sleeping a fixed interval
    /// between attempts whether or not the poll itself succeeded. An
    /// operation that never completes within the budget yields nothing.
    async fn poll_operation(&self, operation_id: &str) -> Option<String> {
        let url = format!("{}/operations/{}", self.operations_url, operation_id);

        for attempt in 0..MAX_POLL_ATTEMPTS {
            let operation: Option<SearchOperation> = match self.client.get(&url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    response.json().await.ok()
                }
                Ok(response) => {
                    debug!(operation = %operation_id, status = %response.status(), "poll rejected");
                    None
                }
                Err(e) => {
                    debug!(operation = %operation_id, "poll failed: {e}");
                    None
                }
            };

            if let Some(operation) = operation {
                if operation.done {
                    debug!(operation = %operation_id, attempt, "operation done");
                    return self.decode_payload(operation, operation_id);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        warn!(operation = %operation_id, "operation never completed, dropping");
        None
    }

    fn decode_payload(&self, operation: SearchOperation, operation_id: &str) -> Option<String> {
        let raw = operation.response.and_then(|payload| payload.raw_data)?;
        match base64::engine::general_purpose::STANDARD.decode(raw) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(operation = %operation_id, "payload is not UTF-8: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(operation = %operation_id, "payload is not valid base64: {e}");
                None
            }
        }
    }
}

/// Filter records for use in a model prompt: drop anything with empty
/// content or content length outside the open interval (min_length,
/// max_length).
pub fn optimize(
    records: Vec<SearchRecord>,
    min_length: usize,
    max_length: usize,
) -> Vec<SearchRecord> {
    let before = records.len();
    let filtered: Vec<SearchRecord> = records
        .into_iter()
        .filter(|record| {
            let length = record.content.chars().count();
            length > min_length && length < max_length
        })
        .collect();

    let dropped = before - filtered.len();
    if dropped > 0 {
        info!(dropped, "filtered out search records");
    }
    filtered
}

/// Render the records as a numbered human-readable block.
pub fn format_results(records: &[SearchRecord], query: &str) -> String {
    if records.is_empty() {
        return format!("Nothing found for '{query}'");
    }

    let mut formatted = vec![format!("Search results for '{query}':")];
    for (index, record) in records.iter().enumerate() {
        let modtime = if record.modtime.is_empty() {
            "N/A"
        } else {
            record.modtime.as_str()
        };
        let lang = if record.lang.is_empty() {
            "N/A"
        } else {
            record.lang.as_str()
        };
        formatted.push(format!(
            "{}. [{}] {}\n   URL: {}\n   Updated: {}\n   Language: {}\n   Content: {}",
            index + 1,
            record.domain,
            record.title,
            record.url,
            modtime,
            lang,
            record.content,
        ));
    }
    formatted.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(content: &str) -> SearchRecord {
        SearchRecord {
            url: "https://example.com/page".to_string(),
            domain: "example.com".to_string(),
            title: "Example".to_string(),
            headline: "An example".to_string(),
            modtime: "20250101T000000".to_string(),
            lang: "en".to_string(),
            content: content.to_string(),
        }
    }

    fn encoded(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
        <yandexsearch>
          <response>
            <results><grouping><group>
              <doc>
                <url>https://example.com/a</url>
                <domain>example.com</domain>
                <title>A page about <hlword>rust</hlword></title>
                <headline>Short headline</headline>
                <modtime>20250101T000000</modtime>
                <properties><lang>en</lang></properties>
                <passages><passage>First passage.</passage></passages>
              </doc>
            </group></grouping></results>
          </response>
        </yandexsearch>"#;

    fn client_for(server: &MockServer) -> SearchClient {
        SearchClient::new("test-key", "folder-1")
            .unwrap()
            .with_base_url(server.uri())
            .with_operations_url(server.uri())
            .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_single_page_submit_and_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/web/searchAsync"))
            .and(body_partial_json(json!({"query": {"query_text": "rust"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": true,
                "response": {"rawData": encoded(SAMPLE_XML)}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let records = client.search("rust", &SearchOptions::default()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].domain, "example.com");
        assert_eq!(records[0].content, "First passage.");
    }

    #[tokio::test]
    async fn test_rejected_page_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/web/searchAsync"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let records = client.search("rust", &SearchOptions::default()).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_never_done_operation_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/web/searchAsync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op-slow"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
            .expect(10)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let records = client.search("slow", &SearchOptions::default()).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_one_submission_per_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/web/searchAsync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "op-1"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": true,
                "response": {"rawData": encoded("<yandexsearch/>")}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = SearchOptions {
            pages: vec![0, 1],
            ..SearchOptions::default()
        };
        client.search("rust", &options).await;
    }

    #[test]
    fn test_optimize_drops_empty_and_out_of_range() {
        let records = vec![
            record(""),
            record("tiny"),
            record("this content is long enough to survive the filter"),
            record(&"x".repeat(200)),
        ];
        let filtered = optimize(records, 30, 100);

        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].content.starts_with("this content"));
    }

    #[test]
    fn test_optimize_boundaries_are_open() {
        let records = vec![record(&"a".repeat(30)), record(&"b".repeat(31))];
        let filtered = optimize(records, 30, usize::MAX);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].content.starts_with('b'));
    }

    #[test]
    fn test_optimize_leaves_survivors_unchanged() {
        let survivor = record("a perfectly reasonable chunk of content here");
        let filtered = optimize(vec![survivor.clone()], 10, usize::MAX);
        assert_eq!(filtered, vec![survivor]);
    }

    #[test]
    fn test_format_empty_is_sentinel() {
        assert_eq!(format_results(&[], "rust"), "Nothing found for 'rust'");
    }

    #[test]
    fn test_format_enumerates_in_order() {
        let records = vec![record("first result"), record("second result")];
        let formatted = format_results(&records, "rust");

        assert!(formatted.starts_with("Search results for 'rust':"));
        let first = formatted.find("1. [example.com]").unwrap();
        let second = formatted.find("2. [example.com]").unwrap();
        assert!(first < second);
        assert!(formatted.contains("Content: first result"));
        assert!(formatted.contains("URL: https://example.com/page"));
    }
}
