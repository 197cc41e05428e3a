//! Sending finished summaries to a Karakeep list.
//!
//! The workflow runs `TitleGeneration → ListResolution → ItemCreation → Done`
//! and stops at the first failing stage. Title generation degrades to a
//! host-derived title instead of failing.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::assembler::SummaryResult;
use crate::error::{AppError, ListIntegrationError};
use crate::llm::LlmClient;
use crate::source::SourceUrl;

const MAX_TITLE_CHARS: usize = 255;
const LIST_WRAPPER_KEYS: [&str; 4] = ["data", "results", "items", "lists"];

#[derive(Clone)]
pub struct KarakeepConfig {
    /// Base API URL, e.g. `https://karakeep.example.com/api/v1`
    pub api_url: String,
    pub api_key: String,
    /// List that summaries are sent to
    pub list_name: String,
    pub timeout: Duration,
}

impl fmt::Debug for KarakeepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KarakeepConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("list_name", &self.list_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KarakeepConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, list_name: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            list_name: list_name.into(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItemRequest {
    pub title: String,
    pub body_markdown: String,
    pub source_url: String,
    pub target_list_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStage {
    TitleGeneration,
    ListResolution,
    ItemCreation,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListItemOutcome {
    pub success: bool,
    pub external_item_id: Option<String>,
    pub error_message: Option<String>,
    /// `Done` on success, otherwise the stage that failed.
    pub stage: SendStage,
    #[serde(skip)]
    pub error: Option<ListIntegrationError>,
}

impl ListItemOutcome {
    fn done(item_id: String) -> Self {
        Self {
            success: true,
            external_item_id: Some(item_id),
            error_message: None,
            stage: SendStage::Done,
            error: None,
        }
    }

    fn failed(stage: SendStage, error: ListIntegrationError) -> Self {
        Self {
            success: false,
            external_item_id: None,
            error_message: Some(error.to_string()),
            stage,
            error: Some(error),
        }
    }
}

/// Remote list/bookmark service.
#[async_trait]
pub trait ListService: Send + Sync {
    /// All lists, in the order the service returns them.
    async fn lists(&self) -> Result<Vec<ListRef>, ListIntegrationError>;

    /// Creates the item, attaches it to `list_id` and returns the item id.
    async fn create_item(&self, list_id: &str, item: &ListItemRequest) -> Result<String, ListIntegrationError>;
}

pub struct KarakeepClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl KarakeepClient {
    pub fn new(config: &KarakeepConfig) -> crate::error::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build Karakeep HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ListService for KarakeepClient {
    async fn lists(&self) -> Result<Vec<ListRef>, ListIntegrationError> {
        let endpoint = format!("{}/lists", self.api_url);
        let res = self
            .client
            .get(&endpoint)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ListIntegrationError::ListLookupFailed(e.to_string()))?;

        let body = success_json(res).await.map_err(ListIntegrationError::ListLookupFailed)?;
        parse_lists(&body)
    }

    async fn create_item(&self, list_id: &str, item: &ListItemRequest) -> Result<String, ListIntegrationError> {
        let payload = json!({
            "title": item.title.chars().take(MAX_TITLE_CHARS).collect::<String>(),
            "text": item.body_markdown,
            "type": "text",
            "archived": false,
            "favourited": false,
            "url": item.source_url,
            "note": format!("Summary generated from: {}", item.source_url),
        });

        let res = self
            .client
            .post(format!("{}/bookmarks", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ListIntegrationError::ItemCreationFailed(e.to_string()))?;
        let created = success_json(res).await.map_err(ListIntegrationError::ItemCreationFailed)?;
        let bookmark_id = id_string(&created).ok_or_else(|| {
            ListIntegrationError::ItemCreationFailed("bookmark response did not contain an id".to_string())
        })?;

        let res = self
            .client
            .put(format!("{}/lists/{}/bookmarks/{}", self.api_url, list_id, bookmark_id))
            .bearer_auth(&self.api_key)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ListIntegrationError::ItemCreationFailed(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let reason = match res.text().await {
                Ok(body) => service_message(status.as_u16(), &body),
                Err(e) => format!("HTTP {}: failed to read response body: {}", status.as_u16(), e),
            };
            return Err(ListIntegrationError::ItemCreationFailed(format!(
                "bookmark {} created but linking to list {} failed: {}",
                bookmark_id, list_id, reason
            )));
        }

        Ok(bookmark_id)
    }
}

/// Parses a 2xx JSON body; anything else becomes the service's own message.
async fn success_json(res: Response) -> Result<Value, String> {
    let status = res.status();
    let body = res.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(service_message(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| format!("invalid JSON from list service: {}", e))
}

fn service_message(status: u16, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    format!("HTTP {}: {}", status, message)
}

fn parse_lists(body: &Value) -> Result<Vec<ListRef>, ListIntegrationError> {
    let entries = match body {
        Value::Array(items) => items,
        Value::Object(map) => LIST_WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .ok_or_else(|| {
                ListIntegrationError::ListLookupFailed(format!(
                    "lists response has none of the keys {}",
                    LIST_WRAPPER_KEYS.join(", ")
                ))
            })?,
        _ => {
            return Err(ListIntegrationError::ListLookupFailed(
                "lists response is neither an array nor an object".to_string(),
            ));
        }
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            let id = id_string(entry)?;
            Some(ListRef {
                id,
                name: name.to_string(),
            })
        })
        .collect())
}

fn id_string(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// "Summary: host" for when the LLM cannot produce a title.
pub fn fallback_title(source_url: &str) -> String {
    SourceUrl::parse(source_url)
        .ok()
        .and_then(|source| source.display_host().map(|host| format!("Summary: {}", host)))
        .unwrap_or_else(|| "Summary".to_string())
}

pub struct ListIntegrationClient {
    service: Arc<dyn ListService>,
    llm: Arc<LlmClient>,
}

impl ListIntegrationClient {
    pub fn new(service: Arc<dyn ListService>, llm: Arc<LlmClient>) -> Self {
        Self { service, llm }
    }

    pub async fn send(&self, summary: &SummaryResult, target_list_name: &str) -> ListItemOutcome {
        // TitleGeneration
        let title = match self.llm.generate_title(&summary.markdown_text).await {
            Ok(title) => title,
            Err(err) => {
                let title = fallback_title(&summary.original_url);
                warn!(error = %err, title = %title, "Title generation failed, using fallback title");
                title
            }
        };

        // ListResolution
        let lists = match self.service.lists().await {
            Ok(lists) => lists,
            Err(err) => return ListItemOutcome::failed(SendStage::ListResolution, err),
        };
        let Some(list) = lists.into_iter().find(|l| l.name == target_list_name) else {
            warn!(list = target_list_name, "Target list not found");
            return ListItemOutcome::failed(
                SendStage::ListResolution,
                ListIntegrationError::ListNotFound(target_list_name.to_string()),
            );
        };

        // ItemCreation
        let request = ListItemRequest {
            title,
            body_markdown: summary.markdown_text.clone(),
            source_url: summary.original_url.clone(),
            target_list_name: target_list_name.to_string(),
        };
        match self.service.create_item(&list.id, &request).await {
            Ok(item_id) => {
                info!(list = target_list_name, list_id = %list.id, item_id = %item_id, "Summary sent to list");
                ListItemOutcome::done(item_id)
            }
            Err(err) => ListItemOutcome::failed(SendStage::ItemCreation, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::TokenBudget;
    use crate::error::LlmError;
    use crate::llm::testing::{fast_retry, ScriptedBackend};
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post, put},
        Json, Router,
    };
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        created: Mutex<Vec<Value>>,
        linked: Mutex<Vec<(String, String)>>,
    }

    async fn karakeep_fixture(lists: Value, recorded: Arc<Recorded>) -> KarakeepConfig {
        let app = Router::new()
            .route(
                "/api/v1/lists",
                get(move |headers: HeaderMap| {
                    let lists = lists.clone();
                    async move {
                        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer kk-key") {
                            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"})));
                        }
                        (StatusCode::OK, Json(lists))
                    }
                }),
            )
            .route(
                "/api/v1/bookmarks",
                post(|State(rec): State<Arc<Recorded>>, Json(body): Json<Value>| async move {
                    rec.created.lock().unwrap().push(body);
                    (StatusCode::CREATED, Json(json!({"id": "bm_42"})))
                }),
            )
            .route(
                "/api/v1/lists/:list_id/bookmarks/:bookmark_id",
                put(|State(rec): State<Arc<Recorded>>, Path((list, bookmark)): Path<(String, String)>| async move {
                    rec.linked.lock().unwrap().push((list, bookmark));
                    StatusCode::NO_CONTENT
                }),
            )
            .with_state(recorded);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fixture server");
        });
        KarakeepConfig::new(format!("http://{}/api/v1/", addr), "kk-key", "Reading")
    }

    fn summary() -> SummaryResult {
        SummaryResult {
            original_url: "https://www.example.com/post".into(),
            markdown_text: "# Post\n\n- key point".into(),
            html_text: None,
            generated_at: Utc::now(),
            chunk_count: 1,
            unreduced: false,
        }
    }

    fn integration(config: &KarakeepConfig, titles: Vec<Result<String, LlmError>>) -> ListIntegrationClient {
        let llm = LlmClient::new(ScriptedBackend::new(titles), fast_retry(), TokenBudget::default());
        ListIntegrationClient::new(Arc::new(KarakeepClient::new(config).unwrap()), Arc::new(llm))
    }

    #[test]
    fn list_responses_in_several_shapes() {
        let bare = json!([{"id": "a", "name": "Reading"}, {"name": "No id"}]);
        assert_eq!(
            parse_lists(&bare).unwrap(),
            vec![ListRef { id: "a".into(), name: "Reading".into() }]
        );

        let wrapped = json!({"lists": [{"id": 7, "name": "Work"}]});
        assert_eq!(parse_lists(&wrapped).unwrap()[0].id, "7");

        assert!(matches!(
            parse_lists(&json!({"unexpected": true})),
            Err(ListIntegrationError::ListLookupFailed(_))
        ));
    }

    #[test]
    fn fallback_title_uses_host() {
        assert_eq!(fallback_title("https://www.example.com/a/b"), "Summary: example.com");
        assert_eq!(fallback_title("not a url"), "Summary");
    }

    #[tokio::test]
    async fn sends_summary_to_first_matching_list() {
        let recorded = Arc::new(Recorded::default());
        let lists = json!({"lists": [
            {"id": "l1", "name": "reading"},
            {"id": "l2", "name": "Reading"},
            {"id": "l3", "name": "Reading"}
        ]});
        let config = karakeep_fixture(lists, recorded.clone()).await;
        let client = integration(&config, vec![Ok("Key Points of the Post".into())]);

        let outcome = client.send(&summary(), "Reading").await;

        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.external_item_id.as_deref(), Some("bm_42"));
        assert_eq!(outcome.stage, SendStage::Done);

        let created = recorded.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["title"], "Key Points of the Post");
        assert_eq!(created[0]["text"], "# Post\n\n- key point");
        assert_eq!(created[0]["type"], "text");
        assert_eq!(created[0]["url"], "https://www.example.com/post");
        assert_eq!(
            *recorded.linked.lock().unwrap(),
            vec![("l2".to_string(), "bm_42".to_string())]
        );
    }

    #[tokio::test]
    async fn unknown_list_creates_nothing() {
        let recorded = Arc::new(Recorded::default());
        let config = karakeep_fixture(json!([{"id": "l1", "name": "Work"}]), recorded.clone()).await;
        let client = integration(&config, vec![Ok("Title".into())]);

        let outcome = client.send(&summary(), "Reading").await;

        assert!(!outcome.success);
        assert_eq!(outcome.stage, SendStage::ListResolution);
        assert!(outcome.error_message.unwrap().contains("ListNotFound"));
        assert!(recorded.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn title_failure_falls_back_to_host() {
        let recorded = Arc::new(Recorded::default());
        let config = karakeep_fixture(json!([{"id": "l1", "name": "Reading"}]), recorded.clone()).await;
        let client = integration(&config, vec![Err(LlmError::AuthError("bad key".into()))]);

        let outcome = client.send(&summary(), "Reading").await;

        assert!(outcome.success);
        assert_eq!(recorded.created.lock().unwrap()[0]["title"], "Summary: example.com");
    }

    #[tokio::test]
    async fn lookup_errors_surface_service_message() {
        let recorded = Arc::new(Recorded::default());
        let mut config = karakeep_fixture(json!([]), recorded).await;
        config.api_key = "wrong".into();
        let client = integration(&config, vec![Ok("Title".into())]);

        let outcome = client.send(&summary(), "Reading").await;

        assert!(!outcome.success);
        assert_eq!(outcome.stage, SendStage::ListResolution);
        assert_eq!(
            outcome.error,
            Some(ListIntegrationError::ListLookupFailed("HTTP 401: Unauthorized".into()))
        );
    }

    #[tokio::test]
    async fn link_failure_surfaces_service_message() {
        let app = Router::new()
            .route(
                "/api/v1/bookmarks",
                post(|| async { (StatusCode::CREATED, Json(json!({"id": "bm_7"}))) }),
            )
            .route(
                "/api/v1/lists/:list_id/bookmarks/:bookmark_id",
                put(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "list is archived"}))) }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fixture server");
        });
        let config = KarakeepConfig::new(format!("http://{}/api/v1", addr), "kk-key", "Reading");
        let item = ListItemRequest {
            title: "Title".into(),
            body_markdown: "# Post".into(),
            source_url: "https://example.com/post".into(),
            target_list_name: "Reading".into(),
        };

        let err = KarakeepClient::new(&config).unwrap().create_item("l1", &item).await.unwrap_err();

        assert_eq!(
            err,
            ListIntegrationError::ItemCreationFailed(
                "bookmark bm_7 created but linking to list l1 failed: HTTP 500: list is archived".into()
            )
        );
    }

    /// Reads one request (headers plus a Content-Length body) off a raw socket.
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        use tokio::io::AsyncReadExt;
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let declared = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if !name.eq_ignore_ascii_case("content-length") {
                            return None;
                        }
                        value.trim().parse::<usize>().ok()
                    })
                    .unwrap_or(0);
                if data.len() >= end + 4 + declared {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    #[tokio::test]
    async fn unreadable_link_error_body_is_reported() {
        use tokio::io::AsyncWriteExt;

        // The link response promises more body than it sends, then hangs up.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    let reply = if request.starts_with("POST") {
                        "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: 13\r\nconnection: close\r\n\r\n{\"id\":\"bm_9\"}"
                    } else {
                        "HTTP/1.1 500 Internal Server Error\r\ncontent-type: application/json\r\ncontent-length: 100\r\nconnection: close\r\n\r\n{\"mess"
                    };
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        let config = KarakeepConfig::new(format!("http://{}/api/v1", addr), "kk-key", "Reading");
        let item = ListItemRequest {
            title: "Title".into(),
            body_markdown: "# Post".into(),
            source_url: "https://example.com/post".into(),
            target_list_name: "Reading".into(),
        };

        let err = KarakeepClient::new(&config).unwrap().create_item("l1", &item).await.unwrap_err();

        let ListIntegrationError::ItemCreationFailed(message) = err else {
            panic!("expected ItemCreationFailed, got {:?}", err);
        };
        assert!(message.starts_with("bookmark bm_9 created but linking to list l1 failed: HTTP 500"), "{}", message);
        assert!(message.contains("failed to read response body"), "{}", message);
    }
}
