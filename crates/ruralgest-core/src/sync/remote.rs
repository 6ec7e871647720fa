//! Client for the remote authority (the backend HTTP API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Collection, MutationPayload};
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const PULL_ENDPOINT: &str = "/api/sync/pull";

/// Changes handed out by the remote authority since a watermark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullDelta {
    #[serde(default)]
    pub produtos: Option<Vec<Value>>,
    #[serde(default)]
    pub compras: Option<Vec<Value>>,
    #[serde(default)]
    pub consumos: Option<Vec<Value>>,
    #[serde(default)]
    pub transacoes: Option<Vec<Value>>,
    #[serde(default)]
    pub mensagens: Option<Vec<Value>>,
    /// New watermark; the client falls back to its own clock when absent
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl PullDelta {
    /// Records delivered for a collection; empty when the field was absent.
    pub fn records(&self, collection: Collection) -> &[Value] {
        let field = match collection {
            Collection::Products => &self.produtos,
            Collection::Purchases => &self.compras,
            Collection::Consumption => &self.consumos,
            Collection::Transactions => &self.transacoes,
            Collection::Messages => &self.mensagens,
        };
        field.as_deref().unwrap_or_default()
    }
}

/// The backend as seen by the sync engine
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Fetch everything that changed after `last_sync` (everything when `None`).
    async fn pull(&self, last_sync: Option<&str>) -> Result<PullDelta>;

    /// Replay one queued mutation.
    async fn push(&self, payload: &MutationPayload) -> Result<()>;
}

/// Connection settings for [`HttpRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Total attempts per request, including the first
    pub attempts: u32,
    pub retry_base_delay: Duration,
}

impl RemoteOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(15),
            attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// `reqwest`-backed remote authority
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
    attempts: u32,
    retry_base_delay: Duration,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    last_sync: Option<&'a str>,
}

impl HttpRemote {
    pub fn new(options: RemoteOptions) -> Result<Self> {
        let base_url = normalize_base_url(&options.base_url)?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(options.request_timeout)
                .build()?,
            attempts: options.attempts.max(1),
            retry_base_delay: options.retry_base_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.post_once(url, body).await;
            match result {
                Err(error) if attempt < self.attempts && is_retryable(&error) => {
                    let delay = backoff_delay(self.retry_base_delay, attempt - 1);
                    tracing::debug!(
                        "POST {} failed (attempt {}/{}): {}; retrying in {:?}",
                        url,
                        attempt,
                        self.attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn post_once<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

#[async_trait]
impl RemoteAuthority for HttpRemote {
    async fn pull(&self, last_sync: Option<&str>) -> Result<PullDelta> {
        let url = resolve_endpoint(&self.base_url, PULL_ENDPOINT);
        let response = self.post_json(&url, &PullRequest { last_sync }).await?;
        Ok(response.json::<PullDelta>().await?)
    }

    async fn push(&self, payload: &MutationPayload) -> Result<()> {
        let url = resolve_endpoint(&self.base_url, &payload.endpoint);
        self.post_json(&url, &payload.body).await?;
        Ok(())
    }
}

/// Validate a backend base address and strip trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::Config("backend URL must not be empty".to_string()))?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "backend URL must include http:// or https://".to_string(),
        ))
    }
}

/// Absolute endpoints are used as-is; anything else is joined to the base.
pub fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if is_http_url(endpoint) {
        endpoint.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Statuses worth another attempt: timeouts, throttling and server faults.
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}

fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Http(error) => error.is_timeout() || error.is_connect() || error.is_request(),
        Error::Remote { status, .. } => is_retryable_status(*status),
        _ => false,
    }
}

/// Exponential backoff with a capped exponent.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    const MAX_EXPONENT: u32 = 4;
    base.saturating_mul(2_u32.pow(retry.min(MAX_EXPONENT)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<Value>,
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let detail = payload.detail.map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        });
        if let Some(message) = detail.or(payload.message).or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("api.example.com").is_err());
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn resolve_endpoint_joins_relative_paths() {
        let base = "https://api.example.com";
        assert_eq!(
            resolve_endpoint(base, "/api/compras"),
            "https://api.example.com/api/compras"
        );
        assert_eq!(
            resolve_endpoint(base, "api/consumo"),
            "https://api.example.com/api/consumo"
        );
        assert_eq!(
            resolve_endpoint(base, "http://other.example.com/hook"),
            "http://other.example.com/hook"
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 9), backoff_delay(base, 4));
    }

    #[test]
    fn parse_api_error_prefers_detail() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"detail":"Produto não encontrado"}"#),
            "Produto não encontrado"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"bad"}"#),
            "bad"
        );
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "Internal Server Error"
        );
    }

    #[test]
    fn pull_delta_tolerates_missing_and_null_fields() {
        let delta: PullDelta = serde_json::from_value(json!({
            "produtos": [{"id": 1}],
            "compras": null,
            "timestamp": "2025-01-02T03:04:05Z"
        }))
        .unwrap();

        assert_eq!(delta.records(Collection::Products).len(), 1);
        assert!(delta.records(Collection::Purchases).is_empty());
        assert!(delta.records(Collection::Messages).is_empty());
        assert_eq!(delta.timestamp.as_deref(), Some("2025-01-02T03:04:05Z"));
    }

    /// Minimal HTTP/1.1 responder answering every request with one canned response.
    struct CannedServer {
        base_url: String,
        hits: Arc<AtomicUsize>,
        bodies: Arc<Mutex<Vec<String>>>,
    }

    async fn canned_server(status: u16, body: &'static str) -> CannedServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));

        let server_hits = Arc::clone(&hits);
        let server_bodies = Arc::clone(&bodies);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                server_hits.fetch_add(1, Ordering::SeqCst);
                respond(stream, status, body, &server_bodies).await;
            }
        });

        CannedServer {
            base_url,
            hits,
            bodies,
        }
    }

    async fn respond(mut stream: TcpStream, status: u16, body: &str, seen: &Mutex<Vec<String>>) {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 4096];
        let header_end = loop {
            let read = stream.read(&mut chunk).await.unwrap();
            buffer.extend_from_slice(&chunk[..read]);
            if let Some(position) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                break position + 4;
            }
            if read == 0 {
                break buffer.len();
            }
        };

        let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < header_end + content_length {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);
        }

        seen.lock()
            .unwrap()
            .push(String::from_utf8_lossy(&buffer[header_end..]).to_string());

        let response = format!(
            "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    fn remote(base_url: &str, attempts: u32) -> HttpRemote {
        HttpRemote::new(RemoteOptions {
            attempts,
            retry_base_delay: Duration::from_millis(10),
            ..RemoteOptions::new(base_url)
        })
        .unwrap()
    }

    #[tokio::test]
    async fn pull_sends_watermark_and_decodes_delta() {
        let server = canned_server(
            200,
            r#"{"produtos":[{"id":1,"nome":"Ureia"}],"timestamp":"2025-01-02T00:00:00Z"}"#,
        )
        .await;

        let delta = remote(&server.base_url, 1)
            .pull(Some("2025-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(delta.records(Collection::Products).len(), 1);
        assert_eq!(delta.timestamp.as_deref(), Some("2025-01-02T00:00:00Z"));
        let sent: Value = serde_json::from_str(&server.bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(sent, json!({"last_sync": "2025-01-01T00:00:00Z"}));
    }

    #[tokio::test]
    async fn push_retries_server_errors_up_to_attempt_limit() {
        let server = canned_server(503, r#"{"detail":"maintenance"}"#).await;

        let error = remote(&server.base_url, 3)
            .push(&MutationPayload::new("/api/compras", json!({"quantidade": 2})))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            Error::Remote { status: 503, ref message } if message == "maintenance"
        ));
        assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn push_does_not_retry_client_errors() {
        let server = canned_server(422, r#"{"message":"invalid"}"#).await;

        let error = remote(&server.base_url, 3)
            .push(&MutationPayload::new("/api/compras", json!({})))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Remote { status: 422, .. }));
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn push_sends_stored_body_verbatim() {
        let server = canned_server(201, "{}").await;
        let body = json!({"produto_id": 1, "quantidade": 5, "preco_unitario": 2.5});

        remote(&server.base_url, 1)
            .push(&MutationPayload::new("api/compras", body.clone()))
            .await
            .unwrap();

        let sent: Value = serde_json::from_str(&server.bodies.lock().unwrap()[0]).unwrap();
        assert_eq!(sent, body);
    }
}
