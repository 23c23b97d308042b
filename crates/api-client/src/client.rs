use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use migration_monitor_api_types::{RawStatusPayload, StartResponse, StartStatus};

use crate::error::{Result, TransportError};

const START_PATH: &str = "/start-migration";
const STATUS_PATH: &str = "/get-status";

/// Longest slice of an error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Server acknowledgement of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartAck {
    pub status: StartStatus,
    pub message: String,
}

impl StartAck {
    /// `true` for both a fresh start and an "already running" warning: either
    /// way the migration is active on the server and polling should run.
    pub fn accepted(&self) -> bool {
        matches!(self.status, StartStatus::Success | StartStatus::Warning)
    }

    pub fn already_running(&self) -> bool {
        self.status == StartStatus::Warning
    }
}

impl From<StartResponse> for StartAck {
    fn from(resp: StartResponse) -> Self {
        Self {
            status: resp.status,
            message: resp.message,
        }
    }
}

/// Typed HTTP client for the migration server.
///
/// Performs exactly one request per call. Retry and backoff policy belongs to
/// the caller.
#[derive(Debug, Clone)]
pub struct MigrationClient {
    client: reqwest::Client,
    base_url: String,
}

impl MigrationClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /start-migration`.
    pub async fn request_start(&self) -> Result<StartAck> {
        debug!("POST {}", self.url(START_PATH));
        let resp = self.client.post(self.url(START_PATH)).send().await?;
        let body: StartResponse = parse_response(resp).await?;
        Ok(body.into())
    }

    /// `GET /get-status`.
    pub async fn fetch_status(&self) -> Result<RawStatusPayload> {
        debug!("GET {}", self.url(STATUS_PATH));
        let resp = self.client.get(self.url(STATUS_PATH)).send().await?;
        parse_response(resp).await
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx, or a
/// [`TransportError`] carrying the status and (truncated) body text.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: truncate(text.trim(), MAX_ERROR_BODY),
        });
    }
    Ok(serde_json::from_str(&text)?)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response and return the base URL plus a handle
    /// resolving to the raw request head.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}/"), handle)
    }

    fn client(base: &str) -> MigrationClient {
        MigrationClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = client("http://localhost:5000///");
        assert_eq!(c.base_url(), "http://localhost:5000");
        assert_eq!(c.url(STATUS_PATH), "http://localhost:5000/get-status");
    }

    #[test]
    fn start_ack_accepts_success_and_warning_only() {
        let ack = |status| StartAck {
            status,
            message: String::new(),
        };
        assert!(ack(StartStatus::Success).accepted());
        assert!(ack(StartStatus::Warning).accepted());
        assert!(ack(StartStatus::Warning).already_running());
        assert!(!ack(StartStatus::Error).accepted());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    #[tokio::test]
    async fn fetch_status_decodes_payload() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"status":"migrating_groups","current_action":"Creating group","stats":{"groups":{"total":10,"completed":5},"projects":{"total":0,"completed":0}},"logs":[]}"#,
        )
        .await;

        let payload = client(&base).fetch_status().await.unwrap();
        assert_eq!(payload.status, "migrating_groups");
        assert_eq!(payload.groups().unwrap().completed, 5);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /get-status "), "got: {request}");
    }

    #[tokio::test]
    async fn fetch_status_maps_server_error_to_status() {
        let (base, _server) = serve_once("500 Internal Server Error", "boom").await;

        let err = client(&base).fetch_status().await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn fetch_status_maps_malformed_body_to_decode() {
        let (base, _server) = serve_once("200 OK", "<html>not json</html>").await;

        let err = client(&base).fetch_status().await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn request_start_posts_and_reads_ack() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"status":"warning","message":"Migration is already in progress."}"#,
        )
        .await;

        let ack = client(&base).request_start().await.unwrap();
        assert!(ack.accepted());
        assert!(ack.already_running());
        assert_eq!(ack.message, "Migration is already in progress.");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /start-migration "), "got: {request}");
    }

    #[tokio::test]
    async fn request_start_reports_rejection_as_not_accepted() {
        let (base, _server) =
            serve_once("200 OK", r#"{"status":"error","message":"tokens missing"}"#).await;

        let ack = client(&base).request_start().await.unwrap();
        assert!(!ack.accepted());
        assert_eq!(ack.message, "tokens missing");
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .fetch_status()
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)), "got: {err:?}");
    }
}
