use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    request_id::{new_request_id, REQUEST_ID_HEADER},
    ByteStream, ChatStreamRequest, ChatTransport, LumenAiError, MemoryEntry, MemoryStore,
    MessageId, PersonaDirectory, PersonaListing,
};

const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Clone)]
/// Connection settings for the chat server.
pub struct BackendConfig {
    pub api_base: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone)]
/// HTTP client for the chat server. Implements the streaming transport and
/// the memory and persona collaborators over the same connection pool.
pub struct BackendClient {
    client: reqwest::Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, LumenAiError> {
        let api_base = config.api_base.trim();
        if api_base.is_empty() {
            return Err(LumenAiError::InvalidConfig(
                "server URL must not be empty".to_string(),
            ));
        }
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(LumenAiError::InvalidConfig(format!(
                "server URL must start with http:// or https://: {api_base}"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // No overall timeout: a streamed reply legitimately stays open for as
        // long as the model keeps producing text.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(std::time::Duration::from_millis(
                config.connect_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn api_base(&self) -> &str {
        self.config.api_base.trim().trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base(), path.trim_start_matches('/'))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .header(REQUEST_ID_HEADER, new_request_id())
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.endpoint(path))
            .header(REQUEST_ID_HEADER, new_request_id())
    }
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn open_stream(&self, request: &ChatStreamRequest) -> Result<ByteStream, LumenAiError> {
        debug!(
            images = request.images.len(),
            persona = request.persona_id.as_deref().unwrap_or("<default>"),
            "opening chat stream"
        );
        let response = self
            .post("chat/stream")
            .header(ACCEPT, EVENT_STREAM_MIME)
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains(EVENT_STREAM_MIME))
            .unwrap_or(false);
        if !is_event_stream {
            warn!("chat stream response is not labelled text/event-stream; decoding anyway");
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LumenAiError::from))
            .boxed())
    }
}

#[derive(Debug, Deserialize)]
struct MemoryRecentResponse {
    #[serde(default)]
    entries: Vec<MemoryEntry>,
}

#[derive(Debug, Serialize)]
struct MemoryDeleteBody<'a> {
    timestamp: &'a MessageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MemoryClearBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    persona_id: Option<&'a str>,
}

#[async_trait]
impl MemoryStore for BackendClient {
    async fn recent(&self, persona_id: Option<&str>) -> Result<Vec<MemoryEntry>, LumenAiError> {
        let mut request = self.get("memory/recent");
        if let Some(persona_id) = persona_id {
            request = request.query(&[("persona_id", persona_id)]);
        }
        let response = ensure_success(request.send().await?).await?;
        let raw = response.text().await?;
        let parsed: MemoryRecentResponse = serde_json::from_str(&raw)?;
        Ok(parsed.entries)
    }

    async fn delete(
        &self,
        persona_id: Option<&str>,
        timestamp: &MessageId,
    ) -> Result<(), LumenAiError> {
        let body = MemoryDeleteBody {
            timestamp,
            persona_id,
        };
        let response = self.post("memory/delete").json(&body).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn clear(&self, persona_id: Option<&str>) -> Result<(), LumenAiError> {
        let response = self
            .post("memory/clear")
            .json(&MemoryClearBody { persona_id })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PersonaDirectory for BackendClient {
    async fn list(&self, public_only: bool) -> Result<PersonaListing, LumenAiError> {
        let public = if public_only { "true" } else { "false" };
        let response = self
            .get("personas")
            .query(&[("public", public)])
            .send()
            .await?;
        let raw = ensure_success(response).await?.text().await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LumenAiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    Err(LumenAiError::HttpStatus {
        status: status.as_u16(),
        message: status_failure_message(status.as_u16(), &raw),
    })
}

/// Prefers the server's own `error` text and falls back to the status code.
fn status_failure_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.get("error") {
            Some(Value::String(detail)) if !detail.trim().is_empty() => {
                Some(detail.trim().to_string())
            }
            _ => None,
        })
        .unwrap_or_else(|| format!("Request failed (status {status})"))
}

#[cfg(test)]
mod tests {
    use super::{status_failure_message, BackendClient, BackendConfig};
    use crate::LumenAiError;

    fn config(api_base: &str) -> BackendConfig {
        BackendConfig {
            api_base: api_base.to_string(),
            connect_timeout_ms: 1_000,
        }
    }

    #[test]
    fn unit_status_message_prefers_server_error_field() {
        assert_eq!(
            status_failure_message(400, r#"{"error":"timestamp required"}"#),
            "timestamp required"
        );
        assert_eq!(
            status_failure_message(502, "<html>bad gateway</html>"),
            "Request failed (status 502)"
        );
        assert_eq!(
            status_failure_message(500, r#"{"error":{"code":1}}"#),
            "Request failed (status 500)"
        );
    }

    #[test]
    fn unit_endpoint_joins_base_without_duplicate_slashes() {
        let client = BackendClient::new(config("http://127.0.0.1:5000/")).expect("client");
        assert_eq!(client.endpoint("/chat/stream"), "http://127.0.0.1:5000/chat/stream");
        assert_eq!(client.endpoint("personas"), "http://127.0.0.1:5000/personas");
    }

    #[test]
    fn regression_rejects_empty_or_schemeless_server_url() {
        assert!(matches!(
            BackendClient::new(config("  ")),
            Err(LumenAiError::InvalidConfig(_))
        ));
        assert!(matches!(
            BackendClient::new(config("localhost:5000")),
            Err(LumenAiError::InvalidConfig(_))
        ));
    }
}
