use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::request::{HttpMethod, TransportRequest, TransportResponse};
use crate::sse::{frame_stream, SseFrame};

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub default_headers: HashMap<String, String>,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            user_agent: "concave-transport/0.1".to_string(),
            default_headers: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

/// HTTP + SSE client over a resource API. Header mutation is a session-wide
/// operation so a single instance can be shared and have its auth token
/// refreshed in place by the Auth Client.
pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
    headers: Arc<RwLock<HashMap<String, String>>>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("reqwest client configuration is always valid here");

        let headers = Arc::new(RwLock::new(config.default_headers.clone()));
        Self { client, config, headers }
    }

    /// Session-wide header mutation, used by the Auth Client to inject a
    /// bearer token into every subsequent request.
    pub async fn set_header(&self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.write().await.insert(key.into(), value.into());
    }

    pub async fn remove_header(&self, key: &str) {
        self.headers.write().await.remove(key);
    }

    fn build_url(&self, path: &str, params: &[(String, String)]) -> String {
        let mut url = format!("{}{}", self.config.base_url, path);
        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        req: TransportRequest,
    ) -> Result<TransportResponse<T>, TransportError> {
        let url = self.build_url(&req.path, &req.params);
        let mut builder = self.client.request(req.method.as_reqwest(), &url);

        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }

        for (key, value) in self.headers.read().await.iter() {
            builder = builder.header(key, value);
        }
        for (key, value) in req.headers.iter() {
            builder = builder.header(key, value);
        }

        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers().iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;

        if !(200..300).contains(&status) {
            let error_body: Option<ErrorBody> = serde_json::from_slice(&bytes).ok();
            return Err(TransportError::Http {
                status,
                code: error_body.as_ref().and_then(|b| b.code.clone()),
                message: error_body
                    .as_ref()
                    .and_then(|b| b.message.clone())
                    .unwrap_or_else(|| format!("request failed with status {status}")),
                details: error_body.and_then(|b| b.details),
            });
        }

        let data: T = if bytes.is_empty() {
            serde_json::from_value(serde_json::Value::Null)
                .map_err(|e| TransportError::Serialization(e.to_string()))?
        } else {
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Serialization(e.to_string()))?
        };

        Ok(TransportResponse { data, status, headers })
    }

    /// Opens the resource's subscription stream. Malformed frames are
    /// surfaced as `Err` items so the caller can log and continue instead of
    /// the stream terminating.
    pub async fn open_event_stream(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<impl Stream<Item = Result<SseFrame, TransportError>>, TransportError> {
        let url = self.build_url(path, &params);
        let mut builder = self.client.get(&url).header("Accept", "text/event-stream");

        for (key, value) in self.headers.read().await.iter() {
            builder = builder.header(key, value);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(TransportError::Http {
                status,
                code: None,
                message: format!("subscribe failed with status {status}"),
                details: None,
            });
        }

        Ok(frame_stream(response.bytes_stream()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b',' | b':' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Convenience constructors for the common resource-API request shapes
/// list, get, count, aggregate, search, and the write verbs.
impl TransportRequest {
    pub fn list(resource: &str) -> Self {
        Self::new(HttpMethod::Get, resource.to_string())
    }

    pub fn get(resource: &str, id: &str) -> Self {
        Self::new(HttpMethod::Get, format!("{resource}/{id}"))
    }

    pub fn count(resource: &str) -> Self {
        Self::new(HttpMethod::Get, format!("{resource}/count"))
    }

    pub fn aggregate(resource: &str) -> Self {
        Self::new(HttpMethod::Get, format!("{resource}/aggregate"))
    }

    pub fn search(resource: &str) -> Self {
        Self::new(HttpMethod::Get, format!("{resource}/search"))
    }

    pub fn create(resource: &str, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, resource.to_string()).json_body(body)
    }

    pub fn patch(resource: &str, id: &str, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Patch, format!("{resource}/{id}")).json_body(body)
    }

    pub fn delete(resource: &str, id: &str) -> Self {
        Self::new(HttpMethod::Delete, format!("{resource}/{id}"))
    }

    pub fn rpc(resource: &str, name: &str, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, format!("{resource}/rpc/{name}")).json_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn successful_request_deserializes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::new(server.uri()));
        let response: TransportResponse<serde_json::Value> =
            transport.request(TransportRequest::get("/todos", "1")).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.data["id"], "1");
    }

    #[tokio::test]
    async fn error_response_carries_code_and_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/todos"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": "CONFLICT",
                "message": "version mismatch",
                "details": {"current": {"title": "server value"}}
            })))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::new(server.uri()));
        let result: Result<TransportResponse<serde_json::Value>, _> =
            transport.request(TransportRequest::create("/todos", serde_json::json!({}))).await;

        let err = result.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn set_header_is_applied_to_subsequent_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::new(server.uri()));
        transport.set_header("Authorization", "Bearer token123").await;

        let response: TransportResponse<serde_json::Value> =
            transport.request(TransportRequest::new(HttpMethod::Get, "/me")).await.unwrap();
        assert_eq!(response.data["ok"], true);
    }
}
