use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, redirect};
use serde_json::Value;
use thiserror::Error;

use super::types::CheckResult;
use crate::database::models::Monitor;

/// Probe problems that are not evidence about the target: bad stored
/// configuration or an HTTP client that could not be built.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("invalid headers payload: {0}")]
    InvalidHeaders(String),

    #[error("invalid body payload: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("cannot build request: {0}")]
    InvalidRequest(#[source] reqwest::Error),

    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Checker trait for probing a monitor
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe once. `Ok` carries a classified outcome (up or down), `Err`
    /// an unclassified problem that must not be persisted.
    async fn check(&self, monitor: &Monitor) -> Result<CheckResult, ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    timeout: Duration,
    user_agent: String,
    /// One client per redirect limit, the policy is fixed at build time
    clients: RwLock<HashMap<u32, reqwest::Client>>,
}

impl HttpChecker {
    pub fn new(timeout_seconds: u64, user_agent: impl Into<String>) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds.max(1)),
            user_agent: user_agent.into(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, max_redirects: u32) -> Result<reqwest::Client, ProbeError> {
        if let Some(client) = self.clients.read().ok().and_then(|clients| clients.get(&max_redirects).cloned()) {
            return Ok(client);
        }

        // 0 returns the 3xx as-is so the acceptance range decides
        let policy = if max_redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(max_redirects as usize)
        };

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .redirect(policy)
            .build()
            .map_err(ProbeError::Client)?;

        if let Ok(mut clients) = self.clients.write() {
            clients.insert(max_redirects, client.clone());
        }

        Ok(client)
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, monitor: &Monitor) -> Result<CheckResult, ProbeError> {
        let method = parse_method(&monitor.method)?;
        let headers = parse_headers(monitor.headers.as_deref())?;
        let body = parse_body(monitor.body.as_deref())?;
        let client = self.client_for(monitor.max_redirects)?;

        let mut request = client.request(method, &monitor.url).headers(headers);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_builder() => return Err(ProbeError::InvalidRequest(e)),
            Err(e) => {
                let status_code = e.status().map(|status| status.as_u16());
                return Ok(CheckResult::new(monitor.id, elapsed_ms(start)).failure(status_code, e.to_string()));
            }
        };

        let status_code = response.status().as_u16();
        let body_read = response.bytes().await;
        let result = CheckResult::new(monitor.id, elapsed_ms(start));

        if let Err(e) = body_read {
            return Ok(result.failure(Some(status_code), format!("failed to read response body: {e}")));
        }

        if monitor.accepts(status_code) {
            Ok(result.success(status_code))
        } else {
            Ok(result.failure(
                Some(status_code),
                format!(
                    "status code {} outside accepted range {}..={}",
                    status_code, monitor.min_acceptable_status_code, monitor.max_acceptable_status_code
                ),
            ))
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn is_blank(raw: Option<&str>) -> bool {
    raw.is_none_or(|text| text.trim().is_empty())
}

pub fn parse_method(raw: &str) -> Result<Method, ProbeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(trimmed.to_ascii_uppercase().as_bytes())
        .map_err(|_| ProbeError::InvalidMethod(raw.to_string()))
}

/// Stored headers are a JSON object. Strings are taken verbatim, numbers and
/// booleans stringified, nulls dropped.
pub fn parse_headers(raw: Option<&str>) -> Result<HeaderMap, ProbeError> {
    let mut headers = HeaderMap::new();
    if is_blank(raw) {
        return Ok(headers);
    }

    let value: Value = serde_json::from_str(raw.unwrap_or_default())
        .map_err(|e| ProbeError::InvalidHeaders(e.to_string()))?;
    let Value::Object(entries) = value else {
        return Err(ProbeError::InvalidHeaders("expected a JSON object".to_string()));
    };

    for (name, value) in entries {
        let text = match value {
            Value::Null => continue,
            Value::String(text) => text,
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ProbeError::InvalidHeaders(format!("header {name:?} must be a scalar")));
            }
        };

        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ProbeError::InvalidHeaders(format!("invalid header name {name:?}")))?;
        let header_value = HeaderValue::from_str(&text)
            .map_err(|_| ProbeError::InvalidHeaders(format!("invalid value for header {name:?}")))?;
        headers.append(header_name, header_value);
    }

    Ok(headers)
}

pub fn parse_body(raw: Option<&str>) -> Result<Option<Value>, ProbeError> {
    if is_blank(raw) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(raw.unwrap_or_default())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewMonitor;
    use crate::monitoring::types::MonitorStatus;
    use chrono::Utc;
    use mockito::{Matcher, Server};

    fn monitor(url: String) -> Monitor {
        NewMonitor::new("test", url).into_monitor(1, Utc::now())
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method(" POST ").unwrap(), Method::POST);
        assert_eq!(parse_method("").unwrap(), Method::GET);
        assert!(matches!(parse_method("GE T"), Err(ProbeError::InvalidMethod(_))));
    }

    #[test]
    fn test_parse_headers() {
        assert!(parse_headers(None).unwrap().is_empty());
        assert!(parse_headers(Some("  ")).unwrap().is_empty());

        let headers = parse_headers(Some(r#"{"X-Token":"abc","X-Retry":3,"X-Debug":true,"X-Skip":null}"#)).unwrap();
        assert_eq!(headers.get("x-token").unwrap(), "abc");
        assert_eq!(headers.get("x-retry").unwrap(), "3");
        assert_eq!(headers.get("x-debug").unwrap(), "true");
        assert!(headers.get("x-skip").is_none());

        assert!(matches!(parse_headers(Some("{not json")), Err(ProbeError::InvalidHeaders(_))));
        assert!(matches!(parse_headers(Some(r#"["a"]"#)), Err(ProbeError::InvalidHeaders(_))));
        assert!(matches!(parse_headers(Some(r#"{"bad name":"x"}"#)), Err(ProbeError::InvalidHeaders(_))));
        assert!(matches!(parse_headers(Some(r#"{"X-Nested":{"a":1}}"#)), Err(ProbeError::InvalidHeaders(_))));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(None).unwrap(), None);
        assert_eq!(parse_body(Some("")).unwrap(), None);
        assert_eq!(parse_body(Some(r#"{"a":1}"#)).unwrap(), Some(serde_json::json!({"a": 1})));
        assert!(matches!(parse_body(Some("{")), Err(ProbeError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_accepted_status_is_up() {
        let mut server = Server::new_async().await;
        let mock = server.mock("GET", "/health").with_status(200).create_async().await;

        let checker = HttpChecker::new(5, "heartbeat-test");
        let result = checker.check(&monitor(format!("{}/health", server.url()))).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.status, MonitorStatus::Up);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_status_outside_range_is_classified_failure() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;

        let checker = HttpChecker::new(5, "heartbeat-test");
        let result = checker.check(&monitor(format!("{}/missing", server.url()))).await.unwrap();

        assert_eq!(result.status, MonitorStatus::Down);
        assert_eq!(result.status_code, Some(404));
        assert!(result.error_message.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_method_headers_and_body_are_sent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/submit")
            .match_header("x-token", "abc")
            .match_body(Matcher::Json(serde_json::json!({"ping": true})))
            .with_status(201)
            .create_async()
            .await;

        let mut target = monitor(format!("{}/submit", server.url()));
        target.method = "post".to_string();
        target.headers = Some(r#"{"x-token":"abc"}"#.to_string());
        target.body = Some(r#"{"ping":true}"#.to_string());

        let result = HttpChecker::new(5, "heartbeat-test").check(&target).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.status_code, Some(201));
        assert!(result.is_up());
    }

    #[tokio::test]
    async fn test_redirect_not_followed_when_limit_is_zero() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let followed = server.mock("GET", "/new").with_status(200).expect(0).create_async().await;

        let mut target = monitor(format!("{}/old", server.url()));
        target.max_redirects = 0;
        target.max_acceptable_status_code = 399;

        let result = HttpChecker::new(5, "heartbeat-test").check(&target).await.unwrap();

        followed.assert_async().await;
        assert_eq!(result.status_code, Some(301));
        assert!(result.is_up());
    }

    #[tokio::test]
    async fn test_too_many_redirects_is_classified_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/loop")
            .with_status(302)
            .with_header("location", "/loop")
            .expect_at_least(1)
            .create_async()
            .await;

        let mut target = monitor(format!("{}/loop", server.url()));
        target.max_redirects = 2;

        let result = HttpChecker::new(5, "heartbeat-test").check(&target).await.unwrap();

        assert_eq!(result.status, MonitorStatus::Down);
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = HttpChecker::new(5, "heartbeat-test")
            .check(&monitor(format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap();

        assert_eq!(result.status, MonitorStatus::Down);
        assert_eq!(result.status_code, None);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_unclassified() {
        let mut target = monitor("http://127.0.0.1:9/".to_string());
        target.headers = Some("{broken".to_string());

        let result = HttpChecker::new(5, "heartbeat-test").check(&target).await;
        assert!(matches!(result, Err(ProbeError::InvalidHeaders(_))));
    }

    #[tokio::test]
    async fn test_unusable_url_is_unclassified() {
        let result = HttpChecker::new(5, "heartbeat-test").check(&monitor("not a url".to_string())).await;
        assert!(matches!(result, Err(ProbeError::InvalidRequest(_))));
    }
}
