//! HTTP implementation of [`Assistant`] for the threads/messages/runs API shape.
//!
//! Contexts map to threads, jobs map to runs.  Every request carries the bearer
//! credential; runs are created against the configured assistant id.

use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::assistant::{Assistant, AssistantMessage, ContextId, JobId, JobStatus, Role};
use crate::error::{Error, Result};
use crate::observability::{HTTP_REQUEST_DURATION, HTTP_REQUEST_ERRORS, HTTP_REQUESTS};

/// Base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const BETA_HEADER: &str = "assistants=v2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for a hosted assistant reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAssistant {
    api_key: String,
    assistant_id: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl HttpAssistant {
    /// Creates a client for the default endpoint.
    pub fn new(api_key: impl Into<String>, assistant_id: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, assistant_id, None, None)
    }

    /// Creates a client with a custom base URL and request timeout.
    pub fn with_options(
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
        base_url: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            Error::validation(
                "API key contains characters not allowed in a header",
                Some("api_key".to_string()),
            )
        })?;

        let base_url = parse_base_url(base_url.unwrap_or(DEFAULT_API_URL))?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            assistant_id: assistant_id.into(),
            client,
            base_url,
            timeout,
        })
    }

    /// The assistant runs are created against.
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        // Validated in the constructor.
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(header::AUTHORIZATION, value);
        }
        headers.insert("OpenAI-Beta", HeaderValue::from_static(BETA_HEADER));
        headers
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        HTTP_REQUESTS.click();
        let start = Instant::now();
        let result = self.execute_inner(request).await;
        HTTP_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            HTTP_REQUEST_ERRORS.click();
        }
        result
    }

    async fn execute_inner<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .headers(self.default_headers())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::connection(
                        format!("Request timed out after {:?}: {}", self.timeout, e),
                        Some(Box::new(e)),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_message = detail
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message, None, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message, request_id),
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    // Url::join drops the last segment unless the base ends with a slash.
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    assistant_id: &'a str,
}

#[derive(Deserialize)]
struct RunObject {
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    value: String,
}

/// Maps a run status string onto the three states the core distinguishes.
pub fn parse_run_status(status: &str) -> JobStatus {
    match status {
        "completed" => JobStatus::Completed,
        "failed" | "cancelled" | "expired" | "incomplete" => JobStatus::Failed,
        _ => JobStatus::Running,
    }
}

impl MessageObject {
    fn into_message(self) -> Option<AssistantMessage> {
        let role = self.role.parse::<Role>().ok()?;
        let content = self
            .content
            .into_iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");
        Some(AssistantMessage::new(role, content))
    }
}

#[async_trait::async_trait]
impl Assistant for HttpAssistant {
    async fn create_context(&self) -> Result<ContextId> {
        let url = self.endpoint("threads")?;
        let thread: IdObject = self
            .execute(self.client.post(url).json(&serde_json::json!({})))
            .await?;
        Ok(ContextId::new(thread.id))
    }

    async fn post_message(&self, context: &ContextId, role: Role, content: &str) -> Result<()> {
        let url = self.endpoint(&format!("threads/{context}/messages"))?;
        let _: IdObject = self
            .execute(self.client.post(url).json(&CreateMessage { role, content }))
            .await?;
        Ok(())
    }

    async fn start_job(&self, context: &ContextId) -> Result<JobId> {
        let url = self.endpoint(&format!("threads/{context}/runs"))?;
        let run: IdObject = self
            .execute(self.client.post(url).json(&CreateRun {
                assistant_id: &self.assistant_id,
            }))
            .await?;
        Ok(JobId::new(run.id))
    }

    async fn job_status(&self, context: &ContextId, job: &JobId) -> Result<JobStatus> {
        let url = self.endpoint(&format!("threads/{context}/runs/{job}"))?;
        let run: RunObject = self.execute(self.client.get(url)).await?;
        debug!(job = %job, status = %run.status, "run status");
        Ok(parse_run_status(&run.status))
    }

    async fn list_messages(&self, context: &ContextId) -> Result<Vec<AssistantMessage>> {
        let mut url = self.endpoint(&format!("threads/{context}/messages"))?;
        url.query_pairs_mut().append_pair("order", "desc");
        let list: MessageList = self.execute(self.client.get(url)).await?;
        Ok(list
            .data
            .into_iter()
            .filter_map(MessageObject::into_message)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpAssistant::new("test-key", "asst_123").unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.assistant_id(), "asst_123");
        assert_eq!(client.base_url().as_str(), DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = HttpAssistant::with_options(
            "test-key",
            "asst_123",
            Some("https://proxy.example.com/v1"),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url().as_str(), "https://proxy.example.com/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn endpoints_nest_under_the_base_path() {
        let client = HttpAssistant::with_options(
            "k",
            "a",
            Some("https://proxy.example.com/v1"),
            None,
        )
        .unwrap();
        let url = client.endpoint("threads/t1/runs/r1").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.com/v1/threads/t1/runs/r1");
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(HttpAssistant::new("bad\nkey", "a").unwrap_err().is_validation());
        assert!(matches!(
            HttpAssistant::with_options("k", "a", Some("not a url"), None),
            Err(Error::Url { .. })
        ));
    }

    #[test]
    fn run_statuses() {
        assert_eq!(parse_run_status("queued"), JobStatus::Running);
        assert_eq!(parse_run_status("in_progress"), JobStatus::Running);
        assert_eq!(parse_run_status("requires_action"), JobStatus::Running);
        assert_eq!(parse_run_status("completed"), JobStatus::Completed);
        assert_eq!(parse_run_status("failed"), JobStatus::Failed);
        assert_eq!(parse_run_status("expired"), JobStatus::Failed);
        assert_eq!(parse_run_status("cancelled"), JobStatus::Failed);
    }

    #[test]
    fn message_listing_keeps_text_parts_and_known_roles() {
        let body = r#"{
            "object": "list",
            "data": [
                {"id": "m2", "role": "assistant", "content": [
                    {"type": "text", "text": {"value": "Hola 【1:x†y】mundo", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "f"}}
                ]},
                {"id": "m1", "role": "user", "content": [
                    {"type": "text", "text": {"value": "saluda", "annotations": []}}
                ]},
                {"id": "m0", "role": "system", "content": []}
            ]
        }"#;
        let list: MessageList = serde_json::from_str(body).unwrap();
        let messages: Vec<_> = list
            .data
            .into_iter()
            .filter_map(MessageObject::into_message)
            .collect();
        assert_eq!(
            messages,
            vec![
                AssistantMessage::new(Role::Assistant, "Hola 【1:x†y】mundo"),
                AssistantMessage::new(Role::User, "saluda"),
            ]
        );
    }
}
