//! Hosted structured-output LLM client.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorKind, Stage};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

pub struct GenerateObjectRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct GenerateObjectResponse<T> {
    pub data: T,
    pub tokens_used: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Client for a hosted chat-completions-style structured-output LLM.
pub struct LlmClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(900))
            .build()
            .expect("failed to build LLM HTTP client");

        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Call the LLM once and parse its raw text content as `T`. Retries
    /// on `TRANSIENT` per the shared backoff schedule; `VALIDATION` and
    /// `AUTH` are surfaced immediately without retry.
    pub async fn generate_object<T: DeserializeOwned>(
        &self,
        request: GenerateObjectRequest,
    ) -> Result<GenerateObjectResponse<T>, AppError> {
        let (value, tokens_used) = self.generate_value(request).await?;
        let data = serde_json::from_value(value).map_err(|e| {
            AppError::validation(Stage::Llm, format!("LLM response did not match the expected schema: {e}"))
        })?;
        Ok(GenerateObjectResponse { data, tokens_used })
    }

    /// Same as [`generate_object`](Self::generate_object) but stops at a
    /// generic [`serde_json::Value`], letting the caller post-process the
    /// payload (e.g. normalizing stray enum values) before committing to
    /// a concrete schema type.
    pub async fn generate_value(
        &self,
        request: GenerateObjectRequest,
    ) -> Result<(serde_json::Value, u64), AppError> {
        let (raw_content, tokens_used) = self
            .retry
            .run(|| self.call_once(&request.messages, request.temperature, request.max_tokens))
            .await?;

        let value = parse_structured_output(&raw_content)?;
        Ok((value, tokens_used))
    }

    async fn call_once(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(String, u64), AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .json::<ErrorBody>()
                .await
                .unwrap_or(ErrorBody {
                    message: format!("LLM provider returned HTTP {status}"),
                });
            return Err(classify_status_error(status, body.message));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AppError::validation(Stage::Llm, format!("malformed chat response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::validation(Stage::Llm, "LLM response had no choices"))?
            .message
            .content;

        Ok((content, parsed.usage.total_tokens))
    }
}

fn classify_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::new(ErrorKind::Timeout, Stage::Llm, e.to_string())
    } else {
        AppError::new(ErrorKind::Transient, Stage::Llm, e.to_string())
    }
}

fn classify_status_error(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::new(ErrorKind::Auth, Stage::Llm, message)
        }
        StatusCode::TOO_MANY_REQUESTS => AppError::new(ErrorKind::Quota, Stage::Llm, message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::validation(Stage::Llm, message)
        }
        s if s.is_server_error() => AppError::new(ErrorKind::Transient, Stage::Llm, message),
        _ => AppError::new(ErrorKind::Unknown, Stage::Llm, message),
    }
}

/// Parse the model's raw text content as a single JSON object matching
/// `T`. A protocol violation (not JSON, not an object, schema mismatch)
/// fails with `VALIDATION`, surfacing a truncated sample for debugging
/// rather than the full — possibly huge — response.
fn parse_structured_output<T: DeserializeOwned>(raw_content: &str) -> Result<T, AppError> {
    let trimmed = strip_code_fences(raw_content.trim());
    serde_json::from_str(trimmed).map_err(|e| {
        let sample = crate::errors::truncate_bytes(trimmed, 500);
        AppError::validation(
            Stage::Llm,
            format!("LLM response did not match the expected schema ({e}); sample: {sample}"),
        )
    })
}

fn strip_code_fences(s: &str) -> &str {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}
