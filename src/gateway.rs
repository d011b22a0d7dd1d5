//! Response gateway: the boundary to the hosted text-generation service.
//!
//! [`ResponseGateway`] is the seam the session talks to. [`GeminiGateway`]
//! implements it against the Gemini `generateContent` REST endpoint.
//!
//! # Call semantics
//!
//! - One request per call. No retry, no backoff, no client-side timeout, no
//!   streaming: the caller gets the completed text or a [`GatewayError`].
//! - An empty completion is replaced by [`EMPTY_RESPONSE_PLACEHOLDER`].
//!
//! # Error classification
//!
//! Structured signals are used first (HTTP status, transport timeout or
//! connect failure). Anything left is classified by [`classify_error_text`],
//! which pattern-matches the raw error text.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GatewayConfig;

/// Returned in place of an empty completion.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "Sorry, I couldn't generate a response.";

/// A classified generation failure. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("The requested AI model was not found")]
    ModelNotFound,
    #[error("Too many requests - please wait")]
    RateLimited,
    #[error("Invalid API key - please check your configuration")]
    InvalidCredentials,
    #[error("API quota exceeded")]
    QuotaExceeded,
    #[error("No internet connection")]
    NoNetwork,
    #[error("Request timed out")]
    TimedOut,
    #[error("Gateway is not configured: {0}")]
    Configuration(String),
    #[error("An error occurred: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// Short machine-readable code, used by the HTTP API.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ModelNotFound => "model_not_found",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::InvalidCredentials => "invalid_credentials",
            GatewayError::QuotaExceeded => "quota_exceeded",
            GatewayError::NoNetwork => "no_network",
            GatewayError::TimedOut => "timed_out",
            GatewayError::Configuration(_) => "not_configured",
            GatewayError::Unknown(_) => "unknown",
        }
    }
}

/// Classifies unstructured error text.
///
/// Checks run in a fixed order, so text mentioning both `404` and `429`
/// classifies as [`GatewayError::ModelNotFound`].
pub fn classify_error_text(text: &str) -> GatewayError {
    if text.contains("404") {
        GatewayError::ModelNotFound
    } else if text.contains("429") {
        GatewayError::RateLimited
    } else if text.contains("401") {
        GatewayError::InvalidCredentials
    } else if text.to_lowercase().contains("quota") {
        GatewayError::QuotaExceeded
    } else if text.trim().is_empty() {
        GatewayError::Unknown("Unknown error".to_string())
    } else {
        GatewayError::Unknown(text.to_string())
    }
}

/// Maps an HTTP error status (and the provider's message) to a [`GatewayError`].
pub fn classify_status(status: StatusCode, message: &str) -> GatewayError {
    match status {
        StatusCode::NOT_FOUND => GatewayError::ModelNotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::InvalidCredentials,
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited,
        _ => classify_error_text(format!("{} {}", status.as_u16(), message).trim()),
    }
}

fn classify_transport(err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::TimedOut
    } else if err.is_connect() {
        GatewayError::NoNetwork
    } else {
        classify_error_text(&err.to_string())
    }
}

/// Boundary to a text-generation service.
#[async_trait]
pub trait ResponseGateway: Send + Sync {
    /// Sends `prompt` and waits for the completed text.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError>;
}

/// Gemini `generateContent` client.
pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiGateway {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    /// Builds a gateway from config, reading the key from the environment.
    ///
    /// A missing key is not an error here; each call then fails with
    /// [`GatewayError::Configuration`].
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "gateway API key not set; generation requests will fail"
            );
        }
        Self::new(&config.base_url, &config.model, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ResponseGateway for GeminiGateway {
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GatewayError::Configuration("API key environment variable is not set".to_string())
        })?;

        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "sending generation request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            let message = parse_error_message(&text);
            let err = classify_status(status, &message);
            tracing::warn!(status = status.as_u16(), code = err.code(), "generation request failed");
            return Err(err);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Unknown(format!("invalid response payload: {}", e)))?;

        let generated = parsed.text();
        if generated.trim().is_empty() {
            return Ok(EMPTY_RESPONSE_PLACEHOLDER.to_string());
        }
        Ok(generated)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Pulls `error.message` out of a provider error body, or returns the raw body.
fn parse_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorEnvelope {
        error: Option<ErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|d| d.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_text() {
        let err = classify_error_text("HTTP 429 Too Many Requests");
        assert_eq!(err, GatewayError::RateLimited);
        assert_eq!(err.to_string(), "Too many requests - please wait");
    }

    #[test]
    fn test_classify_order() {
        assert_eq!(classify_error_text("404 then 429"), GatewayError::ModelNotFound);
        assert_eq!(classify_error_text("got 401"), GatewayError::InvalidCredentials);
        assert_eq!(
            classify_error_text("Resource has been exhausted (check QUOTA)"),
            GatewayError::QuotaExceeded
        );
    }

    #[test]
    fn test_classify_unknown_keeps_raw_text() {
        let err = classify_error_text("socket closed");
        assert_eq!(err.to_string(), "An error occurred: socket closed");
        assert_eq!(
            classify_error_text("").to_string(),
            "An error occurred: Unknown error"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), GatewayError::ModelNotFound);
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, ""),
            GatewayError::InvalidCredentials
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "quota"),
            GatewayError::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "daily quota reached"),
            GatewayError::QuotaExceeded
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "bad field"),
            GatewayError::Unknown("400 bad field".to_string())
        );
    }

    #[test]
    fn test_classify_status_without_message() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            GatewayError::Unknown("500".to_string())
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "  ").to_string(),
            "An error occurred: 502"
        );
    }

    #[test]
    fn test_parse_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(parse_error_message(body), "API key not valid");
        assert_eq!(parse_error_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.text(), "Hello, world");

        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(empty.text(), "");
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let gateway = GeminiGateway::new("http://127.0.0.1:9", "m", None).unwrap();
        let err = gateway.generate("hi").await.unwrap_err();
        assert_eq!(err.code(), "not_configured");
    }
}
