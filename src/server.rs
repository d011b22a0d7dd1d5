//! JSON HTTP API over a [`ChatSession`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/messages` | Current conversation |
//! | `POST` | `/messages` | Send `{ "text", "use_knowledge" }`; returns the conversation |
//! | `POST` | `/voice` | Answer `{ "transcript" }`; returns the conversation |
//! | `POST` | `/search` | Knowledge-base matches for `{ "query" }` |
//! | `POST` | `/tts/clear` | Clear the pending playback response |
//!
//! Gateway failures are not HTTP errors: they show up as `error` messages in
//! the returned conversation. Request validation errors use
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::conversation::{ConversationState, Message};
use crate::matcher::Record;
use crate::session::ChatSession;

#[derive(Clone)]
struct AppState {
    session: Arc<ChatSession>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let session = Arc::new(ChatSession::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "chat server listening");
    println!("Chat server listening on http://{}", config.server.bind);
    axum::serve(listener, router(session)).await?;
    Ok(())
}

/// Builds the API router for `session`.
pub fn router(session: Arc<ChatSession>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/messages", get(handle_messages).post(handle_send))
        .route("/voice", post(handle_voice))
        .route("/search", post(handle_search))
        .route("/tts/clear", post(handle_clear_tts))
        .layer(cors)
        .with_state(AppState { session })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn knowledge_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "knowledge_unavailable".to_string(),
        message: message.into(),
    }
}

// ============ Views ============

#[derive(Serialize)]
struct ConversationView {
    messages: Vec<Message>,
    is_loading: bool,
    last_response: Option<String>,
}

impl From<ConversationState> for ConversationView {
    fn from(state: ConversationState) -> Self {
        Self {
            is_loading: state.is_loading(),
            last_response: state.last_response().map(str::to_string),
            messages: state.messages().to_vec(),
        }
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_messages(State(state): State<AppState>) -> Json<ConversationView> {
    Json(state.session.conversation().into())
}

#[derive(Deserialize)]
struct SendRequest {
    text: String,
    #[serde(default = "default_use_knowledge")]
    use_knowledge: bool,
}

fn default_use_knowledge() -> bool {
    true
}

async fn handle_send(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<ConversationView>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    if req.use_knowledge {
        state.session.send_message_to_json(&req.text).await;
    } else {
        state.session.send_message(&req.text).await;
    }
    Ok(Json(state.session.conversation().into()))
}

#[derive(Deserialize)]
struct VoiceRequest {
    transcript: String,
}

async fn handle_voice(
    State(state): State<AppState>,
    Json(req): Json<VoiceRequest>,
) -> Result<Json<ConversationView>, AppError> {
    if req.transcript.trim().is_empty() {
        return Err(bad_request("transcript must not be empty"));
    }
    state.session.process_voice_input(&req.transcript).await;
    Ok(Json(state.session.conversation().into()))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    matches: Vec<Record>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let matches = state
        .session
        .search(&req.query)
        .await
        .map_err(|e| knowledge_unavailable(e.to_string()))?;
    Ok(Json(SearchResponse {
        matches: matches.into_records(),
    }))
}

async fn handle_clear_tts(State(state): State<AppState>) -> Json<ConversationView> {
    state.session.clear_last_response();
    Json(state.session.conversation().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, ResponseGateway};
    use crate::knowledge::KnowledgeStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoGateway;

    #[async_trait]
    impl ResponseGateway for EchoGateway {
        async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
            Ok(format!("echo: {}", prompt.lines().next().unwrap_or_default()))
        }
    }

    async fn spawn(dir: &std::path::Path) -> String {
        let session = Arc::new(ChatSession::new(
            Arc::new(EchoGateway),
            KnowledgeStore::new(dir),
            "data.json",
        ));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(session)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_send_and_list_messages() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("data.json"),
            r#"{"facts":[{"q":"capital of France","a":"Paris"}]}"#,
        )
        .unwrap();
        let base = spawn(tmp.path()).await;
        let client = reqwest::Client::new();

        let resp: Value = client
            .post(format!("{}/messages", base))
            .json(&json!({"text": "France"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp["messages"][1]["content"], "echo: User asked: France");
        assert_eq!(resp["messages"][1]["origin"], "assistant");
        assert_eq!(resp["is_loading"], false);

        let resp: Value = client
            .post(format!("{}/messages", base))
            .json(&json!({"text": "raw", "use_knowledge": false}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp["messages"][3]["content"], "echo: raw");

        let listed: Value = client
            .get(format!("{}/messages", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["messages"].as_array().unwrap().len(), 4);
        assert_eq!(listed["last_response"], "echo: raw");

        let cleared: Value = client
            .post(format!("{}/tts/clear", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(cleared["last_response"].is_null());
    }

    #[tokio::test]
    async fn test_search_and_validation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = spawn(tmp.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/messages", base))
            .json(&json!({"text": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");

        // no asset yet
        let resp = client
            .post(format!("{}/search", base))
            .json(&json!({"query": "france"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        std::fs::write(
            tmp.path().join("data.json"),
            r#"{"facts":[{"q":"capital of France","a":"Paris"}]}"#,
        )
        .unwrap();
        let body: Value = client
            .post(format!("{}/search", base))
            .json(&json!({"query": "france"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["matches"][0]["a"], "Paris");
    }

    #[tokio::test]
    async fn test_voice_transcript() {
        let tmp = tempfile::TempDir::new().unwrap();
        let base = spawn(tmp.path()).await;

        let body: Value = reqwest::Client::new()
            .post(format!("{}/voice", base))
            .json(&json!({"transcript": "good morning"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["messages"][0]["kind"], "voice_input");
        assert_eq!(body["messages"][1]["content"], "echo: good morning");
    }
}
