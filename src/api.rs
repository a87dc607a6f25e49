//! REST API for the chat assistant
//!
//! `/chat` looks up (or creates) the conversation session and forwards
//! the message. Failures inside the session surface as the apology text
//! in a normal success envelope; only request errors and failures before
//! the session is reached produce error statuses.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::models::{ConversationTurn, HistoryEntry};
use crate::session::SessionStore;

pub const DEFAULT_CHAT_ID: &str = "default";
pub const MISSING_MESSAGE_ERROR: &str = "Messaggio non fornito";

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub chat_id: Option<String>,
    pub history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub chat_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub chat_id: String,
    pub turns: Vec<ConversationTurn>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    fn reply(code: StatusCode, message: impl Into<String>) -> Response {
        (
            code,
            Json(Self {
                error: message.into(),
                status: "error".to_string(),
            }),
        )
            .into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<SessionStore>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected chat request body: {}", rejection);
            return ErrorResponse::reply(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let Some(message) = req.message.filter(|m| !m.is_empty()) else {
        return ErrorResponse::reply(StatusCode::BAD_REQUEST, MISSING_MESSAGE_ERROR);
    };

    let chat_id = req
        .chat_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_ID.to_string());

    info!(
        chat_id = %chat_id,
        history = req.history.as_ref().map_or(0, Vec::len),
        "Received chat message"
    );

    let session = match state.store.get_or_create(&chat_id).await {
        Ok(session) => session,
        Err(e) => {
            error!(chat_id = %chat_id, "Failed to open session: {}", e);
            return ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let response = session
        .process_input(&message, req.history.as_deref())
        .await;

    (
        StatusCode::OK,
        Json(ChatResponse {
            response,
            chat_id,
            status: "success".to_string(),
        }),
    )
        .into_response()
}

/// =============================
/// History Endpoint
/// =============================

async fn history_handler(State(state): State<ApiState>, Path(chat_id): Path<String>) -> Response {
    let Some(session) = state.store.get(&chat_id).await else {
        return ErrorResponse::reply(
            StatusCode::NOT_FOUND,
            format!("Conversazione non trovata: {}", chat_id),
        );
    };

    (
        StatusCode::OK,
        Json(HistoryResponse {
            turns: session.turns().await,
            chat_id,
            status: "success".to_string(),
        }),
    )
        .into_response()
}

/// =============================
/// Router
/// =============================

pub fn create_router(store: Arc<SessionStore>) -> Router {
    let state = ApiState { store };

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/chat/:chat_id/history", get(history_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    store: Arc<SessionStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(store);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::financial_analyst;
    use crate::session::testing::{Script, ScriptedRuntime};
    use crate::session::{ContextSource, ERROR_RESPONSE};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn app(runtime: Arc<ScriptedRuntime>) -> (Router, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new(
            runtime,
            financial_analyst("test-model"),
            ContextSource::ClientHistory,
        ));
        (create_router(store.clone()), store)
    }

    async fn post_chat(router: Router, body: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_chat_creates_session_and_answers() {
        let runtime = Arc::new(ScriptedRuntime::replying("Ciao!"));
        let (router, store) = app(runtime.clone());

        let (status, body) = post_chat(router, r#"{"message": "hello", "chat_id": "t1"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "response": "Ciao!", "chat_id": "t1", "status": "success" })
        );
        assert_eq!(runtime.sessions_created.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.prompts(), vec!["hello".to_string()]);
        assert_eq!(store.get("t1").await.unwrap().turn_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_message_is_bad_request() {
        let (router, _) = app(Arc::new(ScriptedRuntime::replying("x")));

        let (status, body) = post_chat(router, r#"{"chat_id": "t1"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], MISSING_MESSAGE_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (router, _) = app(Arc::new(ScriptedRuntime::replying("x")));

        let (status, body) = post_chat(router, "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_default_chat_id() {
        let (router, store) = app(Arc::new(ScriptedRuntime::replying("ok")));

        let (status, body) = post_chat(router, r#"{"message": "hi"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chat_id"], DEFAULT_CHAT_ID);
        assert!(store.get(DEFAULT_CHAT_ID).await.is_some());
    }

    #[tokio::test]
    async fn test_runner_failure_still_returns_ok() {
        let (router, store) = app(Arc::new(ScriptedRuntime::new(Script::Fail)));

        let (status, body) = post_chat(router, r#"{"message": "hello", "chat_id": "t1"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], ERROR_RESPONSE);
        assert_eq!(body["status"], "success");
        assert_eq!(store.get("t1").await.unwrap().turn_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_init_failure_is_server_error() {
        let (router, _) = app(Arc::new(ScriptedRuntime::replying("x").failing_sessions()));

        let (status, body) = post_chat(router, r#"{"message": "hello"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_history_passed_through() {
        let runtime = Arc::new(ScriptedRuntime::replying("ok"));
        let (router, _) = app(runtime.clone());

        let body = json!({
            "message": "e MSFT?",
            "chat_id": "t2",
            "history": [
                { "role": "user", "content": "prezzo AAPL" },
                { "role": "assistant", "content": "190 USD" },
                { "role": "user", "content": "e MSFT?" }
            ]
        });
        let (status, _) = post_chat(router, &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        let prompts = runtime.prompts();
        let prompt = &prompts[0];
        assert!(prompt.contains("Utente: prezzo AAPL"));
        assert!(prompt.contains("Assistente: 190 USD"));
        assert!(prompt.ends_with("Messaggio attuale: e MSFT?"));
    }

    #[tokio::test]
    async fn test_history_endpoint() {
        let (router, store) = app(Arc::new(ScriptedRuntime::replying("ok")));
        let session = store.get_or_create("t3").await.unwrap();
        session.process_input("ciao", None).await;

        let response = router
            .clone()
            .oneshot(Request::get("/chat/t3/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: HistoryResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.turns.len(), 1);
        assert_eq!(body.turns[0].user_message, "ciao");

        let missing = router
            .oneshot(Request::get("/chat/nope/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
