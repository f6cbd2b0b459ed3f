use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{self, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::assistant::openai::OpenAiAssistant;
use crate::assistant::AssistantApi;
use crate::config::Config;
use crate::db::supabase::SupabaseDb;
use crate::db::Database;
use crate::error::{AuthError, CompanionError, ConfigError, WebhookError};
use crate::service::auth;
use crate::service::chat::{self, ChatTurn};
use crate::service::stripe::{apply_webhook_event, verify_webhook_signature};

/// Shared application state: long-lived client handles, read-only after
/// startup and safe for concurrent use.
pub struct AppState {
    pub config: Config,
    pub assistant: Option<Arc<dyn AssistantApi>>,
    pub db: Arc<dyn Database>,
}

impl AppState {
    /// Wire up real clients from config. The assistant handle is absent when
    /// the credential is missing or a placeholder; the chat endpoint then
    /// fails with a configuration error at first use instead of at startup.
    pub fn from_config(config: Config) -> Self {
        let assistant: Option<Arc<dyn AssistantApi>> = if config.openai_configured() {
            Some(Arc::new(OpenAiAssistant::new(config.openai_api_key.clone())))
        } else {
            None
        };
        let db: Arc<dyn Database> = Arc::new(SupabaseDb::from_config(&config));
        Self {
            config,
            assistant,
            db,
        }
    }
}

/// Error wrapper mapped to an HTTP response at the request boundary.
/// Nothing below this layer is allowed to crash the serving process.
pub struct ApiError(pub CompanionError);

impl<E: Into<CompanionError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CompanionError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            CompanionError::Auth(AuthError::Lookup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            CompanionError::Auth(_) => StatusCode::UNAUTHORIZED,
            CompanionError::InvalidRequest(_) | CompanionError::Webhook(_) => {
                StatusCode::BAD_REQUEST
            }
            CompanionError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Request body for the chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub conversation_db_id: Option<i64>,
}

/// Response body for the chat endpoint.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub result: String,
    pub openai_thread_id: String,
    pub conversation_db_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Create the axum Router with all API routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/config", get(handle_config))
        .route("/chat", post(handle_chat).options(handle_chat_preflight))
        .route("/api/conversations", get(handle_list_conversations))
        .route(
            "/api/conversations/{id}/messages",
            get(handle_list_messages),
        )
        .route("/stripe-webhook", post(handle_stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]),
        )
        .with_state(state)
}

/// GET / — liveness
async fn handle_root() -> impl IntoResponse {
    Json(json!({ "message": "AI Companion Backend is running" }))
}

/// GET /health
async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// GET /config — feature configuration, no secrets
async fn handle_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "openai_configured": state.config.openai_configured(),
        "environment": state.config.environment,
    }))
}

/// OPTIONS /chat — CORS preflight acknowledgement
async fn handle_chat_preflight() -> impl IntoResponse {
    Json(json!({ "message": "OK" }))
}

/// POST /chat — run one chat turn against the assistant
async fn handle_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let auth = auth::authenticate(state.db.as_ref(), &headers).await?;
    let assistant = state
        .assistant
        .as_deref()
        .ok_or(ConfigError::NoApiKey)?;

    let turn = ChatTurn {
        text: req.text,
        thread_id: req.thread_id.filter(|t| !t.is_empty()),
        conversation_db_id: req.conversation_db_id,
    };
    let reply = chat::send_message(assistant, state.db.as_ref(), &state.config, &auth, turn).await?;

    Ok(Json(ChatResponse {
        result: reply.result,
        openai_thread_id: reply.openai_thread_id,
        conversation_db_id: reply.conversation_db_id,
        explanation: reply
            .degraded
            .then(|| "The assistant could not complete this reply.".to_string()),
    }))
}

/// GET /api/conversations — the caller's conversations, most recent first
async fn handle_list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let auth = auth::authenticate(state.db.as_ref(), &headers).await?;
    let conversations = state.db.list_conversations(&auth).await?;
    Ok(Json(conversations).into_response())
}

/// GET /api/conversations/{id}/messages — chronological messages
///
/// The ownership check here is defense-in-depth; row-level security already
/// scopes the message read to the caller.
async fn handle_list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let auth = auth::authenticate(state.db.as_ref(), &headers).await?;
    let conversation = state
        .db
        .get_conversation(id)
        .await?
        .ok_or(CompanionError::NotFound)?;
    if conversation.user_id != auth.id {
        return Err(AuthError::Forbidden.into());
    }
    let messages = state.db.list_messages(&auth, id).await?;
    Ok(Json(messages).into_response())
}

/// POST /stripe-webhook — signature-verified entitlement updates
async fn handle_stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.config.webhook_configured() {
        return Err(ConfigError::NoWebhookSecret.into());
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;
    if !verify_webhook_signature(&body, signature, &state.config.stripe_webhook_secret) {
        return Err(WebhookError::InvalidSignature.into());
    }

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let outcome = apply_webhook_event(state.db.as_ref(), &state.config, &event).await?;
    info!(
        event_type = %outcome.event_type,
        action = %outcome.action,
        "Stripe event processed"
    );

    // Always acknowledge once the signature verified; the provider's retry
    // policy is keyed on HTTP status.
    Ok(Json(json!({ "status": "success" })))
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
