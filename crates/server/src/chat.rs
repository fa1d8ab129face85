//! HTTP surface for conversational turns.
//!
//! The caller's identity comes from the store on every request: the request
//! names a user id, and the role attached to the session is whatever the
//! users table says for that id right now.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use risepal_agent::{AgentRuntime, TurnReply, TurnRequest};
use risepal_core::dialogue::SessionUser;
use risepal_core::domain::chat::SessionId;
use risepal_core::domain::user::UserId;
use risepal_core::errors::{ApplicationError, InterfaceError};
use risepal_db::repositories::UserRepository;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
    users: Arc<dyn UserRepository>,
}

impl ChatState {
    pub fn new(runtime: Arc<AgentRuntime>, users: Arc<dyn UserRepository>) -> Self {
        Self { runtime, users }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub user_id: i64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatResponse {
    pub correlation_id: String,
    #[serde(flatten)]
    pub turn: TurnReply,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionDiscarded {
    pub session_id: String,
    pub discarded: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/sessions/{session_id}", delete(delete_session))
        .with_state(state)
}

pub async fn post_chat(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let correlation_id = correlation_id(&headers);

    if request.session_id.trim().is_empty() {
        return Err(reject(InterfaceError::BadRequest {
            message: "session_id must not be empty".to_string(),
            correlation_id,
        }));
    }
    if request.message.trim().is_empty() {
        return Err(reject(InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id,
        }));
    }

    let user = match state.users.find_by_id(UserId(request.user_id)).await {
        Ok(Some(user)) if user.is_active() => user,
        Ok(Some(_)) => {
            return Err(reject(
                ApplicationError::AccessDenied(format!("user {} is inactive", request.user_id))
                    .into_interface(correlation_id),
            ));
        }
        Ok(None) => {
            return Err(reject(
                ApplicationError::AccessDenied(format!("user {} is unknown", request.user_id))
                    .into_interface(correlation_id),
            ));
        }
        Err(error) => {
            return Err(reject(
                ApplicationError::Persistence(error.to_string()).into_interface(correlation_id),
            ));
        }
    };

    info!(
        event_name = "api.chat.received",
        correlation_id = %correlation_id,
        session_id = %request.session_id,
        user_id = user.id.0,
        role = user.role.as_str(),
        "chat turn received"
    );

    let turn = state
        .runtime
        .handle_turn(TurnRequest {
            session_id: SessionId::from(request.session_id.trim()),
            user: SessionUser::from(&user),
            message: request.message,
            correlation_id: correlation_id.clone(),
        })
        .await;

    Ok(Json(ChatResponse { correlation_id, turn }))
}

pub async fn delete_session(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
) -> Json<SessionDiscarded> {
    let discarded = state.runtime.discard_session(&SessionId::from(session_id.as_str())).await;
    info!(
        event_name = "api.session.discarded",
        correlation_id = "session",
        session_id = %session_id,
        discarded,
        "session discard requested"
    );
    Json(SessionDiscarded { session_id, discarded })
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4()))
}

fn reject(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let (status, code, message) = match &error {
        InterfaceError::BadRequest { message, .. } => {
            (StatusCode::BAD_REQUEST, "bad_request", message.clone())
        }
        InterfaceError::Forbidden { .. } => {
            (StatusCode::FORBIDDEN, "forbidden", error.user_message().to_string())
        }
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", error.user_message().to_string())
        }
        InterfaceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal", error.user_message().to_string())
        }
    };
    warn!(
        event_name = "api.chat.rejected",
        correlation_id = error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "chat request rejected"
    );
    (status, Json(ApiError { error: code, message, correlation_id: error.correlation_id().to_string() }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::{Path, State},
        http::{HeaderMap, HeaderValue, Request, StatusCode},
        Json,
    };
    use risepal_agent::prompts::{CLASSIFY_MARKER, HELP_MARKER, SUMMARY_MARKER};
    use risepal_agent::{AgentRuntime, RuntimeDeps, ScriptedLlmClient, TurnOutcome};
    use risepal_core::audit::InMemoryAuditSink;
    use risepal_core::clock::SystemClock;
    use risepal_core::config::AppConfig;
    use risepal_core::dialogue::Intent;
    use risepal_db::repositories::{SqlUserRepository, UserRepository};
    use risepal_db::{connect_with_settings, migrations, DbPool, DemoSeedDataset};
    use tower::ServiceExt;

    use super::{delete_session, post_chat, router, ChatRequest, ChatState, CORRELATION_HEADER};

    struct Fixture {
        pool: DbPool,
        state: ChatState,
        employee_id: i64,
        manager_id: i64,
    }

    async fn fixture() -> Fixture {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        let seeded = DemoSeedDataset::load(&pool, "example.com").await.expect("seed");
        let id_of = |name: &str| {
            seeded.users.iter().find(|user| user.full_name == name).map(|user| user.id).expect("user")
        };
        let employee_id = id_of("Sam Wilson");
        let manager_id = id_of("Mona Reyes");

        let llm = ScriptedLlmClient::new()
            .on(SUMMARY_MARKER, "Intent: help")
            .on(CLASSIFY_MARKER, "other")
            .on(HELP_MARKER, "I can record your daily updates.");
        let deps = RuntimeDeps::sqlite(
            pool.clone(),
            Arc::new(llm),
            Arc::new(SystemClock::with_offset_minutes(0)),
            Arc::new(InMemoryAuditSink::default()),
        );
        let runtime =
            Arc::new(AgentRuntime::new(deps, &AppConfig::default().dialogue).expect("runtime"));
        let users: Arc<dyn UserRepository> = Arc::new(SqlUserRepository::new(pool.clone()));

        Fixture { pool, state: ChatState::new(runtime, users), employee_id, manager_id }
    }

    fn request(user_id: i64, message: &str) -> ChatRequest {
        ChatRequest { session_id: "s-1".to_string(), user_id, message: message.to_string() }
    }

    #[tokio::test]
    async fn chat_turn_replies_with_intent_and_outcome() {
        let fixture = fixture().await;
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("req-42"));

        let Json(response) = post_chat(
            State(fixture.state.clone()),
            headers,
            Json(request(fixture.employee_id, "what can you do?")),
        )
        .await
        .expect("turn");

        assert_eq!(response.correlation_id, "req-42");
        assert_eq!(response.turn.intent, Intent::Other);
        assert_eq!(response.turn.outcome, TurnOutcome::Completed);
        assert_eq!(response.turn.reply, "I can record your daily updates.");
    }

    #[tokio::test]
    async fn blank_message_is_a_bad_request() {
        let fixture = fixture().await;

        let (status, Json(body)) = post_chat(
            State(fixture.state.clone()),
            HeaderMap::new(),
            Json(request(fixture.employee_id, "   ")),
        )
        .await
        .expect_err("blank");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "bad_request");
        assert!(body.correlation_id.starts_with("req-"));
    }

    #[tokio::test]
    async fn unknown_and_inactive_users_are_forbidden() {
        let fixture = fixture().await;

        let (status, _) = post_chat(
            State(fixture.state.clone()),
            HeaderMap::new(),
            Json(request(9_999, "hello")),
        )
        .await
        .expect_err("unknown");
        assert_eq!(status, StatusCode::FORBIDDEN);

        sqlx::query("UPDATE users SET status = 'inactive' WHERE id = ?")
            .bind(fixture.manager_id)
            .execute(&fixture.pool)
            .await
            .expect("deactivate");
        let (status, Json(body)) = post_chat(
            State(fixture.state.clone()),
            HeaderMap::new(),
            Json(request(fixture.manager_id, "hello")),
        )
        .await
        .expect_err("inactive");
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.error, "forbidden");
    }

    #[tokio::test]
    async fn deleting_a_session_forgets_its_state() {
        let fixture = fixture().await;
        let Json(turn) = post_chat(
            State(fixture.state.clone()),
            HeaderMap::new(),
            Json(request(fixture.employee_id, "hello")),
        )
        .await
        .expect("turn");
        assert_eq!(turn.turn.outcome, TurnOutcome::Completed);

        let Json(first) =
            delete_session(State(fixture.state.clone()), Path("s-1".to_string())).await;
        let Json(second) =
            delete_session(State(fixture.state.clone()), Path("s-1".to_string())).await;

        assert!(first.discarded);
        assert!(!second.discarded);
    }

    #[tokio::test]
    async fn router_serves_chat_over_http() {
        let fixture = fixture().await;
        let body = serde_json::json!({
            "session_id": "s-http",
            "user_id": fixture.employee_id,
            "message": "help"
        });

        let response = router(fixture.state.clone())
            .oneshot(
                Request::post("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
