//! Axum handlers for the Turn, Session, and Memory APIs (spec.md §6).
//!
//! There is no authentication layer in this dev-only surface: the caller's
//! identity comes from an `X-User-Id` header, trusted as-is.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

use agentcore_orchestrator::TurnRequest;
use agentcore_types::{AgentCoreError, Modality, Session, SessionId, UserId};

use crate::server::AppState;
use crate::types::{
    CreateMemoryRequest, CreateSessionRequest, CreateSessionResponse, ErrorBody, ErrorResponse,
    ListMemoriesQuery, PendingConfirmationView, SearchMemoriesRequest, SendMessageRequest,
    SendMessageResponse, SessionHistoryResponse, UpdateMemoryRequest,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(trace_id: &str, status: StatusCode, code: &str, message: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                trace_id: trace_id.to_string(),
            },
        }),
    )
}

fn map_agent_error(err: AgentCoreError) -> ApiError {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let status = match &err {
        AgentCoreError::Validation(_) => StatusCode::BAD_REQUEST,
        AgentCoreError::PolicyDenied { .. } | AgentCoreError::ScopeMissing(_) => {
            StatusCode::FORBIDDEN
        }
        AgentCoreError::RateLimited | AgentCoreError::LoopBroken => StatusCode::TOO_MANY_REQUESTS,
        AgentCoreError::NotFound(_) => StatusCode::NOT_FOUND,
        AgentCoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        AgentCoreError::EmbeddingUnavailable(_)
        | AgentCoreError::ToolHandlerError(_)
        | AgentCoreError::Internal(_)
        | AgentCoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&trace_id, status, error_code(&err), err.user_message())
}

fn error_code(err: &AgentCoreError) -> &'static str {
    match err {
        AgentCoreError::Validation(_) => "VALIDATION",
        AgentCoreError::PolicyDenied { .. } => "POLICY_DENIED",
        AgentCoreError::ScopeMissing(_) => "SCOPE_MISSING",
        AgentCoreError::RateLimited => "RATE_LIMITED",
        AgentCoreError::LoopBroken => "LOOP_BROKEN",
        AgentCoreError::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
        AgentCoreError::ToolHandlerError(_) => "TOOL_HANDLER_ERROR",
        AgentCoreError::Timeout => "DEADLINE_EXCEEDED",
        AgentCoreError::Internal(_) => "INTERNAL",
        AgentCoreError::NotFound(_) => "NOT_FOUND",
        AgentCoreError::Store(_) => "STORE_ERROR",
    }
}

fn user_id_header(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let raw = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                &trace_id,
                StatusCode::UNAUTHORIZED,
                "MISSING_USER_ID",
                "missing X-User-Id header".to_string(),
            )
        })?;
    raw.parse::<UserId>().map_err(|_| {
        error_response(
            &trace_id,
            StatusCode::BAD_REQUEST,
            "BAD_USER_ID",
            "X-User-Id is not a valid id".to_string(),
        )
    })
}

fn full_scopes() -> HashSet<String> {
    // Dev-only surface: no scope negotiation layer, so every request carries
    // the full scope set the built-in tool registry knows about.
    [
        "system:read",
        "system:execute",
        "files:read",
        "files:write",
        "calendar:read",
        "calendar:write",
        "email:send",
        "tasks:write",
        "web:search",
        "memory:write",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    state
        .store
        .ensure_user(body.user_id)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?;
    let session = Session {
        id: SessionId::new(),
        user_id: body.user_id,
        started_at: Utc::now(),
        expires_at: None,
        revoked_at: None,
        scopes_override: None,
    };
    state
        .store
        .create_session(&session)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id,
    }))
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let user_id = user_id_header(&headers)?;
    let response = state
        .orchestrator
        .turn(TurnRequest {
            session_id,
            user_id,
            content: body.content,
            modality: Modality::Text,
            idempotency_key: None,
            effective_scopes: full_scopes(),
        })
        .await
        .map_err(map_agent_error)?;

    Ok(Json(SendMessageResponse {
        assistant_text: response.assistant_text,
        session_id,
        pending_confirmation: response.pending_confirmation.map(|p| PendingConfirmationView {
            id: p.id,
            prompt: p.prompt,
        }),
        request_id: uuid::Uuid::new_v4().to_string(),
    }))
}

pub async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let trace_id = uuid::Uuid::new_v4().to_string();
    let session = state
        .store
        .get_session(session_id)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?
        .ok_or_else(|| {
            error_response(
                &trace_id,
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "no such session".to_string(),
            )
        })?;

    let messages = state
        .store
        .recent_messages(session_id, 100)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?;
    let tool_calls = state
        .store
        .tool_calls_for_session(session_id)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?;
    let policy_decisions = state
        .store
        .policy_decisions_for_session(session_id)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?;
    let pending_confirmation = state
        .store
        .pending_confirmation_for_session(session_id)
        .await
        .map_err(|e| map_agent_error(AgentCoreError::Store(e.to_string())))?
        .map(|c| PendingConfirmationView {
            id: c.id,
            prompt: c.prompt,
        });

    Ok(Json(SessionHistoryResponse {
        session_id,
        user_id: session.user_id,
        messages,
        pending_confirmation,
        tool_calls,
        policy_decisions,
    }))
}

pub async fn list_memories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListMemoriesQuery>,
) -> Result<Json<Vec<agentcore_types::Memory>>, ApiError> {
    let user_id = user_id_header(&headers)?;
    let memories = state
        .memory
        .list(
            user_id,
            query.r#type,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await
        .map_err(map_agent_error)?;
    Ok(Json(memories))
}

pub async fn create_memory(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateMemoryRequest>,
) -> Result<Json<agentcore_types::Memory>, ApiError> {
    let user_id = user_id_header(&headers)?;
    let id = state
        .memory
        .write(
            user_id,
            None,
            body.r#type,
            "api",
            &body.content,
            body.metadata,
            None,
        )
        .await
        .map_err(map_agent_error)?;

    let trace_id = uuid::Uuid::new_v4().to_string();
    let memory = state
        .memory
        .get(id)
        .await
        .map_err(map_agent_error)?
        .ok_or_else(|| {
            error_response(
                &trace_id,
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "memory vanished after write".to_string(),
            )
        })?;
    Ok(Json(memory))
}

pub async fn search_memories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SearchMemoriesRequest>,
) -> Result<Json<Vec<agentcore_types::ScoredMemory>>, ApiError> {
    let user_id = user_id_header(&headers)?;
    let scored = state
        .memory
        .retrieve(
            user_id,
            &body.query,
            body.types.as_deref(),
            None,
            body.top_k,
            body.min_score,
        )
        .await
        .map_err(map_agent_error)?;
    Ok(Json(scored))
}

pub async fn update_memory(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(memory_id): Path<agentcore_types::MemoryId>,
    Json(body): Json<UpdateMemoryRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_header(&headers)?;
    let trace_id = uuid::Uuid::new_v4().to_string();
    let Some(content) = body.content else {
        return Err(error_response(
            &trace_id,
            StatusCode::BAD_REQUEST,
            "VALIDATION",
            "content is required".to_string(),
        ));
    };
    state
        .memory
        .update(user_id, memory_id, &content, body.metadata)
        .await
        .map_err(map_agent_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(memory_id): Path<agentcore_types::MemoryId>,
) -> Result<StatusCode, ApiError> {
    let user_id = user_id_header(&headers)?;
    state
        .memory
        .soft_delete(user_id, memory_id)
        .await
        .map_err(map_agent_error)?;
    Ok(StatusCode::NO_CONTENT)
}
