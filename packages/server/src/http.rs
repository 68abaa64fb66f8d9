//! The thin HTTP/WS surface.
//!
//! JSON in, JSON out. Identity arrives from the external auth layer as
//! headers (`X-Tenant-ID`, `X-Purpose`, `X-User-ID`, `X-Roles`); an
//! invalid or missing purpose is a 400 before any handler logic runs.

use std::str::FromStr;
use std::sync::Arc;

use aegis_ai::LlmRequest;
use aegis_connectors::SourceType;
use aegis_cowork::ClientMessage;
use aegis_governance::pbac::{AccessAction, AccessRequest};
use aegis_tenancy::{Principal, Purpose, RequestContext};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/patients/{id}/360", get(patient_360))
        .route("/llm/complete", post(llm_complete))
        .route("/llm/usage", get(llm_usage))
        .route("/audit/verify", get(verify_audit))
        .route("/cowork/{session_id}", get(cowork_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request context from the auth handover headers.
fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let tenant_id = header("x-tenant-id")
        .ok_or_else(|| ApiError::Validation("missing X-Tenant-ID header".to_string()))?;

    let purpose_raw = header("x-purpose")
        .ok_or_else(|| ApiError::Validation("missing X-Purpose header".to_string()))?;
    let purpose = Purpose::from_str(&purpose_raw).map_err(|_| {
        ApiError::Validation(format!(
            "invalid purpose '{purpose_raw}'; one of: {}",
            Purpose::ALL.map(|p| p.as_str()).join("|")
        ))
    })?;

    let principal = match header("x-user-id") {
        Some(user_id) => {
            let roles: Vec<String> = header("x-roles")
                .map(|r| r.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            Principal {
                user_id,
                email: header("x-user-email"),
                roles,
                mfa_verified: header("x-mfa-verified").as_deref() == Some("true"),
            }
        }
        None => Principal::system(),
    };

    let mut ctx = RequestContext::new(tenant_id, purpose).with_principal(principal);
    if let Some(request_id) = header("x-request-id") {
        ctx = ctx.with_request_id(request_id);
    }
    if header("x-emergency").as_deref() == Some("true") {
        ctx = ctx.emergency();
    }
    Ok(ctx)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    source_type: String,
    tenant_id: String,
    payload: Value,
    #[serde(default)]
    source_system: Option<String>,
    #[serde(default)]
    index_in_rag: bool,
}

async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Value>, ApiError> {
    let source_type = SourceType::from_str(&request.source_type)
        .map_err(ApiError::Validation)?;

    let payload = match &request.payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let ctx = RequestContext::new(&request.tenant_id, Purpose::Operations);
    let source_system = request.source_system.as_deref().unwrap_or("api");

    let result = state
        .pipeline
        .ingest(source_type, &payload, &ctx, source_system, request.index_in_rag)
        .await;

    Ok(Json(serde_json::to_value(result).map_err(|e| {
        ApiError::Internal(e.to_string())
    })?))
}

async fn patient_360(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let ctx = context_from_headers(&headers)?;
    let patient_id = if id.contains('/') {
        id
    } else {
        format!("Patient/{id}")
    };

    let decision = state.pbac.evaluate(&AccessRequest {
        principal: ctx.principal.clone(),
        tenant_id: ctx.tenant_id.clone(),
        resource_type: "Patient".to_string(),
        resource_id: patient_id.clone(),
        resource_tenant_id: Some(ctx.tenant_id.clone()),
        action: AccessAction::Read,
        purpose: ctx.purpose,
        purpose_detail: ctx.purpose_detail.clone(),
        patient_id: Some(patient_id.clone()),
        ip_address: ctx.ip_address.clone(),
        emergency: ctx.emergency,
    });
    if !decision.allowed {
        return Err(ApiError::PolicyDeny(decision.reason));
    }

    let view = state.data.get_patient_360(&ctx, &patient_id).await?;
    state.audit.log_access(
        &ctx.principal.user_id,
        "Patient",
        &patient_id,
        &ctx.tenant_id,
        ctx.purpose.as_str(),
        Some(&patient_id),
    );

    Ok(Json(serde_json::to_value(view).map_err(|e| {
        ApiError::Internal(e.to_string())
    })?))
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    prompt: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    tenant_id: Option<String>,
}

async fn llm_complete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt must not be empty".to_string()));
    }

    let mut llm_request = LlmRequest::prompt(request.prompt);
    if let Some(system) = request.system {
        llm_request = llm_request.with_system(system);
    }
    if let Some(model) = request.model {
        llm_request = llm_request.with_model(model);
    }
    if let Some(max_tokens) = request.max_tokens {
        llm_request = llm_request.with_max_tokens(max_tokens);
    }
    if let Some(tenant_id) = request.tenant_id {
        llm_request = llm_request.with_tenant(tenant_id);
    }

    let deadline = Utc::now() + Duration::seconds(state.config.llm_timeout_secs as i64);
    let response = state.gateway.complete(&llm_request, Some(deadline)).await?;

    Ok(Json(json!({
        "content": response.content,
        "model": response.model,
        "provider": response.provider,
        "input_tokens": response.input_tokens,
        "output_tokens": response.output_tokens,
        "usage": state.gateway.usage(),
    })))
}

async fn llm_usage(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!(state.gateway.usage()))
}

async fn verify_audit(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    match state.audit.verify_integrity() {
        Ok(()) => Ok(Json(json!({ "intact": true, "entries": state.audit.len() }))),
        Err(entry_id) => Err(ApiError::Integrity(format!(
            "audit chain broken at entry {entry_id}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct CoworkQuery {
    user_id: String,
}

async fn cowork_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<CoworkQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| drive_cowork_socket(socket, state, session_id, query.user_id))
}

/// Pump one WebSocket against the session hub until either side closes.
async fn drive_cowork_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    session_id: String,
    user_id: String,
) {
    let mut connection = state.hub.connect(&session_id, &user_id);

    loop {
        tokio::select! {
            outbound = connection.outbound.recv() => {
                match outbound {
                    Some(message) => {
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(message) => {
                                state.hub.handle_message(&session_id, connection.id, message)
                            }
                            Err(error) => {
                                tracing::debug!(error = %error, "ignoring malformed cowork frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.hub.disconnect(&session_id, connection.id);
}
