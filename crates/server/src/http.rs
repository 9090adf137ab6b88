//! HTTP Endpoints
//!
//! WhatsApp webhook, dashboard read API and admin overrides.

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use leadflow_core::{InboundEvent, LeadId};
use leadflow_engine::InboundOutcome;

use crate::metrics::{metrics_handler, record_inbound, record_inbound_error};
use crate::state::AppState;
use crate::whatsapp::WebhookPayload;
use crate::ServerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        // WhatsApp webhook
        .route("/webhook/whatsapp", get(verify_webhook))
        .route("/webhook/whatsapp", post(receive_webhook))
        // Direct injection of one inbound message
        .route("/api/messages", post(inject_message))
        // Dashboard
        .route("/api/leads/:id", get(get_lead))
        .route("/api/leads/:id/tour", post(record_tour))
        .route("/api/advisors/ranking", get(ranking))
        .route("/api/advisors/:id/ledger", get(advisor_ledger))
        // Admin endpoints
        .route("/admin/leads/:id/reset", post(reset_lead))
        .route("/admin/conversations/:phone/reset", post(reset_conversation))
        .route("/admin/sweep", post(run_sweep))
        .route("/admin/reload-config", post(reload_config))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let mut parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured, defaulting to localhost:3000");
        parsed_origins.push(HeaderValue::from_static("http://localhost:3000"));
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

fn engine_failure(err: leadflow_core::Error) -> StatusCode {
    tracing::error!(error = %err, category = err.category(), "Request failed");
    ServerError::from(err).into()
}

/// GET /webhook/whatsapp
///
/// Subscription handshake: echo `hub.challenge` when the token matches.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    let expected = state.get_config().server.webhook_verify_token.clone();

    let mode = params.get("hub.mode").map(String::as_str).unwrap_or_default();
    let token = params.get("hub.verify_token").map(String::as_str).unwrap_or_default();
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    match expected {
        Some(expected)
            if mode == "subscribe" && !challenge.is_empty() && !expected.is_empty() && token == expected =>
        {
            tracing::info!("Webhook subscription verified");
            Ok(challenge)
        },
        _ => {
            tracing::warn!(mode = %mode, "Webhook verification rejected");
            Err(ServerError::Verification.into())
        },
    }
}

/// POST /webhook/whatsapp
///
/// Answers 200 when every message was processed. If any failed the answer is
/// 500 so the channel redelivers the notification; messages that did go
/// through are absorbed as duplicates on the second pass.
async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    let phone_number_id = state.get_config().whatsapp.phone_number_id.clone();
    let events = payload.into_events(&phone_number_id, Utc::now());

    let mut routes: HashMap<&'static str, usize> = HashMap::new();
    let mut failed = 0usize;
    for event in events {
        match dispatch(&state, event).await {
            Ok(outcome) => *routes.entry(outcome.route()).or_default() += 1,
            Err(_) => failed += 1,
        }
    }

    let status = if failed > 0 {
        tracing::warn!(failed, "Webhook notification partly failed, asking for redelivery");
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    let body = serde_json::json!({
        "status": if failed > 0 { "retry" } else { "ok" },
        "routes": routes,
        "failed": failed,
    });
    (status, Json(body))
}

async fn dispatch(state: &AppState, event: InboundEvent) -> Result<InboundOutcome, ServerError> {
    let started = Instant::now();
    let phone = event.from_phone.clone();

    match state.desk.handle_inbound(event).await {
        Ok(outcome) => {
            record_inbound(outcome.route(), started.elapsed());
            Ok(outcome)
        },
        Err(err) => {
            record_inbound_error(err.category());
            tracing::error!(phone = %phone, error = %err, "Inbound message failed");
            Err(err.into())
        },
    }
}

fn outcome_json(outcome: &InboundOutcome) -> serde_json::Value {
    match outcome {
        InboundOutcome::Qualification { lead_id, .. } => serde_json::json!({
            "route": outcome.route(),
            "lead_id": lead_id,
        }),
        InboundOutcome::Command { command, lead } => serde_json::json!({
            "route": outcome.route(),
            "command": command.kind.as_str(),
            "lead_id": lead.id,
            "status": lead.status,
        }),
        InboundOutcome::Rejected(err) => serde_json::json!({
            "route": outcome.route(),
            "reason": err.label(),
        }),
        _ => serde_json::json!({ "route": outcome.route() }),
    }
}

/// Inbound message request
#[derive(Debug, Deserialize)]
struct MessageRequest {
    from: String,
    text: String,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    sender_name: Option<String>,
}

/// POST /api/messages
async fn inject_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let phone = crate::whatsapp::normalize_phone(&request.from)
        .ok_or_else(|| StatusCode::from(ServerError::InvalidRequest("from".to_string())))?;

    let mut event = InboundEvent::new(phone, request.text, Utc::now());
    event.message_id = request.message_id;
    event.sender_name = request.sender_name;

    let outcome = dispatch(&state, event).await.map_err(StatusCode::from)?;
    Ok(Json(outcome_json(&outcome)))
}

/// GET /api/leads/:id
async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = state
        .desk
        .lead_snapshot(id)
        .await
        .map_err(engine_failure)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(serde_json::json!(snapshot)))
}

/// POST /api/leads/:id/tour
async fn record_tour(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let awarded = state
        .desk
        .record_property_tour(id)
        .await
        .map_err(engine_failure)?;

    Ok(Json(serde_json::json!({
        "awarded": awarded.is_some(),
        "event": awarded,
    })))
}

/// GET /api/advisors/ranking
async fn ranking(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let standings = state.desk.leaderboard().await.map_err(engine_failure)?;
    Ok(Json(serde_json::json!({ "advisors": standings })))
}

/// GET /api/advisors/:id/ledger
async fn advisor_ledger(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let events = state.desk.advisor_ledger(id).await.map_err(engine_failure)?;
    let score: i64 = events.iter().map(|e| e.delta).sum();

    Ok(Json(serde_json::json!({
        "advisor_id": id,
        "score": score,
        "events": events,
    })))
}

/// POST /admin/leads/:id/reset
///
/// Administrative override back to NUEVO.
async fn reset_lead(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let lead = state.desk.reset_lead(id).await.map_err(engine_failure)?;
    Ok(Json(serde_json::json!({ "status": "reset", "lead": lead })))
}

/// POST /admin/conversations/:phone/reset
async fn reset_conversation(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = state
        .desk
        .reset_conversation(&phone)
        .await
        .map_err(engine_failure)?;

    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

/// POST /admin/sweep
async fn run_sweep(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let report = state.desk.sweep().await.map_err(engine_failure)?;
    Ok(Json(serde_json::json!(report)))
}

/// POST /admin/reload-config
///
/// Note: server and SLA settings are only applied at startup.
async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "Configuration reloaded successfully"
            })),
        ),
        Err(e) => {
            tracing::error!("Config reload failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string()
                })),
            )
        },
    }
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let advisors = state.advisors.all();
    let available = advisors.iter().filter(|a| a.available).count();
    let automation_active = state.desk.automation().is_active;

    let (status_code, status) = if available > 0 {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "checks": {
                "advisors": { "total": advisors.len(), "available": available },
                "automation": { "active": automation_active },
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use async_trait::async_trait;
    use chrono::DateTime;
    use leadflow_config::{AdvisorEntry, Settings};
    use leadflow_core::{
        ConversationState, ConversationStore, ManualClock, StoreError, TracingAlerter, Versioned,
    };
    use leadflow_engine::EngineDeps;
    use leadflow_persistence::{init_in_memory, SimulatedMessageSender};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Conversation backend that is down
    struct UnreachableConversations;

    #[async_trait]
    impl ConversationStore for UnreachableConversations {
        async fn get(
            &self,
            _phone: &str,
            _now: DateTime<Utc>,
        ) -> Result<Option<Versioned<ConversationState>>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn put(
            &self,
            _state: &ConversationState,
            _expected_version: Option<u64>,
            _now: DateTime<Utc>,
            _expires_at: DateTime<Utc>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn delete(&self, _phone: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn expire(&self, _phone: &str, _now: DateTime<Utc>) -> Result<bool, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    fn webhook_request(message_id: &str, text: &str) -> Request<Body> {
        let payload = serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": {
                "contacts": [{ "wa_id": "5215599991234", "profile": { "name": "María" } }],
                "messages": [{
                    "from": "5215599991234",
                    "id": message_id,
                    "timestamp": "1772463600",
                    "type": "text",
                    "text": { "body": text }
                }]
            }}]}]
        });
        Request::post("/webhook/whatsapp")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    fn state() -> AppState {
        let mut settings = Settings::default();
        settings.server.webhook_verify_token = Some("secreto".into());
        settings.advisors = vec![AdvisorEntry {
            id: 1,
            name: "Ana Torres".into(),
            phone: "5215511110001".into(),
            available: true,
        }];
        AppState::in_memory(
            settings,
            Arc::new(SimulatedMessageSender::new()),
            Arc::new(TracingAlerter),
            Arc::new(ManualClock::default()),
        )
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_router_creation() {
        let _ = create_router(state());
    }

    #[tokio::test]
    async fn test_webhook_verification() {
        let app = create_router(state());

        let ok = app
            .clone()
            .oneshot(
                Request::get("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=secreto&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"42");

        let denied = app
            .oneshot(
                Request::get("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=otro&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_webhook_starts_qualification() {
        let app = create_router(state());

        let response = app.oneshot(webhook_request("wamid.1", "Hola")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["routes"]["qualification"], 1);
        assert_eq!(body["failed"], 0);
    }

    #[tokio::test]
    async fn test_webhook_failure_asks_for_redelivery() {
        let settings = state().get_config().clone();
        let store = init_in_memory(settings.roster());
        let deps = EngineDeps {
            leads: store.leads.clone(),
            assignments: store.assignments.clone(),
            ledger: store.ledger.clone(),
            conversations: Arc::new(UnreachableConversations),
            advisors: store.advisors.clone(),
            sender: Arc::new(SimulatedMessageSender::new()),
            alerter: Arc::new(TracingAlerter),
            clock: Arc::new(ManualClock::default()),
        };
        let app = create_router(AppState::new(settings, deps, store.advisors));

        let response = app.oneshot(webhook_request("wamid.9", "Hola")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "retry");
        assert_eq!(body["failed"], 1);
    }

    #[tokio::test]
    async fn test_rejected_command_and_missing_lead() {
        let app = create_router(state());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"from":"5215511110001","text":"CONTACTADO 77"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["route"], "rejected");
        assert_eq!(body["reason"], "lead_not_found");

        let response = app
            .oneshot(Request::get("/api/leads/77").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ranking_lists_roster() {
        let app = create_router(state());
        let response = app
            .oneshot(Request::get("/api/advisors/ranking").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["advisors"][0]["advisor"]["name"], "Ana Torres");
        assert_eq!(body["advisors"][0]["score"], 0);
    }

    #[tokio::test]
    async fn test_reset_unknown_lead_is_not_found() {
        let app = create_router(state());
        let response = app
            .oneshot(
                Request::post("/admin/leads/5/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
