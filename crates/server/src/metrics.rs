//! Prometheus metrics
//!
//! Counters are fed from two places: the webhook handler records every inbound
//! message by route, and a background task mirrors the engine event stream.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use leadflow_engine::{EngineEvent, LeadDesk};

use crate::state::AppState;

/// Install the global recorder. Returns `None` if one is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        },
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

pub fn record_inbound(route: &'static str, latency: Duration) {
    metrics::counter!("leadflow_inbound_messages_total", "route" => route).increment(1);
    metrics::histogram!("leadflow_inbound_latency_seconds", "route" => route)
        .record(latency.as_secs_f64());
}

pub fn record_inbound_error(category: &'static str) {
    metrics::counter!("leadflow_inbound_errors_total", "category" => category).increment(1);
}

pub fn record_engine_event(event: &EngineEvent) {
    metrics::counter!("leadflow_engine_events_total", "event" => event.name()).increment(1);

    match event {
        EngineEvent::PointsAwarded { reason, delta, .. } => {
            metrics::counter!("leadflow_points_awarded_total", "reason" => reason.as_str())
                .increment(1);
            metrics::histogram!("leadflow_points_delta", "reason" => reason.as_str())
                .record(*delta as f64);
        },
        EngineEvent::ResponseRecorded { gap_secs, .. } => {
            metrics::histogram!("leadflow_advisor_response_seconds").record(*gap_secs as f64);
        },
        EngineEvent::CommandRejected { reason } => {
            metrics::counter!("leadflow_commands_rejected_total", "reason" => reason.clone())
                .increment(1);
        },
        _ => {},
    }
}

/// Mirror engine events into metrics until the desk is dropped
pub fn spawn_event_recorder(desk: &Arc<LeadDesk>) -> JoinHandle<()> {
    let mut rx = desk.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => record_engine_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Metrics recorder lagged behind engine events");
                },
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::ScoreReason;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_inbound("command", Duration::from_millis(3));
        record_engine_event(&EngineEvent::PointsAwarded {
            advisor_id: 1,
            reason: ScoreReason::Close,
            delta: 200,
        });
    }
}
