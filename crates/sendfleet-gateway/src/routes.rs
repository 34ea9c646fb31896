//! API route handlers for the gateway.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use sendfleet_core::error::SendFleetError;
use sendfleet_core::types::{ChannelKind, ChannelPayload};
use sendfleet_dispatch::RecipientSource;
use sendfleet_scheduler::Appointment;
use serde::Deserialize;
use std::sync::Arc;

use super::server::AppState;

type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Map engine errors onto HTTP: user-actionable configuration/validation
/// problems are the caller's to fix (400), everything else is ours (500).
fn error_response(e: &SendFleetError) -> ApiResponse {
    let status = if e.user_actionable() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({"ok": false, "error": e.to_string()})),
    )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sendfleet-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PublishBody {
    pub company_id: String,
    pub campaign_name: String,
    #[serde(default)]
    pub created_by: String,
    /// One payload per channel; each becomes an independent job.
    pub payloads: Vec<ChannelPayload>,
    pub source: RecipientSource,
}

/// Publish a campaign across one or more channels. Each channel's job is
/// independent — the response names which channels were accepted and which
/// failed, and dispatch runs in the background after the receipt returns.
pub async fn publish_campaign(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PublishBody>,
) -> ApiResponse {
    if body.payloads.is_empty() {
        return error_response(&SendFleetError::validation("payloads must not be empty"));
    }

    let outcome = state
        .publisher
        .publish_many(
            &body.company_id,
            &body.campaign_name,
            &body.created_by,
            body.payloads,
            body.source,
        )
        .await;

    let receipts: Vec<serde_json::Value> = outcome
        .prepared
        .iter()
        .map(|p| serde_json::to_value(&p.receipt).unwrap_or_default())
        .collect();
    let failures: Vec<serde_json::Value> = outcome
        .failures
        .iter()
        .map(|(channel, e)| {
            serde_json::json!({"channel": channel.as_str(), "error": e.to_string()})
        })
        .collect();

    let all_failed = receipts.is_empty();
    for prepared in outcome.prepared {
        let publisher = state.publisher.clone();
        let job_id = prepared.receipt.job_id.clone();
        tokio::spawn(async move {
            if let Err(e) = publisher.run_dispatch(prepared).await {
                tracing::error!("Dispatch of job {job_id} aborted: {e}");
            }
        });
    }

    let status = if all_failed {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(serde_json::json!({
            "ok": !all_failed,
            "jobs": receipts,
            "failures": failures,
        })),
    )
}

/// Live job status, progress included.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.jobs.get(&id) {
        Ok(Some(job)) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "job": job})),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"ok": false, "error": format!("Unknown job {id}")})),
        ),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub company_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResponse {
    match state.jobs.list(&query.company_id, query.limit) {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "jobs": jobs})),
        ),
        Err(e) => error_response(&e),
    }
}

/// Externally triggered reminder tick. Runs to completion inside this
/// request; a tick with nothing due returns the zero summary.
pub async fn reminder_tick(State(state): State<Arc<AppState>>) -> ApiResponse {
    match state.ticker.run_tick(Utc::now()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "processed": summary.processed,
                "successful": summary.successful,
                "failed": summary.failed,
                "errors": summary.errors,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

pub async fn upsert_appointment(
    State(state): State<Arc<AppState>>,
    Json(appointment): Json<Appointment>,
) -> ApiResponse {
    match state.reminders.schedule(&appointment, Utc::now()) {
        Ok(created) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "reminders_created": created})),
        ),
        Err(e) => error_response(&e),
    }
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    match state.reminders.cancel(&id) {
        Ok(skipped) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "reminders_skipped": skipped})),
        ),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RescheduleBody {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> ApiResponse {
    match state
        .reminders
        .reschedule(&id, body.start_time, body.end_time, Utc::now())
    {
        Ok(created) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "reminders_created": created})),
        ),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SuppressionEvent {
    pub channel: ChannelKind,
    pub address: String,
    /// "bounce", "complaint", "unsubscribe".
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SuppressionWebhookBody {
    pub company_id: String,
    pub events: Vec<SuppressionEvent>,
}

/// Inbound delivery-status/suppression webhook. The raw body is verified
/// against the shared secret before anything is parsed; a bad signature
/// mutates nothing.
pub async fn suppression_webhook(
    State(state): State<Arc<AppState>>,
    Path(vendor): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse {
    let secret = &state.config.gateway.webhook_secret;
    if !secret.is_empty() {
        let signature = headers
            .get("x-webhook-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(secret, &body, signature) {
            tracing::warn!("🚫 Rejected {vendor} webhook: bad signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({"ok": false, "error": "Invalid webhook signature"})),
            );
        }
    }

    let parsed: SuppressionWebhookBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            return error_response(&SendFleetError::Validation(format!(
                "Malformed webhook body: {e}"
            )));
        }
    };

    let mut ingested = 0;
    let mut rejected = 0;
    for event in &parsed.events {
        match state.suppression.add(
            &parsed.company_id,
            event.channel,
            &event.address,
            &event.reason,
            &vendor,
        ) {
            Ok(()) => ingested += 1,
            Err(e) => {
                tracing::warn!("Suppression event dropped: {e}");
                rejected += 1;
            }
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"ok": true, "ingested": ingested, "rejected": rejected})),
    )
}

/// HMAC-SHA256 over the raw body, hex-encoded, optional `sha256=` prefix.
fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    use hmac::{Hmac, Mac};

    let Ok(mut mac) = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let Ok(given) = hex::decode(signature.trim().trim_start_matches("sha256=")) else {
        return false;
    };
    mac.verify_slice(&given).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_roundtrip() {
        let body = br#"{"company_id":"acme","events":[]}"#;
        let sig = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &sig));
        assert!(verify_signature("topsecret", body, &format!("sha256={sig}")));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = br#"{"company_id":"acme","events":[]}"#;
        let sig = sign("topsecret", body);
        assert!(!verify_signature("topsecret", b"{}", &sig));
        assert!(!verify_signature("wrong", body, &sig));
        assert!(!verify_signature("topsecret", body, "not-hex"));
        assert!(!verify_signature("topsecret", body, ""));
    }

    #[test]
    fn user_errors_map_to_400() {
        let (status, _) = error_response(&SendFleetError::NoRecipients);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = error_response(&SendFleetError::Store("locked".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
