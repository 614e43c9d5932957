// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Inbound provider webhook boundary.
//!
//! The transport contract is deliberately forgiving: once an event is
//! durably logged the response is `200`, regardless of processing outcome.
//! A non-2xx here would only trigger provider redelivery storms for events
//! this system cannot fix (bad signatures, orphans, unknown types).

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::{
    reconciler::{self, parse_event},
    state::AppState,
    storage::{WebhookEventRecord, WebhookEventRepository},
};

/// Header carrying the hex HMAC-SHA256 signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
/// Header carrying the signed timestamp.
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Acknowledgement returned for every webhook delivery.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always true once the request reached this handler.
    pub received: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Receive a provider webhook event.
///
/// Verifies the timestamp-bound HMAC signature, durably logs the event, and
/// hands it to the reconciler. Always returns `200`.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "Webhooks",
    request_body(content = String, description = "Raw provider webhook payload"),
    responses(
        (status = 200, description = "Event received", body = WebhookAck)
    )
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    let ack = Json(WebhookAck { received: true });

    let signature = header_str(&headers, SIGNATURE_HEADER);
    let timestamp = header_str(&headers, TIMESTAMP_HEADER);

    let signature_valid = match (signature, timestamp) {
        (Some(signature), Some(timestamp)) => {
            reconciler::verify_signature(&state.webhook_secret, timestamp, &body, signature)
        }
        _ => false,
    };

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Webhook body was not valid JSON, acknowledging without processing");
            return ack;
        }
    };

    let event = match parse_event(&payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Webhook payload missing required fields, acknowledging without processing");
            return ack;
        }
    };

    // Durably log before any processing; redeliveries bump the counter.
    let repo = WebhookEventRepository::new(&state.store);
    let record = WebhookEventRecord::new(
        event.notification_id.clone(),
        event.event_type.clone(),
        payload,
        event.entity_id.clone(),
    );
    if let Err(e) = repo.log(&record) {
        warn!(
            notification_id = %event.notification_id,
            error = %e,
            "Failed to log webhook event"
        );
        return ack;
    }

    if !signature_valid {
        warn!(
            notification_id = %event.notification_id,
            "Webhook signature mismatch, event logged but not processed"
        );
        let _ = repo.mark_processed(&event.notification_id, Some("signature mismatch".to_string()));
        return ack;
    }

    let result = reconciler::process(&state, &event).await;
    match result {
        Ok(outcome) => {
            tracing::debug!(
                notification_id = %event.notification_id,
                outcome = ?outcome,
                "Webhook event processed"
            );
            let _ = repo.mark_processed(&event.notification_id, None);
        }
        Err(error) => {
            warn!(
                notification_id = %event.notification_id,
                error = %error,
                "Webhook event processing failed"
            );
            let _ = repo.mark_processed(&event.notification_id, Some(error));
        }
    }

    ack
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_lookup_is_tolerant_of_absence() {
        let mut headers = HeaderMap::new();
        assert!(header_str(&headers, SIGNATURE_HEADER).is_none());

        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("abc123"));
        assert_eq!(header_str(&headers, SIGNATURE_HEADER), Some("abc123"));
    }
}
