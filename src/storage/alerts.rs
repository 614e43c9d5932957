// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Operator alert log.
//!
//! Escalations that need human attention (exhausted fee retries, fee-leg
//! failures reported by the provider) are appended to a daily JSONL file and
//! emitted as error-level traces. Exhaustion is never silently dropped: the
//! retry worker writes an alert in the same run that exhausts the budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{RecordStore, StorageResult};

/// Types of operator-visible alerts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// A fee retry queue item exhausted its retry budget.
    FeeRetryExhausted,
    /// The provider reported a fee leg as failed after acceptance.
    FeeLegFailed,
    /// A webhook event reported a terminal outcome conflicting with the
    /// record's existing terminal state.
    TerminalConflict,
}

/// One alert log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AlertEvent {
    /// Unique event id.
    pub alert_id: String,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Alert type.
    pub alert_type: AlertType,
    /// Affected resource (transfer reference, retry item id, ...).
    pub resource_id: String,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AlertEvent {
    /// Create a new alert for a resource.
    pub fn new(alert_type: AlertType, resource_id: impl Into<String>) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            alert_type,
            resource_id: resource_id.into(),
            details: None,
        }
    }

    /// Add details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Repository for the alert log.
pub struct AlertRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> AlertRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Append an alert to today's log and emit an error trace.
    pub fn raise(&self, event: &AlertEvent) -> StorageResult<()> {
        tracing::error!(
            alert_type = ?event.alert_type,
            resource_id = %event.resource_id,
            "Operator alert raised"
        );
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        self.store
            .append_jsonl(self.store.paths().alert_log(&date), event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;

    #[test]
    fn raise_appends_to_daily_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::new(StoragePaths::new(dir.path()));
        store.initialize().unwrap();
        let repo = AlertRepository::new(&store);

        let event = AlertEvent::new(AlertType::FeeRetryExhausted, "item-1")
            .with_details(serde_json::json!({"transfer": "tr-1"}));
        repo.raise(&event).unwrap();
        repo.raise(&AlertEvent::new(AlertType::FeeLegFailed, "tr-2"))
            .unwrap();

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let log = std::fs::read_to_string(store.paths().alert_log(&date)).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("fee_retry_exhausted"));
    }
}
