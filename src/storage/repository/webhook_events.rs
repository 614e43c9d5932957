// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Append-only webhook event log.
//!
//! Every inbound provider callback is durably recorded before processing and
//! is never deleted. Records are mutated only to flip the `processed` flag or
//! attach an error; they exist for replay and debugging, not for business
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{RecordStore, StorageError, StorageResult};

/// Logged inbound webhook event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEventRecord {
    /// Provider notification id (log key).
    pub notification_id: String,
    /// Provider event type, e.g. `transactions.complete`.
    pub event_type: String,
    /// Raw payload as received.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// Provider entity id the event refers to, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Whether processing completed (successfully or as a benign no-op).
    pub processed: bool,
    /// Error text recorded by processing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times this event has been received.
    pub retry_count: u32,
    /// When the event was first logged.
    pub received_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    /// Create a new unprocessed record from an inbound event.
    pub fn new(
        notification_id: String,
        event_type: String,
        payload: serde_json::Value,
        entity_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            notification_id,
            event_type,
            payload,
            entity_id,
            processed: false,
            error: None,
            retry_count: 0,
            received_at: now,
            updated_at: now,
        }
    }
}

/// Repository for the webhook event log.
pub struct WebhookEventRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> WebhookEventRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Log an inbound event, or bump the redelivery counter if the provider
    /// re-sent an already-known notification id.
    pub fn log(&self, record: &WebhookEventRecord) -> StorageResult<WebhookEventRecord> {
        let path = self.store.paths().webhook_event(&record.notification_id);
        if self.store.exists(&path) {
            let mut existing: WebhookEventRecord = self.store.read_json(&path)?;
            existing.retry_count += 1;
            existing.updated_at = Utc::now();
            self.store.write_json(&path, &existing)?;
            return Ok(existing);
        }
        self.store.write_json(&path, record)?;
        Ok(record.clone())
    }

    /// Get a logged event by notification id.
    pub fn get(&self, notification_id: &str) -> StorageResult<WebhookEventRecord> {
        let path = self.store.paths().webhook_event(notification_id);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Webhook event {notification_id}"
            )));
        }
        self.store.read_json(path)
    }

    /// Flip the processed flag, optionally recording a processing error.
    pub fn mark_processed(
        &self,
        notification_id: &str,
        error: Option<String>,
    ) -> StorageResult<()> {
        let mut record = self.get(notification_id)?;
        record.processed = error.is_none();
        record.error = error;
        record.updated_at = Utc::now();
        self.store
            .write_json(self.store.paths().webhook_event(notification_id), &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;

    fn test_store() -> (RecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = RecordStore::new(StoragePaths::new(dir.path()));
        store.initialize().expect("initialize");
        (store, dir)
    }

    fn sample(id: &str) -> WebhookEventRecord {
        WebhookEventRecord::new(
            id.to_string(),
            "transactions.complete".to_string(),
            serde_json::json!({"notification": {"id": "ptx-1", "state": "COMPLETE"}}),
            Some("ptx-1".to_string()),
        )
    }

    #[test]
    fn log_and_mark_processed() {
        let (store, _dir) = test_store();
        let repo = WebhookEventRepository::new(&store);

        repo.log(&sample("evt-1")).unwrap();
        repo.mark_processed("evt-1", None).unwrap();

        let read = repo.get("evt-1").unwrap();
        assert!(read.processed);
        assert!(read.error.is_none());
    }

    #[test]
    fn redelivery_bumps_retry_count() {
        let (store, _dir) = test_store();
        let repo = WebhookEventRepository::new(&store);

        repo.log(&sample("evt-1")).unwrap();
        let second = repo.log(&sample("evt-1")).unwrap();
        assert_eq!(second.retry_count, 1);
    }

    #[test]
    fn processing_error_is_recorded() {
        let (store, _dir) = test_store();
        let repo = WebhookEventRepository::new(&store);

        repo.log(&sample("evt-1")).unwrap();
        repo.mark_processed("evt-1", Some("storage offline".to_string()))
            .unwrap();

        let read = repo.get("evt-1").unwrap();
        assert!(!read.processed);
        assert_eq!(read.error.as_deref(), Some("storage offline"));
    }
}
