// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Fee retry queue item repository.
//!
//! Items are created when request-time fee collection fails, deleted on
//! successful retry, and flipped to `Failed` after exhausting the retry
//! budget. A `Failed` item is only reset by a manual operator action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Chain;

use super::super::{RecordStore, StorageError, StorageResult};

/// Maximum automatic attempts for one fee retry queue item.
pub const MAX_FEE_RETRIES: u32 = 3;

/// Fee retry item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeRetryStatus {
    /// Eligible for the next worker sweep.
    Pending,
    /// Retry budget exhausted; waiting for operator inspection.
    Failed,
}

/// Persisted fee retry queue item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeeRetryItem {
    /// Unique item id.
    pub item_id: String,
    /// Reference of the owning transfer.
    pub transfer_reference: String,
    /// Source custodial wallet to collect from.
    pub wallet_id: String,
    /// Fee amount in micro-USDC.
    pub fee_micro: u64,
    /// Collection wallet address.
    pub collection_address: String,
    /// Chain the fee transfer executes on.
    pub chain: Chain,
    /// Attempts made so far; never exceeds [`MAX_FEE_RETRIES`].
    pub retry_count: u32,
    /// Current status.
    pub status: FeeRetryStatus,
    /// Last error observed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the item was last touched.
    pub updated_at: DateTime<Utc>,
}

impl FeeRetryItem {
    /// Create a new pending item for a transfer whose fee leg failed.
    pub fn new_pending(
        transfer_reference: String,
        wallet_id: String,
        fee_micro: u64,
        collection_address: String,
        chain: Chain,
        error: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            item_id: uuid::Uuid::new_v4().to_string(),
            transfer_reference,
            wallet_id,
            fee_micro,
            collection_address,
            chain,
            retry_count: 0,
            status: FeeRetryStatus::Pending,
            last_error: Some(error),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, error: String) {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Whether the retry budget is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= MAX_FEE_RETRIES
    }

    /// Mark the item failed for operator inspection.
    pub fn mark_failed(&mut self) {
        self.status = FeeRetryStatus::Failed;
        self.updated_at = Utc::now();
    }

    /// Operator reset: back to pending with a fresh retry budget.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.status = FeeRetryStatus::Pending;
        self.updated_at = Utc::now();
    }
}

/// Repository for fee retry queue items.
pub struct FeeRetryRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> FeeRetryRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Persist a new queue item.
    pub fn create(&self, item: &FeeRetryItem) -> StorageResult<()> {
        let path = self.store.paths().fee_retry(&item.item_id);
        if self.store.exists(&path) {
            return Err(StorageError::AlreadyExists(format!(
                "Fee retry item {}",
                item.item_id
            )));
        }
        self.store.write_json(path, item)
    }

    /// Get a queue item by id.
    pub fn get(&self, item_id: &str) -> StorageResult<FeeRetryItem> {
        let path = self.store.paths().fee_retry(item_id);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!("Fee retry item {item_id}")));
        }
        self.store.read_json(path)
    }

    /// Update a queue item.
    pub fn update(&self, item: &FeeRetryItem) -> StorageResult<()> {
        let path = self.store.paths().fee_retry(&item.item_id);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Fee retry item {}",
                item.item_id
            )));
        }
        self.store.write_json(path, item)
    }

    /// Delete a queue item (fee successfully collected).
    pub fn delete(&self, item_id: &str) -> StorageResult<()> {
        let path = self.store.paths().fee_retry(item_id);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!("Fee retry item {item_id}")));
        }
        self.store.delete(path)
    }

    /// List all queue items, oldest first.
    pub fn list(&self) -> StorageResult<Vec<FeeRetryItem>> {
        let dir = self.store.paths().fee_retries_dir();
        let files = self.store.list_files(&dir, "json")?;

        let mut items = Vec::new();
        for item_id in files {
            match self.get(&item_id) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(item_id = %item_id, error = %e, "Failed to read fee retry item");
                }
            }
        }

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(items)
    }

    /// List pending items, oldest first.
    pub fn list_pending(&self) -> StorageResult<Vec<FeeRetryItem>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|item| item.status == FeeRetryStatus::Pending)
            .collect())
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

    fn sample() -> FeeRetryItem {
        FeeRetryItem::new_pending(
            "tr-1".to_string(),
            "wallet-1".to_string(),
            250_000,
            "0x4444444444444444444444444444444444444444".to_string(),
            Chain::BaseSepolia,
            "provider timeout".to_string(),
        )
    }

    #[test]
    fn retry_budget_is_bounded() {
        let mut item = sample();
        assert!(!item.is_exhausted());

        item.record_failure("err 1".to_string());
        item.record_failure("err 2".to_string());
        assert!(!item.is_exhausted());

        item.record_failure("err 3".to_string());
        assert!(item.is_exhausted());
        assert_eq!(item.retry_count, MAX_FEE_RETRIES);
    }

    #[test]
    fn reset_restores_pending_state() {
        let mut item = sample();
        item.record_failure("e".to_string());
        item.record_failure("e".to_string());
        item.record_failure("e".to_string());
        item.mark_failed();
        assert_eq!(item.status, FeeRetryStatus::Failed);

        item.reset();
        assert_eq!(item.status, FeeRetryStatus::Pending);
        assert_eq!(item.retry_count, 0);
    }

    #[test]
    fn pending_list_excludes_failed_items() {
        let (store, _dir) = test_store();
        let repo = FeeRetryRepository::new(&store);

        let pending = sample();
        repo.create(&pending).unwrap();

        let mut failed = sample();
        failed.mark_failed();
        repo.create(&failed).unwrap();

        let list = repo.list_pending().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].item_id, pending.item_id);
    }

    #[test]
    fn delete_removes_item() {
        let (store, _dir) = test_store();
        let repo = FeeRetryRepository::new(&store);

        let item = sample();
        repo.create(&item).unwrap();
        repo.delete(&item.item_id).unwrap();
        assert!(matches!(
            repo.get(&item.item_id),
            Err(StorageError::NotFound(_))
        ));
    }
}
