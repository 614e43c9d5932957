// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Transfer repository for persisting primary money-movement records.
//!
//! ## Storage Layout
//!
//! One JSON file per transfer, keyed by the internal reference:
//! ```text
//! {DATA_DIR}/transfers/
//!   {reference}.json
//! ```
//!
//! Transfer records are the durable audit trail and are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Chain;

use super::super::{RecordStore, StorageError, StorageResult};

/// Provider-state vocabulary for a transfer.
///
/// `Complete`, `Failed`, `Cancelled`, and `Denied` are terminal; a record in
/// a terminal state is never transitioned again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Initiated,
    Queued,
    Sent,
    Confirmed,
    Complete,
    Failed,
    Cancelled,
    Denied,
    Stuck,
    Cleared,
}

impl TransferState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Complete
                | TransferState::Failed
                | TransferState::Cancelled
                | TransferState::Denied
        )
    }

    /// Map a provider state string onto the internal vocabulary.
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INITIATED" => Some(TransferState::Initiated),
            "QUEUED" => Some(TransferState::Queued),
            "SENT" => Some(TransferState::Sent),
            "CONFIRMED" => Some(TransferState::Confirmed),
            "COMPLETE" => Some(TransferState::Complete),
            "FAILED" => Some(TransferState::Failed),
            "CANCELLED" => Some(TransferState::Cancelled),
            "DENIED" => Some(TransferState::Denied),
            "STUCK" => Some(TransferState::Stuck),
            "CLEARED" => Some(TransferState::Cleared),
            _ => None,
        }
    }
}

/// Persisted transfer record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredTransfer {
    /// Internal reference, assigned once at creation and never mutated.
    /// The only transfer identifier ever returned to external callers.
    pub reference: String,
    /// Provider transaction id for the primary leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_tx_id: Option<String>,
    /// Source custodial wallet.
    pub wallet_id: String,
    /// Destination address on chain.
    pub destination: String,
    /// Requested amount in micro-USDC.
    pub amount_micro: u64,
    /// Requested amount as a normalized decimal string.
    pub amount: String,
    /// Chain the transfer executes on.
    pub chain: Chain,
    /// Token identifier sent to the provider.
    pub token_id: String,
    /// Current state, advanced only by the webhook reconciler.
    pub state: TransferState,
    /// On-chain transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Block number, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Computed service fee in micro-USDC (0 when no fee applied).
    pub fee_micro: u64,
    /// Whether the fee leg has been successfully submitted to the provider.
    pub fee_collected: bool,
    /// Provider transaction id for the fee leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_provider_tx_id: Option<String>,
    /// When the transfer was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the provider reported completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the provider reported cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl StoredTransfer {
    /// Create a new record in `Initiated` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new_initiated(
        reference: String,
        wallet_id: String,
        destination: String,
        amount_micro: u64,
        amount: String,
        chain: Chain,
        token_id: String,
        fee_micro: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference,
            provider_tx_id: None,
            wallet_id,
            destination,
            amount_micro,
            amount,
            chain,
            token_id,
            state: TransferState::Initiated,
            tx_hash: None,
            block_number: None,
            fee_micro,
            fee_collected: false,
            fee_provider_tx_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
        }
    }

    /// Record a successful fee-leg submission.
    pub fn mark_fee_collected(&mut self, fee_provider_tx_id: String) {
        self.fee_collected = true;
        self.fee_provider_tx_id = Some(fee_provider_tx_id);
        self.updated_at = Utc::now();
    }

    /// Apply a reconciled state, stamping completion/cancellation times.
    pub fn apply_state(&mut self, state: TransferState) {
        self.state = state;
        self.updated_at = Utc::now();
        match state {
            TransferState::Complete => self.completed_at = Some(Utc::now()),
            TransferState::Cancelled => self.cancelled_at = Some(Utc::now()),
            _ => {}
        }
    }
}

/// Repository for transfer records.
pub struct TransferRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> TransferRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Persist a new transfer record.
    pub fn create(&self, transfer: &StoredTransfer) -> StorageResult<()> {
        let path = self.store.paths().transfer(&transfer.reference);
        if self.store.exists(&path) {
            return Err(StorageError::AlreadyExists(format!(
                "Transfer {}",
                transfer.reference
            )));
        }
        self.store.write_json(path, transfer)
    }

    /// Get a transfer by its internal reference.
    pub fn get(&self, reference: &str) -> StorageResult<StoredTransfer> {
        let path = self.store.paths().transfer(reference);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!("Transfer {reference}")));
        }
        self.store.read_json(path)
    }

    /// Update an existing transfer record.
    pub fn update(&self, transfer: &StoredTransfer) -> StorageResult<()> {
        let path = self.store.paths().transfer(&transfer.reference);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Transfer {}",
                transfer.reference
            )));
        }
        self.store.write_json(path, transfer)
    }

    /// List all transfers, newest first.
    pub fn list(&self) -> StorageResult<Vec<StoredTransfer>> {
        let dir = self.store.paths().transfers_dir();
        let files = self.store.list_files(&dir, "json")?;

        let mut transfers = Vec::new();
        for reference in files {
            match self.get(&reference) {
                Ok(transfer) => transfers.push(transfer),
                Err(e) => {
                    tracing::warn!(reference = %reference, error = %e, "Failed to read transfer record");
                }
            }
        }

        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transfers)
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

    fn sample_transfer(reference: &str) -> StoredTransfer {
        StoredTransfer::new_initiated(
            reference.to_string(),
            "wallet-1".to_string(),
            "0x2222222222222222222222222222222222222222".to_string(),
            50_000_000,
            "50.00".to_string(),
            Chain::BaseSepolia,
            "USDC".to_string(),
            250_000,
        )
    }

    #[test]
    fn create_and_get_transfer() {
        let (store, _dir) = test_store();
        let repo = TransferRepository::new(&store);

        let transfer = sample_transfer("tr-1");
        repo.create(&transfer).unwrap();

        let read = repo.get("tr-1").unwrap();
        assert_eq!(read.reference, "tr-1");
        assert_eq!(read.state, TransferState::Initiated);
        assert!(!read.fee_collected);
    }

    #[test]
    fn create_rejects_duplicate_reference() {
        let (store, _dir) = test_store();
        let repo = TransferRepository::new(&store);

        repo.create(&sample_transfer("tr-1")).unwrap();
        let err = repo.create(&sample_transfer("tr-1")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn mark_fee_collected_sets_leg_id() {
        let (store, _dir) = test_store();
        let repo = TransferRepository::new(&store);

        let mut transfer = sample_transfer("tr-1");
        repo.create(&transfer).unwrap();

        transfer.mark_fee_collected("ptx-fee-1".to_string());
        repo.update(&transfer).unwrap();

        let read = repo.get("tr-1").unwrap();
        assert!(read.fee_collected);
        assert_eq!(read.fee_provider_tx_id.as_deref(), Some("ptx-fee-1"));
    }

    #[test]
    fn apply_state_stamps_completion() {
        let mut transfer = sample_transfer("tr-1");
        transfer.apply_state(TransferState::Complete);
        assert!(transfer.completed_at.is_some());
        assert!(transfer.state.is_terminal());
    }

    #[test]
    fn list_orders_newest_first() {
        let (store, _dir) = test_store();
        let repo = TransferRepository::new(&store);

        let older = sample_transfer("tr-old");
        repo.create(&older).unwrap();

        let mut newer = sample_transfer("tr-new");
        newer.created_at = older.created_at + chrono::Duration::seconds(5);
        repo.create(&newer).unwrap();

        let list = repo.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].reference, "tr-new");
    }

    #[test]
    fn provider_state_mapping_is_stable() {
        assert_eq!(
            TransferState::from_provider("COMPLETE"),
            Some(TransferState::Complete)
        );
        assert_eq!(
            TransferState::from_provider("queued"),
            Some(TransferState::Queued)
        );
        assert_eq!(TransferState::from_provider("UNKNOWN_STATE"), None);
    }
}
