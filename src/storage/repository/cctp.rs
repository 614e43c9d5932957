// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Cross-chain (burn/attestation/mint) transfer repository.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/cctp/
//!   {reference}.json
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Chain, TransferSpeed};

use super::super::{RecordStore, StorageError, StorageResult};

/// Cross-chain transfer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CctpState {
    Initiated,
    BurnPending,
    BurnConfirmed,
    AttestationReceived,
    Completed,
    Failed,
    Cancelled,
}

impl CctpState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CctpState::Completed | CctpState::Failed | CctpState::Cancelled
        )
    }

    /// Whether a user/operator cancellation is still allowed.
    ///
    /// Once the burn is confirmed on the source chain the funds are
    /// irreversibly committed and only the mint path remains.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, CctpState::Initiated | CctpState::BurnPending)
    }
}

/// Persisted cross-chain transfer record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoredCctpTransfer {
    /// Internal reference, assigned once and never mutated.
    pub reference: String,
    /// End user that requested the transfer.
    pub user_id: String,
    /// Source custodial wallet.
    pub wallet_id: String,
    /// Chain the burn executes on.
    pub source_chain: Chain,
    /// Chain the mint executes on.
    pub destination_chain: Chain,
    /// Destination address on the destination chain.
    pub destination: String,
    /// Amount in micro-USDC.
    pub amount_micro: u64,
    /// Amount as a normalized decimal string.
    pub amount: String,
    /// Speed class selected by the caller.
    pub speed: TransferSpeed,
    /// Current state, advanced only by the webhook reconciler after creation.
    pub state: CctpState,
    /// Provider transaction id for the burn leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_tx_id: Option<String>,
    /// On-chain burn transaction hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_tx_hash: Option<String>,
    /// Attestation hash from the attestation service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_hash: Option<String>,
    /// Provider transaction id for the mint leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_tx_id: Option<String>,
    /// On-chain mint transaction hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_tx_hash: Option<String>,
    /// When the transfer was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the burn was confirmed on the source chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_confirmed_at: Option<DateTime<Utc>>,
    /// When the attestation was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attested_at: Option<DateTime<Utc>>,
    /// When the mint completed on the destination chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoredCctpTransfer {
    /// Create a new record in `Initiated` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new_initiated(
        reference: String,
        user_id: String,
        wallet_id: String,
        source_chain: Chain,
        destination_chain: Chain,
        destination: String,
        amount_micro: u64,
        amount: String,
        speed: TransferSpeed,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference,
            user_id,
            wallet_id,
            source_chain,
            destination_chain,
            destination,
            amount_micro,
            amount,
            speed,
            state: CctpState::Initiated,
            burn_tx_id: None,
            burn_tx_hash: None,
            attestation_hash: None,
            mint_tx_id: None,
            mint_tx_hash: None,
            created_at: now,
            updated_at: now,
            burn_confirmed_at: None,
            attested_at: None,
            completed_at: None,
        }
    }

    /// Record burn-leg submission and move to `BurnPending`.
    pub fn mark_burn_pending(&mut self, burn_tx_id: String) {
        self.burn_tx_id = Some(burn_tx_id);
        self.state = CctpState::BurnPending;
        self.updated_at = Utc::now();
    }

    /// Record burn confirmation on the source chain.
    pub fn mark_burn_confirmed(&mut self, burn_tx_hash: Option<String>) {
        if burn_tx_hash.is_some() {
            self.burn_tx_hash = burn_tx_hash;
        }
        self.state = CctpState::BurnConfirmed;
        self.burn_confirmed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record the attestation proof.
    pub fn mark_attested(&mut self, attestation_hash: String) {
        self.attestation_hash = Some(attestation_hash);
        self.state = CctpState::AttestationReceived;
        self.attested_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record mint-leg submission.
    pub fn mark_mint_submitted(&mut self, mint_tx_id: String) {
        self.mint_tx_id = Some(mint_tx_id);
        self.updated_at = Utc::now();
    }

    /// Record mint confirmation; requires the mint transaction hash.
    pub fn mark_completed(&mut self, mint_tx_hash: String) {
        self.mint_tx_hash = Some(mint_tx_hash);
        self.state = CctpState::Completed;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record a failed burn or mint leg.
    pub fn mark_failed(&mut self) {
        self.state = CctpState::Failed;
        self.updated_at = Utc::now();
    }

    /// Record a user/operator cancellation.
    pub fn mark_cancelled(&mut self) {
        self.state = CctpState::Cancelled;
        self.updated_at = Utc::now();
    }
}

/// Repository for cross-chain transfer records.
pub struct CctpRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> CctpRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Persist a new cross-chain transfer record.
    pub fn create(&self, transfer: &StoredCctpTransfer) -> StorageResult<()> {
        let path = self.store.paths().cctp_transfer(&transfer.reference);
        if self.store.exists(&path) {
            return Err(StorageError::AlreadyExists(format!(
                "CCTP transfer {}",
                transfer.reference
            )));
        }
        self.store.write_json(path, transfer)
    }

    /// Get a cross-chain transfer by its internal reference.
    pub fn get(&self, reference: &str) -> StorageResult<StoredCctpTransfer> {
        let path = self.store.paths().cctp_transfer(reference);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!("CCTP transfer {reference}")));
        }
        self.store.read_json(path)
    }

    /// Update an existing cross-chain transfer record.
    pub fn update(&self, transfer: &StoredCctpTransfer) -> StorageResult<()> {
        let path = self.store.paths().cctp_transfer(&transfer.reference);
        if !self.store.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "CCTP transfer {}",
                transfer.reference
            )));
        }
        self.store.write_json(path, transfer)
    }

    /// List all cross-chain transfers, newest first.
    pub fn list(&self) -> StorageResult<Vec<StoredCctpTransfer>> {
        let dir = self.store.paths().cctp_dir();
        let files = self.store.list_files(&dir, "json")?;

        let mut transfers = Vec::new();
        for reference in files {
            match self.get(&reference) {
                Ok(transfer) => transfers.push(transfer),
                Err(e) => {
                    tracing::warn!(reference = %reference, error = %e, "Failed to read CCTP record");
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

    fn sample(reference: &str) -> StoredCctpTransfer {
        StoredCctpTransfer::new_initiated(
            reference.to_string(),
            "user-1".to_string(),
            "wallet-1".to_string(),
            Chain::BaseSepolia,
            Chain::EthSepolia,
            "0x3333333333333333333333333333333333333333".to_string(),
            10_000_000,
            "10.00".to_string(),
            TransferSpeed::Standard,
        )
    }

    #[test]
    fn lifecycle_progresses_through_legs() {
        let (store, _dir) = test_store();
        let repo = CctpRepository::new(&store);

        let mut transfer = sample("xct-1");
        transfer.mark_burn_pending("ptx-burn".to_string());
        repo.create(&transfer).unwrap();

        transfer.mark_burn_confirmed(Some("0xburn".to_string()));
        transfer.mark_attested("0xattestation".to_string());
        transfer.mark_mint_submitted("ptx-mint".to_string());
        transfer.mark_completed("0xmint".to_string());
        repo.update(&transfer).unwrap();

        let read = repo.get("xct-1").unwrap();
        assert_eq!(read.state, CctpState::Completed);
        assert_eq!(read.mint_tx_hash.as_deref(), Some("0xmint"));
        assert!(read.burn_confirmed_at.is_some());
        assert!(read.attested_at.is_some());
        assert!(read.completed_at.is_some());
    }

    #[test]
    fn cancellable_window_closes_after_burn_confirmation() {
        let mut transfer = sample("xct-1");
        assert!(transfer.state.is_cancellable());

        transfer.mark_burn_pending("ptx-burn".to_string());
        assert!(transfer.state.is_cancellable());

        transfer.mark_burn_confirmed(None);
        assert!(!transfer.state.is_cancellable());
    }

    #[test]
    fn terminal_states_are_marked() {
        assert!(CctpState::Completed.is_terminal());
        assert!(CctpState::Failed.is_terminal());
        assert!(CctpState::Cancelled.is_terminal());
        assert!(!CctpState::AttestationReceived.is_terminal());
    }

    #[test]
    fn duplicate_reference_is_rejected() {
        let (store, _dir) = test_store();
        let repo = CctpRepository::new(&store);
        repo.create(&sample("xct-1")).unwrap();
        assert!(matches!(
            repo.create(&sample("xct-1")),
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
