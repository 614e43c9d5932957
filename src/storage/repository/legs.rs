// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Leg index: provider transaction id → owning record.
//!
//! Every provider transaction this service creates (primary transfer, fee
//! leg, CCTP burn, CCTP mint) registers one entry here at submission time.
//! The webhook reconciler resolves an inbound event's transaction id against
//! this index exactly once and dispatches on the variant, instead of probing
//! each record type in turn.

use serde::{Deserialize, Serialize};

use super::super::{RecordStore, StorageError, StorageResult};

/// Which leg of which record a provider transaction id belongs to.
///
/// The payload is the internal reference of the owning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reference", rename_all = "snake_case")]
pub enum LegRef {
    /// Primary leg of a plain transfer.
    Primary(String),
    /// Fee leg of a plain transfer.
    Fee(String),
    /// Burn leg of a cross-chain transfer.
    CctpBurn(String),
    /// Mint leg of a cross-chain transfer.
    CctpMint(String),
}

impl LegRef {
    /// The owning record's internal reference.
    pub fn reference(&self) -> &str {
        match self {
            LegRef::Primary(r) | LegRef::Fee(r) | LegRef::CctpBurn(r) | LegRef::CctpMint(r) => r,
        }
    }
}

/// Repository for the provider-transaction-id leg index.
pub struct LegIndexRepository<'a> {
    store: &'a RecordStore,
}

impl<'a> LegIndexRepository<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Register a provider transaction id for a leg.
    ///
    /// Re-registering the same id with the same target is a no-op; a
    /// conflicting target is an error.
    pub fn register(&self, provider_tx_id: &str, leg: &LegRef) -> StorageResult<()> {
        let path = self.store.paths().leg(provider_tx_id);
        if self.store.exists(&path) {
            let existing: LegRef = self.store.read_json(&path)?;
            if existing == *leg {
                return Ok(());
            }
            return Err(StorageError::AlreadyExists(format!(
                "Leg index entry {provider_tx_id}"
            )));
        }
        self.store.write_json(path, leg)
    }

    /// Resolve a provider transaction id, if it belongs to this system.
    pub fn resolve(&self, provider_tx_id: &str) -> StorageResult<Option<LegRef>> {
        let path = self.store.paths().leg(provider_tx_id);
        if !self.store.exists(&path) {
            return Ok(None);
        }
        Ok(Some(self.store.read_json(path)?))
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

    #[test]
    fn register_and_resolve() {
        let (store, _dir) = test_store();
        let repo = LegIndexRepository::new(&store);

        repo.register("ptx-1", &LegRef::Primary("tr-1".to_string()))
            .unwrap();
        repo.register("ptx-2", &LegRef::CctpBurn("xct-1".to_string()))
            .unwrap();

        assert_eq!(
            repo.resolve("ptx-1").unwrap(),
            Some(LegRef::Primary("tr-1".to_string()))
        );
        assert_eq!(
            repo.resolve("ptx-2").unwrap(),
            Some(LegRef::CctpBurn("xct-1".to_string()))
        );
        assert_eq!(repo.resolve("ptx-unknown").unwrap(), None);
    }

    #[test]
    fn reregistering_same_target_is_idempotent() {
        let (store, _dir) = test_store();
        let repo = LegIndexRepository::new(&store);

        let leg = LegRef::Fee("tr-1".to_string());
        repo.register("ptx-1", &leg).unwrap();
        repo.register("ptx-1", &leg).unwrap();
    }

    #[test]
    fn conflicting_target_is_rejected() {
        let (store, _dir) = test_store();
        let repo = LegIndexRepository::new(&store);

        repo.register("ptx-1", &LegRef::Primary("tr-1".to_string()))
            .unwrap();
        let err = repo
            .register("ptx-1", &LegRef::CctpMint("xct-9".to_string()))
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn reference_accessor_returns_owner() {
        assert_eq!(LegRef::CctpMint("xct-3".to_string()).reference(), "xct-3");
    }
}
