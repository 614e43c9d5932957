// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Path constants and utilities for the persistent record store layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent data.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the record store.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all persisted data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Transfer Paths ==========

    /// Directory containing all transfer records.
    pub fn transfers_dir(&self) -> PathBuf {
        self.root.join("transfers")
    }

    /// Path to a specific transfer record.
    pub fn transfer(&self, reference: &str) -> PathBuf {
        self.transfers_dir().join(format!("{reference}.json"))
    }

    // ========== Cross-Chain Transfer Paths ==========

    /// Directory containing all cross-chain transfer records.
    pub fn cctp_dir(&self) -> PathBuf {
        self.root.join("cctp")
    }

    /// Path to a specific cross-chain transfer record.
    pub fn cctp_transfer(&self, reference: &str) -> PathBuf {
        self.cctp_dir().join(format!("{reference}.json"))
    }

    // ========== Fee Retry Queue Paths ==========

    /// Directory containing fee retry queue items.
    pub fn fee_retries_dir(&self) -> PathBuf {
        self.root.join("fee_retries")
    }

    /// Path to a specific fee retry queue item.
    pub fn fee_retry(&self, item_id: &str) -> PathBuf {
        self.fee_retries_dir().join(format!("{item_id}.json"))
    }

    // ========== Webhook Event Log Paths ==========

    /// Directory containing logged webhook events.
    pub fn webhook_events_dir(&self) -> PathBuf {
        self.root.join("webhook_events")
    }

    /// Path to a specific logged webhook event.
    pub fn webhook_event(&self, notification_id: &str) -> PathBuf {
        self.webhook_events_dir()
            .join(format!("{notification_id}.json"))
    }

    // ========== Leg Index Paths ==========

    /// Directory containing the provider-transaction-id leg index.
    pub fn legs_dir(&self) -> PathBuf {
        self.root.join("legs")
    }

    /// Path to the leg index entry for a provider transaction id.
    pub fn leg(&self, provider_tx_id: &str) -> PathBuf {
        self.legs_dir().join(format!("{provider_tx_id}.json"))
    }

    // ========== Alert Log Paths ==========

    /// Directory containing operator alert logs.
    pub fn alerts_dir(&self) -> PathBuf {
        self.root.join("alerts")
    }

    /// Path to a specific date's alert log (JSONL, one event per line).
    pub fn alert_log(&self, date: &str) -> PathBuf {
        self.alerts_dir().join(format!("{date}.jsonl"))
    }

    // ========== Operator Config Paths ==========

    /// Directory containing operator-editable configuration.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Path to the fee policy / collection wallet configuration file.
    pub fn fee_config(&self) -> PathBuf {
        self.config_dir().join("fees.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted() {
        let paths = StoragePaths::new("/tmp/custodia-test");
        assert_eq!(
            paths.transfer("tr-abc"),
            PathBuf::from("/tmp/custodia-test/transfers/tr-abc.json")
        );
        assert_eq!(
            paths.leg("ptx-1"),
            PathBuf::from("/tmp/custodia-test/legs/ptx-1.json")
        );
        assert_eq!(
            paths.alert_log("2026-01-01"),
            PathBuf::from("/tmp/custodia-test/alerts/2026-01-01.jsonl")
        );
    }

    #[test]
    fn default_root_is_data() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new(DATA_ROOT));
    }
}
