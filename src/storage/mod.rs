// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! # Persistent Storage Module
//!
//! Keyed JSON-record persistence for every durable entity: transfers,
//! cross-chain transfers, the fee retry queue, the webhook event log, the
//! provider-transaction leg index, and the operator alert log.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   transfers/{reference}.json
//!   cctp/{reference}.json
//!   fee_retries/{item_id}.json
//!   webhook_events/{notification_id}.json
//!   legs/{provider_tx_id}.json
//!   alerts/{date}.jsonl
//!   config/fees.json          # operator-editable fee policy
//! ```
//!
//! One file per record, atomic write-via-rename. Transfer records are the
//! durable audit trail and are never deleted.

pub mod alerts;
pub mod fs;
pub mod paths;
pub mod repository;

pub use alerts::{AlertEvent, AlertRepository, AlertType};
pub use fs::{RecordStore, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{
    CctpRepository, CctpState, FeeRetryItem, FeeRetryRepository, FeeRetryStatus,
    LegIndexRepository, LegRef, StoredCctpTransfer, StoredTransfer, TransferRepository,
    TransferState, WebhookEventRecord, WebhookEventRepository, MAX_FEE_RETRIES,
};
