// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Repository layer providing typed access to the record store.
//!
//! Each repository provides CRUD operations for a specific entity type,
//! using the RecordStore for all file operations.

pub mod cctp;
pub mod fee_retry;
pub mod legs;
pub mod transfers;
pub mod webhook_events;

pub use cctp::{CctpRepository, CctpState, StoredCctpTransfer};
pub use fee_retry::{FeeRetryItem, FeeRetryRepository, FeeRetryStatus, MAX_FEE_RETRIES};
pub use legs::{LegIndexRepository, LegRef};
pub use transfers::{StoredTransfer, TransferRepository, TransferState};
pub use webhook_events::{WebhookEventRecord, WebhookEventRepository};
