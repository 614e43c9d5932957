// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! # Fee Retry Worker
//!
//! Background task that repairs fee collections which failed at request
//! time. Runs on a fixed interval, processes pending queue items oldest
//! first in bounded batches, and never touches the primary transfer.
//!
//! ## Strategy
//!
//! Every sweep the worker:
//! 1. Skips entirely if another sweep is still running (in-process
//!    single-flight guard; best effort, not a distributed lock — a
//!    multi-instance deployment must shard ownership or rely on the
//!    provider's idempotency-key deduplication to bound duplicates).
//! 2. Loads pending items oldest-first, capped at the batch size.
//! 3. Attempts each with a freshly sealed credential and a fresh
//!    idempotency token — a retry is a new provider call, never a
//!    resubmission.
//! 4. Marks items `FAILED` and raises an operator alert once the retry
//!    budget is exhausted, in the same sweep that exhausts it.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{
    DEFAULT_FEE_RETRY_BATCH_SIZE, DEFAULT_FEE_RETRY_INTERVAL_SECS, FEE_RETRY_BATCH_ENV,
    FEE_RETRY_INTERVAL_ENV,
};
use crate::models::format_usdc;
use crate::providers::{parse_accepted, transfer_body, TRANSFER_PATH};
use crate::state::AppState;
use crate::storage::{
    AlertEvent, AlertRepository, AlertType, FeeRetryItem, FeeRetryRepository, FeeRetryStatus,
    LegIndexRepository, LegRef, RecordStore, StorageResult, TransferRepository,
};

/// Outcome of a manual operator retry.
#[derive(Debug, Clone)]
pub struct ManualRetryResult {
    pub success: bool,
    pub error: Option<String>,
}

/// Background fee retry worker.
pub struct FeeRetryWorker {
    state: AppState,
    interval: Duration,
    batch_size: usize,
    running: AtomicBool,
}

impl FeeRetryWorker {
    /// Create a worker with interval and batch size from the environment.
    pub fn new(state: AppState) -> Self {
        let interval_secs = std::env::var(FEE_RETRY_INTERVAL_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FEE_RETRY_INTERVAL_SECS);
        let batch_size = std::env::var(FEE_RETRY_BATCH_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_FEE_RETRY_BATCH_SIZE);

        Self {
            state,
            interval: Duration::from_secs(interval_secs),
            batch_size,
            running: AtomicBool::new(false),
        }
    }

    /// Run the worker loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Fee retry worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Fee retry worker shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Fee retry worker shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep over the pending queue.
    async fn sweep(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Fee retry sweep still running, skipping this tick");
            return;
        }

        let pending = {
            let repo = FeeRetryRepository::new(&self.state.store);
            match repo.list_pending() {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "Failed to list fee retry queue");
                    self.running.store(false, Ordering::Release);
                    return;
                }
            }
        };

        if !pending.is_empty() {
            info!(count = pending.len(), "Fee retry worker: processing pending items");
        }

        for item in pending.into_iter().take(self.batch_size) {
            process_item(&self.state, item).await;
        }

        self.running.store(false, Ordering::Release);
    }
}

/// Process one queue item: short-circuit exhausted or already-collected
/// items, otherwise attempt the fee transfer once.
async fn process_item(state: &AppState, mut item: FeeRetryItem) {
    let store = &state.store;

    // The owning transfer may have had its fee collected elsewhere
    // (manual retry, late webhook); clean the item up instead of paying twice.
    let transfers = TransferRepository::new(store);
    match transfers.get(&item.transfer_reference) {
        Ok(transfer) if transfer.fee_collected => {
            info!(
                item_id = %item.item_id,
                transfer = %item.transfer_reference,
                "Fee already collected, removing queue item"
            );
            let repo = FeeRetryRepository::new(store);
            if let Err(e) = repo.delete(&item.item_id) {
                warn!(item_id = %item.item_id, error = %e, "Failed to delete settled queue item");
            }
            return;
        }
        Ok(_) => {}
        Err(e) => {
            warn!(
                item_id = %item.item_id,
                transfer = %item.transfer_reference,
                error = %e,
                "Owning transfer unavailable, leaving queue item for next sweep"
            );
            return;
        }
    }

    if item.is_exhausted() {
        // Exhausted before this sweep (e.g. crash between increment and
        // status flip): finalize without attempting the call.
        if let Err(e) = finalize_exhausted(store, &mut item) {
            warn!(item_id = %item.item_id, error = %e, "Failed to finalize exhausted item");
        }
        return;
    }

    match attempt_fee_transfer(state, &item).await {
        Ok(fee_tx_id) => {
            if let Err(e) = apply_attempt_success(store, &item, &fee_tx_id) {
                warn!(item_id = %item.item_id, error = %e, "Failed to record fee collection");
            } else {
                info!(
                    item_id = %item.item_id,
                    transfer = %item.transfer_reference,
                    fee_tx_id = %fee_tx_id,
                    "Fee collection repaired"
                );
            }
        }
        Err(error) => {
            warn!(
                item_id = %item.item_id,
                transfer = %item.transfer_reference,
                error = %error,
                "Fee retry attempt failed"
            );
            if let Err(e) = apply_attempt_failure(store, &mut item, error) {
                warn!(item_id = %item.item_id, error = %e, "Failed to record retry failure");
            }
        }
    }
}

/// Execute the fee transfer call with a fresh token and credential.
async fn attempt_fee_transfer(state: &AppState, item: &FeeRetryItem) -> Result<String, String> {
    let sealed = state
        .sealer
        .seal()
        .await
        .map_err(|e| format!("credential sealing failed: {e}"))?;
    let idempotency_key = Uuid::new_v4().to_string();

    let body = transfer_body(
        &item.wallet_id,
        &item.collection_address,
        &format_usdc(item.fee_micro),
        item.chain,
    );

    state
        .gateway
        .post(TRANSFER_PATH, &body, &idempotency_key, &sealed)
        .await
        .and_then(|response| parse_accepted(&response))
        .map(|accepted| accepted.id)
        .map_err(|e| e.to_string())
}

/// Record a successful retry: update the owning transfer, index the new fee
/// leg, and delete the queue item.
fn apply_attempt_success(
    store: &RecordStore,
    item: &FeeRetryItem,
    fee_tx_id: &str,
) -> StorageResult<()> {
    let transfers = TransferRepository::new(store);
    let mut transfer = transfers.get(&item.transfer_reference)?;
    transfer.mark_fee_collected(fee_tx_id.to_string());
    transfers.update(&transfer)?;

    let legs = LegIndexRepository::new(store);
    legs.register(fee_tx_id, &LegRef::Fee(item.transfer_reference.clone()))?;

    let repo = FeeRetryRepository::new(store);
    repo.delete(&item.item_id)
}

/// Record a failed attempt; finalizes the item in the same sweep when this
/// attempt exhausted the retry budget. Returns whether the item is now
/// exhausted.
fn apply_attempt_failure(
    store: &RecordStore,
    item: &mut FeeRetryItem,
    error: String,
) -> StorageResult<bool> {
    item.record_failure(error);

    let exhausted = item.is_exhausted();
    if exhausted {
        item.mark_failed();
        raise_exhaustion_alert(store, item)?;
    }

    let repo = FeeRetryRepository::new(store);
    repo.update(item)?;
    Ok(exhausted)
}

/// Flip an already-exhausted item to `FAILED` and escalate.
fn finalize_exhausted(store: &RecordStore, item: &mut FeeRetryItem) -> StorageResult<()> {
    if item.status == FeeRetryStatus::Failed {
        return Ok(());
    }
    item.mark_failed();
    raise_exhaustion_alert(store, item)?;
    let repo = FeeRetryRepository::new(store);
    repo.update(item)
}

fn raise_exhaustion_alert(store: &RecordStore, item: &FeeRetryItem) -> StorageResult<()> {
    let alerts = AlertRepository::new(store);
    alerts.raise(
        &AlertEvent::new(AlertType::FeeRetryExhausted, &item.item_id).with_details(
            serde_json::json!({
                "transfer_reference": item.transfer_reference,
                "retry_count": item.retry_count,
                "last_error": item.last_error,
            }),
        ),
    )
}

/// Operator-initiated retry: reset the item's budget and attempt once,
/// synchronously reporting the outcome.
pub async fn manual_retry(state: &AppState, item_id: &str) -> StorageResult<ManualRetryResult> {
    let store = &state.store;
    let repo = FeeRetryRepository::new(store);
    let mut item = repo.get(item_id)?;

    item.reset();
    repo.update(&item)?;

    match attempt_fee_transfer(state, &item).await {
        Ok(fee_tx_id) => {
            apply_attempt_success(store, &item, &fee_tx_id)?;
            Ok(ManualRetryResult {
                success: true,
                error: None,
            })
        }
        Err(error) => {
            item.record_failure(error.clone());
            repo.update(&item)?;
            Ok(ManualRetryResult {
                success: false,
                error: Some(error),
            })
        }
    }
}
