// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Transfer orchestration endpoints.
//!
//! `POST /v1/transfers` decomposes into two provider calls: the primary
//! transfer and a best-effort fee leg. The fee leg runs with its own
//! idempotency token and sealed credential, and its failure never undoes or
//! fails the primary transfer — it is logged and handed to the fee retry
//! queue instead.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ApiError,
    fees::FeeQuote,
    models::{format_usdc, parse_usdc, Chain},
    providers::{parse_accepted, transfer_body, TRANSFER_PATH},
    state::AppState,
    storage::{
        FeeRetryItem, FeeRetryRepository, LegIndexRepository, LegRef, StoredTransfer,
        TransferRepository, TransferState,
    },
};

const FEE_LEVELS: [&str; 3] = ["LOW", "MEDIUM", "HIGH"];

/// Request body for creating a transfer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTransferRequest {
    /// Source custodial wallet id.
    pub wallet_id: String,
    /// Destination address (0x + 40 hex chars).
    pub destination: String,
    /// Amount in USDC decimal string (e.g. "50.25").
    pub amount: String,
    /// Chain identifier (e.g. "BASE-SEPOLIA").
    pub chain: String,
    /// Optional gas fee level: LOW, MEDIUM, or HIGH.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_level: Option<String>,
}

/// Transfer response returned to clients.
///
/// Only the internal reference identifies the transfer externally; provider
/// transaction ids are never exposed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResponse {
    /// Internal transfer reference.
    pub reference: String,
    /// Current state.
    pub state: TransferState,
    /// Source wallet.
    pub wallet_id: String,
    /// Destination address.
    pub destination: String,
    /// Transfer amount.
    pub amount: String,
    /// Chain identifier.
    pub chain: Chain,
    /// Computed service fee.
    pub fee: String,
    /// Whether the fee leg has been submitted successfully.
    pub fee_collected: bool,
    /// On-chain transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Block number, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}

/// List response for transfers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferListResponse {
    /// Transfers, newest first.
    pub transfers: Vec<TransferResponse>,
    /// Total count after the limit was applied.
    pub total: usize,
}

/// Query parameters for the transfer list.
#[derive(Debug, Deserialize, IntoParams)]
pub struct TransferListQuery {
    /// Maximum number of results (default: 50).
    #[param(default = 50)]
    pub limit: Option<usize>,
}

/// Validate an EVM destination address.
fn validate_address(address: &str) -> Result<(), ApiError> {
    if !address.starts_with("0x") {
        return Err(ApiError::bad_request("Address must start with 0x"));
    }
    if address.len() != 42 {
        return Err(ApiError::bad_request(
            "Address must be 42 characters (0x + 40 hex)",
        ));
    }
    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::bad_request(
            "Address must contain only hex characters",
        ));
    }
    Ok(())
}

/// Resolve and validate the requested chain against the environment.
fn resolve_chain(state: &AppState, raw: &str) -> Result<Chain, ApiError> {
    let chain = Chain::parse(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown chain `{raw}`")))?;
    if !state.env.supports(chain) {
        return Err(ApiError::bad_request(format!(
            "Chain {chain} is not supported in this environment"
        )));
    }
    Ok(chain)
}

/// Resolve the optional gas fee level.
fn resolve_fee_level(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(level) => {
            let upper = level.to_ascii_uppercase();
            if FEE_LEVELS.contains(&upper.as_str()) {
                Ok(Some(upper))
            } else {
                Err(ApiError::bad_request(format!(
                    "Unsupported fee level `{level}`. Supported: LOW, MEDIUM, HIGH"
                )))
            }
        }
    }
}

/// Check the live balance against amount plus the computed fee.
fn ensure_sufficient_balance(
    balance_micro: u64,
    amount_micro: u64,
    fee_micro: u64,
) -> Result<(), ApiError> {
    let required = amount_micro
        .checked_add(fee_micro)
        .ok_or_else(|| ApiError::bad_request("amount is too large"))?;
    if balance_micro < required {
        return Err(ApiError::unprocessable(format!(
            "Insufficient balance: required {} (amount {} + fee {}), available {}",
            format_usdc(required),
            format_usdc(amount_micro),
            format_usdc(fee_micro),
            format_usdc(balance_micro),
        )));
    }
    Ok(())
}

fn to_response(record: &StoredTransfer) -> TransferResponse {
    TransferResponse {
        reference: record.reference.clone(),
        state: record.state,
        wallet_id: record.wallet_id.clone(),
        destination: record.destination.clone(),
        amount: record.amount.clone(),
        chain: record.chain,
        fee: format_usdc(record.fee_micro),
        fee_collected: record.fee_collected,
        tx_hash: record.tx_hash.clone(),
        block_number: record.block_number,
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

/// Attempt the best-effort fee leg; failure enqueues a retry item.
///
/// Never propagates an error to the caller: the primary transfer's outcome
/// is already decided when this runs.
async fn collect_fee(state: &AppState, record: &mut StoredTransfer, quote: &FeeQuote) {
    let Some(collection_address) = quote.collection_address.as_deref() else {
        if quote.fee_micro > 0 {
            info!(
                reference = %record.reference,
                chain = %record.chain,
                "No collection wallet configured for chain, skipping fee collection"
            );
        }
        return;
    };

    let attempt = async {
        let sealed = state
            .sealer
            .seal()
            .await
            .map_err(|e| format!("credential sealing failed: {e}"))?;
        // Independent idempotency token: the fee leg is its own provider
        // transaction, never folded into the primary call.
        let idempotency_key = Uuid::new_v4().to_string();
        let body = transfer_body(
            &record.wallet_id,
            collection_address,
            &format_usdc(quote.fee_micro),
            record.chain,
        );
        state
            .gateway
            .post(TRANSFER_PATH, &body, &idempotency_key, &sealed)
            .await
            .and_then(|response| parse_accepted(&response))
            .map_err(|e| e.to_string())
    };

    match attempt.await {
        Ok(accepted) => {
            record.mark_fee_collected(accepted.id.clone());

            let legs = LegIndexRepository::new(&state.store);
            if let Err(e) = legs.register(&accepted.id, &LegRef::Fee(record.reference.clone())) {
                warn!(reference = %record.reference, error = %e, "Failed to index fee leg");
            }
        }
        Err(error) => {
            warn!(
                reference = %record.reference,
                error = %error,
                "Fee collection failed, queueing for retry"
            );
            let item = FeeRetryItem::new_pending(
                record.reference.clone(),
                record.wallet_id.clone(),
                quote.fee_micro,
                collection_address.to_string(),
                record.chain,
                error,
            );
            let repo = FeeRetryRepository::new(&state.store);
            if let Err(e) = repo.create(&item) {
                warn!(reference = %record.reference, error = %e, "Failed to enqueue fee retry item");
            }
        }
    }
}

/// Create a transfer.
///
/// Executes the primary provider call and, on success, a best-effort fee
/// collection call with an independent idempotency token.
#[utoipa::path(
    post,
    path = "/v1/transfers",
    tag = "Transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 201, description = "Transfer created", body = TransferResponse),
        (status = 400, description = "Invalid request"),
        (status = 422, description = "Insufficient balance or provider rejection"),
        (status = 502, description = "Custody provider unavailable")
    )
)]
pub async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let chain = resolve_chain(&state, &request.chain)?;
    validate_address(&request.destination)?;
    let (normalized_amount, amount_micro) =
        parse_usdc(&request.amount).map_err(ApiError::bad_request)?;
    let fee_level = resolve_fee_level(request.fee_level.as_deref())?;

    let quote = state.fees.quote(&state.store, chain, amount_micro);

    // Live balance read; must cover the amount plus the computed fee.
    let balance_micro = state
        .gateway
        .usdc_balance(&request.wallet_id, chain)
        .await
        .map_err(ApiError::from_provider)?;
    ensure_sufficient_balance(balance_micro, amount_micro, quote.fee_micro)?;

    // Primary leg: fresh sealed credential, fresh idempotency token.
    let sealed = state
        .sealer
        .seal()
        .await
        .map_err(|e| ApiError::service_unavailable(format!("credential sealing failed: {e}")))?;
    let idempotency_key = Uuid::new_v4().to_string();

    let mut body = transfer_body(&request.wallet_id, &request.destination, &normalized_amount, chain);
    if let Some(level) = fee_level {
        if let Some(object) = body.as_object_mut() {
            object.insert("feeLevel".to_string(), Value::String(level));
        }
    }

    let accepted = state
        .gateway
        .post(TRANSFER_PATH, &body, &idempotency_key, &sealed)
        .await
        .and_then(|response| parse_accepted(&response))
        .map_err(ApiError::from_provider)?;

    let reference = format!("tr-{}", Uuid::new_v4());
    let mut record = StoredTransfer::new_initiated(
        reference,
        request.wallet_id,
        request.destination,
        amount_micro,
        normalized_amount,
        chain,
        "USDC".to_string(),
        quote.fee_micro,
    );
    record.provider_tx_id = Some(accepted.id.clone());
    if let Some(initial) = TransferState::from_provider(&accepted.state) {
        record.state = initial;
    }

    let repo = TransferRepository::new(&state.store);
    repo.create(&record)
        .map_err(|e| ApiError::internal(format!("Failed to store transfer: {e}")))?;

    let legs = LegIndexRepository::new(&state.store);
    if let Err(e) = legs.register(&accepted.id, &LegRef::Primary(record.reference.clone())) {
        warn!(reference = %record.reference, error = %e, "Failed to index primary leg");
    }

    // Fee leg: best effort, isolated from the primary outcome.
    if quote.fee_micro > 0 {
        collect_fee(&state, &mut record, &quote).await;
        if let Err(e) = repo.update(&record) {
            warn!(reference = %record.reference, error = %e, "Failed to persist fee leg outcome");
        }
    }

    info!(
        reference = %record.reference,
        chain = %chain,
        fee_collected = record.fee_collected,
        "Transfer created"
    );

    Ok((StatusCode::CREATED, Json(to_response(&record))))
}

/// List transfers, newest first.
#[utoipa::path(
    get,
    path = "/v1/transfers",
    tag = "Transfers",
    params(TransferListQuery),
    responses(
        (status = 200, description = "Transfer list", body = TransferListResponse)
    )
)]
pub async fn list_transfers(
    State(state): State<AppState>,
    Query(query): Query<TransferListQuery>,
) -> Result<Json<TransferListResponse>, ApiError> {
    let repo = TransferRepository::new(&state.store);
    let mut transfers = repo
        .list()
        .map_err(|e| ApiError::internal(format!("Failed to list transfers: {e}")))?;

    let limit = query.limit.unwrap_or(50);
    transfers.truncate(limit);

    let mapped: Vec<TransferResponse> = transfers.iter().map(to_response).collect();
    Ok(Json(TransferListResponse {
        total: mapped.len(),
        transfers: mapped,
    }))
}

/// Get a transfer by its reference.
#[utoipa::path(
    get,
    path = "/v1/transfers/{reference}",
    tag = "Transfers",
    params(
        ("reference" = String, Path, description = "Transfer reference")
    ),
    responses(
        (status = 200, description = "Transfer details", body = TransferResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<TransferResponse>, ApiError> {
    let repo = TransferRepository::new(&state.store);
    let record = repo
        .get(&reference)
        .map_err(|_| ApiError::not_found("Transfer not found"))?;
    Ok(Json(to_response(&record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation_accepts_checksummed_addresses() {
        validate_address("0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12").unwrap();
    }

    #[test]
    fn address_validation_rejects_malformed_input() {
        assert!(validate_address("742d35Cc6634C0532925a3b844Bc9e7595f4aB12").is_err());
        assert!(validate_address("0x742d").is_err());
        assert!(validate_address("0xZZZd35Cc6634C0532925a3b844Bc9e7595f4aB12").is_err());
    }

    #[test]
    fn balance_check_includes_fee() {
        // 100 USDC balance, 50 USDC transfer, 0.25 fee: proceeds.
        ensure_sufficient_balance(100_000_000, 50_000_000, 250_000).unwrap();

        // Balance covers the amount but not amount + fee: rejected.
        let err = ensure_sufficient_balance(50_100_000, 50_000_000, 250_000).unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.contains("50.25"));
    }

    #[test]
    fn fee_level_is_normalized_and_validated() {
        assert_eq!(resolve_fee_level(None).unwrap(), None);
        assert_eq!(
            resolve_fee_level(Some("medium")).unwrap(),
            Some("MEDIUM".to_string())
        );
        assert!(resolve_fee_level(Some("TURBO")).is_err());
    }
}
