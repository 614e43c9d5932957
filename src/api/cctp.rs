// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Cross-chain (CCTP) transfer endpoints.
//!
//! Request-time work stops at the burn call: the record is persisted in
//! `BURN_PENDING` and every later leg (burn confirmation, attestation, mint)
//! is advanced exclusively by the webhook reconciler. This component never
//! polls the provider.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{format_usdc, parse_usdc, Chain, NetworkEnv, TransferSpeed},
    providers::{parse_accepted, CCTP_BURN_PATH},
    state::AppState,
    storage::{CctpRepository, CctpState, LegIndexRepository, LegRef, StoredCctpTransfer},
};

/// Flat per-source-chain gas estimate for the burn + mint pair, micro-USDC.
fn gas_estimate_micro(source: Chain) -> u64 {
    match source {
        Chain::Eth | Chain::EthSepolia => 2_500_000,
        Chain::Avax | Chain::AvaxFuji => 150_000,
        Chain::Op | Chain::OpSepolia => 80_000,
        Chain::Arb | Chain::ArbSepolia => 100_000,
        Chain::Base | Chain::BaseSepolia => 50_000,
        Chain::Matic | Chain::MaticAmoy => 40_000,
    }
}

/// Additional attestation-service fee for the fast speed class, micro-USDC.
const FAST_ATTESTATION_FEE_MICRO: u64 = 100_000;

/// Request body for creating a cross-chain transfer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCctpRequest {
    /// End user requesting the transfer.
    pub user_id: String,
    /// Source custodial wallet id.
    pub wallet_id: String,
    /// Source chain identifier.
    pub source_chain: String,
    /// Destination chain identifier.
    pub destination_chain: String,
    /// Destination address on the destination chain.
    pub destination: String,
    /// Amount in USDC decimal string.
    pub amount: String,
    /// Transfer speed: STANDARD (default) or FAST.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
}

/// Cross-chain transfer response returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CctpTransferResponse {
    /// Internal transfer reference.
    pub reference: String,
    /// Current state.
    pub state: CctpState,
    /// Source chain.
    pub source_chain: Chain,
    /// Destination chain.
    pub destination_chain: Chain,
    /// Destination address.
    pub destination: String,
    /// Transfer amount.
    pub amount: String,
    /// Speed class.
    pub speed: TransferSpeed,
    /// Burn transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_tx_hash: Option<String>,
    /// Attestation hash, once received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_hash: Option<String>,
    /// Mint transaction hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_tx_hash: Option<String>,
    /// Creation time.
    pub created_at: String,
    /// Last update time.
    pub updated_at: String,
}

/// List response for cross-chain transfers.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CctpListResponse {
    pub transfers: Vec<CctpTransferResponse>,
    pub total: usize,
}

/// Query parameters for the fee estimate.
#[derive(Debug, Deserialize, IntoParams)]
pub struct EstimateQuery {
    /// Source chain identifier.
    pub source: String,
    /// Destination chain identifier.
    pub destination: String,
    /// Transfer speed: STANDARD (default) or FAST.
    pub speed: Option<String>,
}

/// Fee estimate for a cross-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CctpFeeEstimate {
    /// Source chain gas estimate.
    pub gas_fee: String,
    /// Attestation-service fee (zero for the standard speed class).
    pub attestation_fee: String,
    /// Total estimated fee.
    pub total_fee: String,
    /// Human-readable completion estimate.
    pub eta: String,
}

/// Validate a chain pair for the environment and return the parsed pair.
///
/// Both chains must be on the environment's allowlist and must map to
/// different CCTP domain identifiers.
fn validate_chain_pair(
    env: NetworkEnv,
    source_raw: &str,
    destination_raw: &str,
) -> Result<(Chain, Chain), ApiError> {
    let source = Chain::parse(source_raw)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown source chain `{source_raw}`")))?;
    let destination = Chain::parse(destination_raw).ok_or_else(|| {
        ApiError::bad_request(format!("Unknown destination chain `{destination_raw}`"))
    })?;

    if !env.supports(source) {
        return Err(ApiError::bad_request(format!(
            "Source chain {source} is not supported in this environment"
        )));
    }
    if !env.supports(destination) {
        return Err(ApiError::bad_request(format!(
            "Destination chain {destination} is not supported in this environment"
        )));
    }
    if source.domain_id() == destination.domain_id() {
        return Err(ApiError::bad_request(
            "Source and destination chains must differ",
        ));
    }

    Ok((source, destination))
}

/// Pure fee estimate: no I/O, no storage.
pub fn estimate_fee(
    env: NetworkEnv,
    source_raw: &str,
    destination_raw: &str,
    speed: TransferSpeed,
) -> Result<CctpFeeEstimate, ApiError> {
    let (source, _destination) = validate_chain_pair(env, source_raw, destination_raw)?;

    let gas_micro = gas_estimate_micro(source);
    let attestation_micro = match speed {
        TransferSpeed::Fast => FAST_ATTESTATION_FEE_MICRO,
        TransferSpeed::Standard => 0,
    };

    // Standard speed waits for hard finality before attestation; the fast
    // class uses the expedited attestation path.
    let eta = match speed {
        TransferSpeed::Standard => "~15-20 minutes",
        TransferSpeed::Fast => "~2-5 minutes",
    };

    Ok(CctpFeeEstimate {
        gas_fee: format_usdc(gas_micro),
        attestation_fee: format_usdc(attestation_micro),
        total_fee: format_usdc(gas_micro + attestation_micro),
        eta: eta.to_string(),
    })
}

fn resolve_speed(raw: Option<&str>) -> Result<TransferSpeed, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(TransferSpeed::Standard),
        Some(value) => TransferSpeed::parse(value).ok_or_else(|| {
            ApiError::bad_request(format!(
                "Unsupported speed `{value}`. Supported: STANDARD, FAST"
            ))
        }),
    }
}

fn validate_address(address: &str) -> Result<(), ApiError> {
    if !address.starts_with("0x")
        || address.len() != 42
        || !address[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ApiError::bad_request(
            "Destination must be a 0x-prefixed 40-hex-character address",
        ));
    }
    Ok(())
}

fn to_response(record: &StoredCctpTransfer) -> CctpTransferResponse {
    CctpTransferResponse {
        reference: record.reference.clone(),
        state: record.state,
        source_chain: record.source_chain,
        destination_chain: record.destination_chain,
        destination: record.destination.clone(),
        amount: record.amount.clone(),
        speed: record.speed,
        burn_tx_hash: record.burn_tx_hash.clone(),
        attestation_hash: record.attestation_hash.clone(),
        mint_tx_hash: record.mint_tx_hash.clone(),
        created_at: record.created_at.to_rfc3339(),
        updated_at: record.updated_at.to_rfc3339(),
    }
}

/// Create a cross-chain transfer.
///
/// Validates the chain pair and live balance, initiates the burn leg, and
/// persists the record. All later progress arrives via webhooks.
#[utoipa::path(
    post,
    path = "/v1/cctp/transfers",
    tag = "CCTP",
    request_body = CreateCctpRequest,
    responses(
        (status = 201, description = "Cross-chain transfer created", body = CctpTransferResponse),
        (status = 400, description = "Invalid request"),
        (status = 422, description = "Insufficient balance or provider rejection"),
        (status = 502, description = "Custody provider unavailable")
    )
)]
pub async fn create_cctp_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateCctpRequest>,
) -> Result<(StatusCode, Json<CctpTransferResponse>), ApiError> {
    let (source, destination_chain) =
        validate_chain_pair(state.env, &request.source_chain, &request.destination_chain)?;
    validate_address(&request.destination)?;
    let (normalized_amount, amount_micro) =
        parse_usdc(&request.amount).map_err(ApiError::bad_request)?;
    let speed = resolve_speed(request.speed.as_deref())?;

    // Live balance read, never a cached value: another withdrawal may be
    // racing this request.
    let balance_micro = state
        .gateway
        .usdc_balance(&request.wallet_id, source)
        .await
        .map_err(ApiError::from_provider)?;
    if balance_micro < amount_micro {
        return Err(ApiError::unprocessable(format!(
            "Insufficient balance: required {}, available {}",
            format_usdc(amount_micro),
            format_usdc(balance_micro),
        )));
    }

    let sealed = state
        .sealer
        .seal()
        .await
        .map_err(|e| ApiError::service_unavailable(format!("credential sealing failed: {e}")))?;
    let idempotency_key = Uuid::new_v4().to_string();

    let body = serde_json::json!({
        "walletId": request.wallet_id,
        "amount": normalized_amount,
        "tokenId": "USDC",
        "blockchain": source.as_str(),
        "sourceDomain": source.domain_id(),
        "destinationDomain": destination_chain.domain_id(),
        "destinationAddress": request.destination,
        "speed": speed,
    });

    let accepted = state
        .gateway
        .post(CCTP_BURN_PATH, &body, &idempotency_key, &sealed)
        .await
        .and_then(|response| parse_accepted(&response))
        .map_err(ApiError::from_provider)?;

    let reference = format!("xct-{}", Uuid::new_v4());
    let mut record = StoredCctpTransfer::new_initiated(
        reference,
        request.user_id,
        request.wallet_id,
        source,
        destination_chain,
        request.destination,
        amount_micro,
        normalized_amount,
        speed,
    );
    record.mark_burn_pending(accepted.id.clone());

    let repo = CctpRepository::new(&state.store);
    repo.create(&record)
        .map_err(|e| ApiError::internal(format!("Failed to store CCTP transfer: {e}")))?;

    let legs = LegIndexRepository::new(&state.store);
    if let Err(e) = legs.register(&accepted.id, &LegRef::CctpBurn(record.reference.clone())) {
        warn!(reference = %record.reference, error = %e, "Failed to index burn leg");
    }

    info!(
        reference = %record.reference,
        source = %source,
        destination = %destination_chain,
        speed = ?speed,
        "CCTP transfer initiated"
    );

    Ok((StatusCode::CREATED, Json(to_response(&record))))
}

/// Estimate the fee for a cross-chain transfer.
#[utoipa::path(
    get,
    path = "/v1/cctp/estimate",
    tag = "CCTP",
    params(EstimateQuery),
    responses(
        (status = 200, description = "Fee estimate", body = CctpFeeEstimate),
        (status = 400, description = "Invalid chain pair or speed")
    )
)]
pub async fn estimate_cctp_fee(
    State(state): State<AppState>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<CctpFeeEstimate>, ApiError> {
    let speed = resolve_speed(query.speed.as_deref())?;
    let estimate = estimate_fee(state.env, &query.source, &query.destination, speed)?;
    Ok(Json(estimate))
}

/// Cancel a cross-chain transfer.
///
/// Allowed only while the record is in a cancellable pre-confirmation state;
/// an already-submitted burn is never reversed, only its consequence marked.
#[utoipa::path(
    post,
    path = "/v1/cctp/transfers/{reference}/cancel",
    tag = "CCTP",
    params(
        ("reference" = String, Path, description = "Transfer reference")
    ),
    responses(
        (status = 200, description = "Transfer cancelled", body = CctpTransferResponse),
        (status = 404, description = "Not found"),
        (status = 409, description = "No longer cancellable")
    )
)]
pub async fn cancel_cctp_transfer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<CctpTransferResponse>, ApiError> {
    let repo = CctpRepository::new(&state.store);
    let mut record = repo
        .get(&reference)
        .map_err(|_| ApiError::not_found("Cross-chain transfer not found"))?;

    if !record.state.is_cancellable() {
        return Err(ApiError::conflict(format!(
            "Transfer in state {:?} can no longer be cancelled",
            record.state
        )));
    }

    record.mark_cancelled();
    repo.update(&record)
        .map_err(|e| ApiError::internal(format!("Failed to persist cancellation: {e}")))?;

    info!(reference = %reference, "CCTP transfer cancelled");
    Ok(Json(to_response(&record)))
}

/// List cross-chain transfers, newest first.
#[utoipa::path(
    get,
    path = "/v1/cctp/transfers",
    tag = "CCTP",
    responses(
        (status = 200, description = "Cross-chain transfer list", body = CctpListResponse)
    )
)]
pub async fn list_cctp_transfers(
    State(state): State<AppState>,
) -> Result<Json<CctpListResponse>, ApiError> {
    let repo = CctpRepository::new(&state.store);
    let transfers = repo
        .list()
        .map_err(|e| ApiError::internal(format!("Failed to list CCTP transfers: {e}")))?;

    let mapped: Vec<CctpTransferResponse> = transfers.iter().map(to_response).collect();
    Ok(Json(CctpListResponse {
        total: mapped.len(),
        transfers: mapped,
    }))
}

/// Get a cross-chain transfer by its reference.
#[utoipa::path(
    get,
    path = "/v1/cctp/transfers/{reference}",
    tag = "CCTP",
    params(
        ("reference" = String, Path, description = "Transfer reference")
    ),
    responses(
        (status = 200, description = "Cross-chain transfer details", body = CctpTransferResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_cctp_transfer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<CctpTransferResponse>, ApiError> {
    let repo = CctpRepository::new(&state.store);
    let record = repo
        .get(&reference)
        .map_err(|_| ApiError::not_found("Cross-chain transfer not found"))?;
    Ok(Json(to_response(&record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_domain_pair_is_rejected_before_any_call() {
        // BASE and BASE-SEPOLIA share domain 6; a misconfigured pair inside
        // one environment must fail the domain check.
        let err = validate_chain_pair(NetworkEnv::Mainnet, "BASE", "BASE").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("must differ"));
    }

    #[test]
    fn cross_environment_chains_are_rejected() {
        let err = validate_chain_pair(NetworkEnv::Testnet, "BASE", "ETH-SEPOLIA").unwrap_err();
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn valid_pair_resolves_both_chains() {
        let (source, destination) =
            validate_chain_pair(NetworkEnv::Testnet, "BASE-SEPOLIA", "ETH-SEPOLIA").unwrap();
        assert_eq!(source, Chain::BaseSepolia);
        assert_eq!(destination, Chain::EthSepolia);
    }

    #[test]
    fn fast_speed_adds_attestation_fee() {
        let standard = estimate_fee(
            NetworkEnv::Testnet,
            "BASE-SEPOLIA",
            "ETH-SEPOLIA",
            TransferSpeed::Standard,
        )
        .unwrap();
        assert_eq!(standard.attestation_fee, "0.00");
        assert_eq!(standard.gas_fee, standard.total_fee);
        assert_eq!(standard.eta, "~15-20 minutes");

        let fast = estimate_fee(
            NetworkEnv::Testnet,
            "BASE-SEPOLIA",
            "ETH-SEPOLIA",
            TransferSpeed::Fast,
        )
        .unwrap();
        assert_eq!(fast.attestation_fee, "0.10");
        assert_eq!(fast.total_fee, "0.15");
        assert_eq!(fast.eta, "~2-5 minutes");
    }

    #[test]
    fn estimate_validates_chain_support() {
        assert!(estimate_fee(
            NetworkEnv::Mainnet,
            "BASE-SEPOLIA",
            "ETH",
            TransferSpeed::Standard
        )
        .is_err());
    }

    #[test]
    fn speed_defaults_to_standard() {
        assert_eq!(resolve_speed(None).unwrap(), TransferSpeed::Standard);
        assert_eq!(resolve_speed(Some("fast")).unwrap(), TransferSpeed::Fast);
        assert!(resolve_speed(Some("ludicrous")).is_err());
    }
}
