// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Operator endpoints for the fee retry queue.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    fee_retry,
    models::format_usdc,
    state::AppState,
    storage::{FeeRetryItem, FeeRetryRepository, FeeRetryStatus},
};

/// Fee retry queue item as exposed to operators.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeeRetryItemResponse {
    pub item_id: String,
    pub transfer_reference: String,
    pub fee: String,
    pub status: FeeRetryStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// List response for the fee retry queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeeRetryListResponse {
    pub items: Vec<FeeRetryItemResponse>,
    pub total: usize,
}

/// Result of a manual retry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManualRetryResponse {
    pub item_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn to_response(item: &FeeRetryItem) -> FeeRetryItemResponse {
    FeeRetryItemResponse {
        item_id: item.item_id.clone(),
        transfer_reference: item.transfer_reference.clone(),
        fee: format_usdc(item.fee_micro),
        status: item.status,
        retry_count: item.retry_count,
        last_error: item.last_error.clone(),
        created_at: item.created_at.to_rfc3339(),
        updated_at: item.updated_at.to_rfc3339(),
    }
}

/// List fee retry queue items, oldest first.
#[utoipa::path(
    get,
    path = "/v1/ops/fee-retries",
    tag = "Operations",
    responses(
        (status = 200, description = "Fee retry queue", body = FeeRetryListResponse)
    )
)]
pub async fn list_fee_retries(
    State(state): State<AppState>,
) -> Result<Json<FeeRetryListResponse>, ApiError> {
    let repo = FeeRetryRepository::new(&state.store);
    let items = repo
        .list()
        .map_err(|e| ApiError::internal(format!("Failed to list fee retry queue: {e}")))?;

    let mapped: Vec<FeeRetryItemResponse> = items.iter().map(to_response).collect();
    Ok(Json(FeeRetryListResponse {
        total: mapped.len(),
        items: mapped,
    }))
}

/// Manually retry a fee collection.
///
/// Resets the item's retry budget and attempts once, synchronously
/// returning the outcome to the operator.
#[utoipa::path(
    post,
    path = "/v1/ops/fee-retries/{item_id}/retry",
    tag = "Operations",
    params(
        ("item_id" = String, Path, description = "Fee retry queue item id")
    ),
    responses(
        (status = 200, description = "Retry attempted", body = ManualRetryResponse),
        (status = 404, description = "Item not found")
    )
)]
pub async fn retry_fee_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<ManualRetryResponse>, ApiError> {
    let result = fee_retry::manual_retry(&state, &item_id)
        .await
        .map_err(|e| match e {
            crate::storage::StorageError::NotFound(_) => {
                ApiError::not_found("Fee retry item not found")
            }
            other => ApiError::internal(format!("Manual retry failed: {other}")),
        })?;

    Ok(Json(ManualRetryResponse {
        item_id,
        success: result.success,
        error: result.error,
    }))
}
