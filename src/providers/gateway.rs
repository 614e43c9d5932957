// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Custody provider gateway.
//!
//! Generic authenticated request/response client for the custody provider
//! that signs and broadcasts on-chain transactions for us. Provider error
//! codes are surfaced verbatim in [`ProviderError::Api`]; interpretation is
//! left to callers.
//!
//! Every mutating call carries a caller-supplied idempotency key and a fresh
//! sealed credential; neither is ever reused across calls.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::models::Chain;

const DEFAULT_API_BASE_URL: &str = "https://api.custody-sandbox.example.com";

/// Transaction transfer endpoint.
pub const TRANSFER_PATH: &str = "/v1/transactions/transfer";
/// CCTP burn endpoint.
pub const CCTP_BURN_PATH: &str = "/v1/transactions/cctp/burn";
/// CCTP mint endpoint.
pub const CCTP_MINT_PATH: &str = "/v1/transactions/cctp/mint";
/// Sealing public key endpoint.
pub const PUBLIC_KEY_PATH: &str = "/v1/config/public-key";

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider configuration missing: {0}")]
    MissingConfig(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned {status}{}: {message}", .code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),
}

/// Provider acknowledgement of a mutating transaction call.
#[derive(Debug, Clone)]
pub struct AcceptedTransaction {
    /// Provider transaction id.
    pub id: String,
    /// Initial provider state string.
    pub state: String,
}

/// Authenticated HTTP client for the custody provider.
#[derive(Debug, Clone)]
pub struct ProviderGateway {
    base_url: String,
    api_key: String,
    http: Client,
}

impl ProviderGateway {
    pub fn is_configured() -> bool {
        env_optional("PROVIDER_API_KEY").is_some()
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let base_url = env_or_default("PROVIDER_API_BASE_URL", DEFAULT_API_BASE_URL);
        let api_key = env_required("PROVIDER_API_KEY")?;
        Self::new(base_url, api_key)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
        })
    }

    /// Execute a mutating provider call.
    ///
    /// The idempotency key travels as a header; the sealed credential is
    /// injected into the JSON body. Both must be freshly generated per call.
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        idempotency_key: &str,
        sealed_credential: &str,
    ) -> Result<Value, ProviderError> {
        let mut payload = body.clone();
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "sealedCredential".to_string(),
                Value::String(sealed_credential.to_string()),
            );
        } else {
            return Err(ProviderError::InvalidResponse(
                "request body must be a JSON object".to_string(),
            ));
        }

        let response = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("POST {path} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("POST {path} body read failed: {e}")))?;

        if !status.is_success() {
            return Err(parse_api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("POST {path} invalid JSON: {e}")))
    }

    /// Execute a read-only provider call.
    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .bearer_auth(&self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("GET {path} failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(format!("GET {path} body read failed: {e}")))?;

        if !status.is_success() {
            return Err(parse_api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("GET {path} invalid JSON: {e}")))
    }

    /// Read a wallet's live USDC balance on a chain, in micro-units.
    ///
    /// Always a live provider read; callers must not cache the result across
    /// a balance check and the transfer it guards.
    pub async fn usdc_balance(
        &self,
        wallet_id: &str,
        chain: Chain,
    ) -> Result<u64, ProviderError> {
        let response = self
            .get(
                &format!("/v1/wallets/{wallet_id}/balances"),
                &[("chain", chain.as_str()), ("token", "USDC")],
            )
            .await?;
        parse_usdc_balance(&response)
    }

    /// Fetch the provider's current sealing public key (base64-encoded).
    pub async fn sealing_public_key(&self) -> Result<String, ProviderError> {
        let response = self.get(PUBLIC_KEY_PATH, &[]).await?;
        response
            .get("publicKey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing publicKey in response".to_string())
            })
    }
}

/// Build the request body for a plain or fee transfer call.
pub fn transfer_body(wallet_id: &str, destination: &str, amount: &str, chain: Chain) -> Value {
    json!({
        "walletId": wallet_id,
        "destinationAddress": destination,
        "amount": amount,
        "tokenId": "USDC",
        "blockchain": chain.as_str(),
    })
}

/// Parse the provider's acknowledgement of a mutating transaction call.
pub fn parse_accepted(response: &Value) -> Result<AcceptedTransaction, ProviderError> {
    let id = response
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing transaction id in response".to_string())
        })?
        .to_string();

    let state = response
        .get("state")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing transaction state in response".to_string())
        })?
        .to_string();

    Ok(AcceptedTransaction { id, state })
}

/// Parse a USDC balance from the provider's balance listing.
fn parse_usdc_balance(response: &Value) -> Result<u64, ProviderError> {
    let balances = response
        .get("balances")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing balances in response".to_string())
        })?;

    for entry in balances {
        let token = entry.get("token").and_then(Value::as_str).unwrap_or("");
        if token.eq_ignore_ascii_case("USDC") {
            let amount = entry.get("amount").and_then(Value::as_str).ok_or_else(|| {
                ProviderError::InvalidResponse("missing balance amount".to_string())
            })?;
            return crate::models::parse_usdc(amount)
                .map(|(_, micro)| micro)
                .or_else(|_| {
                    // A zero balance is valid but parse_usdc rejects zero amounts.
                    if amount.trim().chars().all(|c| c == '0' || c == '.') {
                        Ok(0)
                    } else {
                        Err(ProviderError::InvalidResponse(format!(
                            "unparseable balance amount: {amount}"
                        )))
                    }
                });
        }
    }

    Ok(0)
}

/// Map a non-2xx provider response onto [`ProviderError::Api`].
fn parse_api_error(status: u16, body: &str) -> ProviderError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    ProviderError::Api {
        status,
        code,
        message,
    }
}

fn env_required(name: &str) -> Result<String, ProviderError> {
    env_optional(name).ok_or_else(|| ProviderError::MissingConfig(name.to_string()))
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}
