// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! # Shared Domain Models
//!
//! Chain identifiers, CCTP domain mapping, and USDC amount handling used
//! across the API and orchestration layers.
//!
//! ## Amounts
//!
//! USDC amounts are carried internally as `u64` micro-units (6 decimals) and
//! exposed on the wire as human-readable decimal strings. Parsing rejects
//! negative, zero, and over-precise values before any provider call.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// USDC has 6 decimal places; 1 USDC = 1_000_000 micro-units.
pub const USDC_DECIMALS: u32 = 6;
const MICRO_PER_UNIT: u64 = 1_000_000;

/// Deployment environment selecting the supported-chain allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEnv {
    Testnet,
    Mainnet,
}

impl NetworkEnv {
    /// Parse from the `NETWORK_ENV` environment variable value.
    pub fn from_str_or_default(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("mainnet") => NetworkEnv::Mainnet,
            _ => NetworkEnv::Testnet,
        }
    }

    /// Chains supported in this environment.
    pub fn supported_chains(&self) -> &'static [Chain] {
        match self {
            NetworkEnv::Mainnet => &[
                Chain::Eth,
                Chain::Avax,
                Chain::Op,
                Chain::Arb,
                Chain::Base,
                Chain::Matic,
            ],
            NetworkEnv::Testnet => &[
                Chain::EthSepolia,
                Chain::AvaxFuji,
                Chain::OpSepolia,
                Chain::ArbSepolia,
                Chain::BaseSepolia,
                Chain::MaticAmoy,
            ],
        }
    }

    /// Whether the given chain is on this environment's allowlist.
    pub fn supports(&self, chain: Chain) -> bool {
        self.supported_chains().contains(&chain)
    }
}

/// A blockchain the custody provider can address.
///
/// Testnet variants share the CCTP domain identifier of their mainnet
/// counterpart; the environment allowlist keeps the two sets apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Chain {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "AVAX")]
    Avax,
    #[serde(rename = "OP")]
    Op,
    #[serde(rename = "ARB")]
    Arb,
    #[serde(rename = "BASE")]
    Base,
    #[serde(rename = "MATIC")]
    Matic,
    #[serde(rename = "ETH-SEPOLIA")]
    EthSepolia,
    #[serde(rename = "AVAX-FUJI")]
    AvaxFuji,
    #[serde(rename = "OP-SEPOLIA")]
    OpSepolia,
    #[serde(rename = "ARB-SEPOLIA")]
    ArbSepolia,
    #[serde(rename = "BASE-SEPOLIA")]
    BaseSepolia,
    #[serde(rename = "MATIC-AMOY")]
    MaticAmoy,
}

impl Chain {
    /// Provider-facing chain identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Avax => "AVAX",
            Chain::Op => "OP",
            Chain::Arb => "ARB",
            Chain::Base => "BASE",
            Chain::Matic => "MATIC",
            Chain::EthSepolia => "ETH-SEPOLIA",
            Chain::AvaxFuji => "AVAX-FUJI",
            Chain::OpSepolia => "OP-SEPOLIA",
            Chain::ArbSepolia => "ARB-SEPOLIA",
            Chain::BaseSepolia => "BASE-SEPOLIA",
            Chain::MaticAmoy => "MATIC-AMOY",
        }
    }

    /// Parse a provider-facing chain identifier.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ETH" => Some(Chain::Eth),
            "AVAX" => Some(Chain::Avax),
            "OP" => Some(Chain::Op),
            "ARB" => Some(Chain::Arb),
            "BASE" => Some(Chain::Base),
            "MATIC" => Some(Chain::Matic),
            "ETH-SEPOLIA" => Some(Chain::EthSepolia),
            "AVAX-FUJI" => Some(Chain::AvaxFuji),
            "OP-SEPOLIA" => Some(Chain::OpSepolia),
            "ARB-SEPOLIA" => Some(Chain::ArbSepolia),
            "BASE-SEPOLIA" => Some(Chain::BaseSepolia),
            "MATIC-AMOY" => Some(Chain::MaticAmoy),
            _ => None,
        }
    }

    /// CCTP domain identifier used to address burn/mint legs.
    pub fn domain_id(&self) -> u32 {
        match self {
            Chain::Eth | Chain::EthSepolia => 0,
            Chain::Avax | Chain::AvaxFuji => 1,
            Chain::Op | Chain::OpSepolia => 2,
            Chain::Arb | Chain::ArbSepolia => 3,
            Chain::Base | Chain::BaseSepolia => 6,
            Chain::Matic | Chain::MaticAmoy => 7,
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cross-chain transfer speed class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferSpeed {
    Standard,
    Fast,
}

impl TransferSpeed {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STANDARD" => Some(TransferSpeed::Standard),
            "FAST" => Some(TransferSpeed::Fast),
            _ => None,
        }
    }
}

/// Parse a human-readable USDC amount into micro-units.
///
/// Returns the normalized decimal string and the micro-unit value. Rejects
/// empty input, non-digits, more than 6 decimal places, zero, and overflow.
pub fn parse_usdc(amount: &str) -> Result<(String, u64), String> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err("amount must be a valid positive number".to_string());
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 {
        return Err("amount must be a valid positive number".to_string());
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err("amount must be a valid positive number".to_string());
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| "amount is too large".to_string())?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) {
        return Err("amount must be a valid positive number".to_string());
    }
    if fraction_part.len() > USDC_DECIMALS as usize {
        return Err("amount must have at most 6 decimal places".to_string());
    }

    let fraction = if fraction_part.is_empty() {
        0
    } else {
        let scale = 10u64.pow(USDC_DECIMALS - fraction_part.len() as u32);
        fraction_part
            .parse::<u64>()
            .map_err(|_| "amount must be a valid positive number".to_string())?
            * scale
    };

    let micro = whole
        .checked_mul(MICRO_PER_UNIT)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| "amount is too large".to_string())?;

    if micro == 0 {
        return Err("amount must be a valid positive number".to_string());
    }

    Ok((format_usdc(micro), micro))
}

/// Format micro-units as a decimal string, trimming trailing zeros but
/// keeping at least two decimal places.
pub fn format_usdc(micro: u64) -> String {
    let whole = micro / MICRO_PER_UNIT;
    let fraction = micro % MICRO_PER_UNIT;
    let mut fraction_str = format!("{fraction:06}");
    while fraction_str.len() > 2 && fraction_str.ends_with('0') {
        fraction_str.pop();
    }
    format!("{whole}.{fraction_str}")
}
