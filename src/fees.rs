// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! # Fee Policy
//!
//! Pure service-fee calculation plus a TTL-bounded cache over the
//! operator-editable fee configuration file (`{DATA_DIR}/config/fees.json`).
//!
//! The configuration holds the fee rate (basis points), the minimum fee, and
//! the per-chain collection wallet mapping. A missing collection wallet for a
//! chain with a non-zero computed fee is a non-fatal condition: the transfer
//! proceeds and fee collection is skipped.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::models::{parse_usdc, Chain};
use crate::storage::RecordStore;

/// Default fee rate: 0.5%.
const DEFAULT_FEE_BPS: u64 = 50;

/// Default minimum fee: 0.0625 USDC.
const DEFAULT_MINIMUM_MICRO: u64 = 62_500;

/// Default configuration cache TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Fee policy for one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    /// Fee rate in basis points of the transfer amount.
    pub bps: u64,
    /// Minimum fee in micro-USDC.
    pub minimum_micro: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            bps: DEFAULT_FEE_BPS,
            minimum_micro: DEFAULT_MINIMUM_MICRO,
        }
    }
}

/// Computed fee for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeQuote {
    /// Fee amount in micro-USDC.
    pub fee_micro: u64,
    /// Collection wallet for the transfer's chain, when configured.
    pub collection_address: Option<String>,
}

/// Compute the service fee for an amount under a policy.
///
/// `fee = max(amount * bps / 10_000, minimum)`, in micro-units.
pub fn compute_fee(amount_micro: u64, policy: &FeePolicy) -> u64 {
    let proportional = (amount_micro as u128 * policy.bps as u128 / 10_000) as u64;
    proportional.max(policy.minimum_micro)
}

/// On-disk shape of the operator-editable fee configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeeConfigFile {
    #[serde(default = "default_bps")]
    fee_bps: u64,
    /// Minimum fee as a decimal USDC string.
    #[serde(default)]
    minimum_fee: Option<String>,
    /// Chain identifier → collection wallet address.
    #[serde(default)]
    collection_wallets: HashMap<String, String>,
}

fn default_bps() -> u64 {
    DEFAULT_FEE_BPS
}

struct CacheEntry {
    policy: FeePolicy,
    collection_address: Option<String>,
    loaded_at: Instant,
}

/// TTL-bounded, per-chain cache over the fee configuration file.
///
/// Reads are served from the cache while fresh; an expired entry is reloaded
/// inline (a single local file read) and, if the reload fails, the stale
/// value keeps serving rather than failing the transfer.
pub struct FeeConfigCache {
    cache: Mutex<LruCache<Chain, CacheEntry>>,
    ttl: Duration,
}

impl FeeConfigCache {
    /// Create a cache with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a cache with a custom TTL (useful for testing).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(16).expect("nonzero cache capacity"),
            )),
            ttl,
        }
    }

    /// Quote the fee for a transfer amount on a chain.
    pub fn quote(&self, store: &RecordStore, chain: Chain, amount_micro: u64) -> FeeQuote {
        let (policy, collection_address) = self.resolve(store, chain);
        FeeQuote {
            fee_micro: compute_fee(amount_micro, &policy),
            collection_address,
        }
    }

    /// Resolve the cached policy and collection wallet for a chain.
    fn resolve(&self, store: &RecordStore, chain: Chain) -> (FeePolicy, Option<String>) {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = cache.get(&chain) {
            if entry.loaded_at.elapsed() < self.ttl {
                return (entry.policy, entry.collection_address.clone());
            }
        }

        match load_for_chain(store, chain) {
            Ok((policy, collection_address)) => {
                cache.put(
                    chain,
                    CacheEntry {
                        policy,
                        collection_address: collection_address.clone(),
                        loaded_at: Instant::now(),
                    },
                );
                (policy, collection_address)
            }
            Err(e) => {
                // Keep serving the stale entry if one exists.
                if let Some(entry) = cache.get(&chain) {
                    tracing::warn!(error = %e, chain = %chain, "Fee config reload failed, serving stale value");
                    return (entry.policy, entry.collection_address.clone());
                }
                tracing::warn!(error = %e, chain = %chain, "Fee config unavailable, using defaults");
                (FeePolicy::default(), None)
            }
        }
    }
}

impl Default for FeeConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the configuration file and resolve one chain's policy.
///
/// A missing file yields the default policy with no collection wallet.
fn load_for_chain(
    store: &RecordStore,
    chain: Chain,
) -> Result<(FeePolicy, Option<String>), String> {
    let path = store.paths().fee_config();
    if !store.exists(&path) {
        return Ok((FeePolicy::default(), None));
    }

    let file: FeeConfigFile = store.read_json(&path).map_err(|e| e.to_string())?;

    let minimum_micro = match file.minimum_fee.as_deref() {
        Some(raw) => parse_usdc(raw).map(|(_, micro)| micro).map_err(|e| {
            format!("invalid minimum_fee in fee config: {e}")
        })?,
        None => DEFAULT_MINIMUM_MICRO,
    };

    let policy = FeePolicy {
        bps: file.fee_bps,
        minimum_micro,
    };
    let collection_address = file.collection_wallets.get(chain.as_str()).cloned();
    Ok((policy, collection_address))
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

    fn write_config(store: &RecordStore, json: serde_json::Value) {
        store
            .write_json(store.paths().fee_config(), &json)
            .expect("write fee config");
    }

    #[test]
    fn fee_is_max_of_rate_and_minimum() {
        let policy = FeePolicy {
            bps: 50,
            minimum_micro: 62_500,
        };
        // 0.5% of 50 USDC = 0.25 USDC > 0.0625 minimum.
        assert_eq!(compute_fee(50_000_000, &policy), 250_000);
        // 0.5% of 1 USDC = 0.005 USDC < 0.0625 minimum.
        assert_eq!(compute_fee(1_000_000, &policy), 62_500);
    }

    #[test]
    fn missing_config_uses_defaults_without_collection_wallet() {
        let (store, _dir) = test_store();
        let cache = FeeConfigCache::new();

        let quote = cache.quote(&store, Chain::BaseSepolia, 50_000_000);
        assert_eq!(quote.fee_micro, 250_000);
        assert!(quote.collection_address.is_none());
    }

    #[test]
    fn config_file_overrides_policy_and_wallets() {
        let (store, _dir) = test_store();
        write_config(
            &store,
            serde_json::json!({
                "fee_bps": 100,
                "minimum_fee": "1.00",
                "collection_wallets": {
                    "BASE-SEPOLIA": "0x4444444444444444444444444444444444444444"
                }
            }),
        );

        let cache = FeeConfigCache::new();
        let quote = cache.quote(&store, Chain::BaseSepolia, 50_000_000);
        // 1% of 50 = 0.50 < 1.00 minimum.
        assert_eq!(quote.fee_micro, 1_000_000);
        assert_eq!(
            quote.collection_address.as_deref(),
            Some("0x4444444444444444444444444444444444444444")
        );

        // Unmapped chain: fee still computed, nowhere to send it.
        let other = cache.quote(&store, Chain::AvaxFuji, 50_000_000);
        assert!(other.collection_address.is_none());
    }

    #[test]
    fn cached_value_survives_config_edit_until_ttl() {
        let (store, _dir) = test_store();
        write_config(&store, serde_json::json!({ "fee_bps": 50 }));

        let cache = FeeConfigCache::with_ttl(Duration::from_secs(300));
        let first = cache.quote(&store, Chain::BaseSepolia, 100_000_000);
        assert_eq!(first.fee_micro, 500_000);

        write_config(&store, serde_json::json!({ "fee_bps": 200 }));
        let second = cache.quote(&store, Chain::BaseSepolia, 100_000_000);
        assert_eq!(second.fee_micro, first.fee_micro);
    }

    #[test]
    fn expired_entry_reloads_config() {
        let (store, _dir) = test_store();
        write_config(&store, serde_json::json!({ "fee_bps": 50 }));

        let cache = FeeConfigCache::with_ttl(Duration::from_millis(1));
        cache.quote(&store, Chain::BaseSepolia, 100_000_000);

        write_config(&store, serde_json::json!({ "fee_bps": 200 }));
        std::thread::sleep(Duration::from_millis(5));

        let quote = cache.quote(&store, Chain::BaseSepolia, 100_000_000);
        assert_eq!(quote.fee_micro, 2_000_000);
    }
}
