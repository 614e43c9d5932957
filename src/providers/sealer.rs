// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! Single-use sealed credentials for mutating provider calls.
//!
//! The provider requires every mutating call to carry the entity secret
//! encrypted to its published sealing key. Sealing is ECIES-style: a fresh
//! ephemeral X25519 key agrees with the provider key, the shared secret is
//! expanded through HKDF-SHA256, and the entity secret is sealed under
//! AES-256-GCM with a random nonce. The opaque output is
//! `base64(ephemeral_public ‖ nonce ‖ ciphertext)`.
//!
//! A sealed credential is valid for exactly one call; callers must invoke
//! [`CredentialSealer::seal`] per request, retries included.
//!
//! The provider sealing key is cached for a bounded TTL. Refresh is
//! single-flight: while one task refreshes an expired key, concurrent
//! callers keep sealing against the stale-but-valid cached value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::hkdf::{Salt, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::RwLock;

use super::gateway::{ProviderError, ProviderGateway};

/// Default TTL for the cached provider sealing key.
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(600);

/// HKDF info string binding derived keys to this credential scheme.
const SEALING_INFO: &[u8] = b"custodia-sealed-credential-v1";

#[derive(Debug, thiserror::Error)]
pub enum SealerError {
    #[error("sealer configuration missing: {0}")]
    MissingConfig(String),

    #[error("provider key fetch failed: {0}")]
    KeyFetch(#[from] ProviderError),

    #[error("provider sealing key was invalid: {0}")]
    InvalidKey(String),

    #[error("sealing operation failed")]
    Crypto,
}

struct CachedKey {
    key_bytes: [u8; 32],
    fetched_at: Instant,
}

/// Seals the entity secret to the provider's cached public key.
pub struct CredentialSealer {
    gateway: Arc<ProviderGateway>,
    entity_secret: Vec<u8>,
    key_cache: RwLock<Option<CachedKey>>,
    refreshing: AtomicBool,
    key_ttl: Duration,
    rng: SystemRandom,
}

impl CredentialSealer {
    /// Build from the environment (`ENTITY_SECRET`, hex-encoded 32 bytes).
    pub fn from_env(gateway: Arc<ProviderGateway>) -> Result<Self, SealerError> {
        let raw = std::env::var("ENTITY_SECRET")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SealerError::MissingConfig("ENTITY_SECRET".to_string()))?;

        let entity_secret = hex::decode(&raw)
            .map_err(|_| SealerError::MissingConfig("ENTITY_SECRET must be hex".to_string()))?;
        if entity_secret.len() != 32 {
            return Err(SealerError::MissingConfig(
                "ENTITY_SECRET must be 32 bytes".to_string(),
            ));
        }

        Ok(Self::new(gateway, entity_secret, DEFAULT_KEY_TTL))
    }

    /// Build with an explicit secret and TTL (useful for testing).
    pub fn new(gateway: Arc<ProviderGateway>, entity_secret: Vec<u8>, key_ttl: Duration) -> Self {
        Self {
            gateway,
            entity_secret,
            key_cache: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            key_ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Produce a fresh, single-use sealed credential.
    pub async fn seal(&self) -> Result<String, SealerError> {
        let provider_key = self.provider_key().await?;
        seal_to_key(&provider_key, &self.entity_secret, &self.rng)
    }

    /// Get the provider sealing key, refreshing at most once per TTL window.
    async fn provider_key(&self) -> Result<[u8; 32], SealerError> {
        {
            let cache = self.key_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.key_ttl {
                    return Ok(cached.key_bytes);
                }
            }
        }

        if self.refreshing.swap(true, Ordering::AcqRel) {
            // Another task is refreshing; serve the stale value if we have one.
            let cache = self.key_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                return Ok(cached.key_bytes);
            }
        }

        let fetched = self.fetch_key().await;
        self.refreshing.store(false, Ordering::Release);

        match fetched {
            Ok(key_bytes) => {
                let mut cache = self.key_cache.write().await;
                *cache = Some(CachedKey {
                    key_bytes,
                    fetched_at: Instant::now(),
                });
                Ok(key_bytes)
            }
            Err(e) => {
                // Refresh failed: a stale key still seals valid credentials
                // until the provider rotates it away.
                let cache = self.key_cache.read().await;
                if let Some(cached) = cache.as_ref() {
                    tracing::warn!(error = %e, "Sealing key refresh failed, serving cached key");
                    return Ok(cached.key_bytes);
                }
                Err(e)
            }
        }
    }

    async fn fetch_key(&self) -> Result<[u8; 32], SealerError> {
        let encoded = self.gateway.sealing_public_key().await?;
        decode_key(&encoded)
    }
}

/// Decode the provider's base64 sealing key.
fn decode_key(encoded: &str) -> Result<[u8; 32], SealerError> {
    let bytes = Base64::decode_vec(encoded.trim())
        .map_err(|e| SealerError::InvalidKey(format!("bad base64: {e}")))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SealerError::InvalidKey("expected 32-byte X25519 key".to_string()))?;
    Ok(key)
}

/// Seal `secret` to the provider public key with a fresh ephemeral keypair.
fn seal_to_key(
    provider_key: &[u8; 32],
    secret: &[u8],
    rng: &SystemRandom,
) -> Result<String, SealerError> {
    let ephemeral =
        EphemeralPrivateKey::generate(&X25519, rng).map_err(|_| SealerError::Crypto)?;
    let ephemeral_public = ephemeral
        .compute_public_key()
        .map_err(|_| SealerError::Crypto)?;

    let peer = UnparsedPublicKey::new(&X25519, provider_key);

    let mut aead_key_bytes = [0u8; 32];
    agree_ephemeral(ephemeral, &peer, |shared| {
        Salt::new(HKDF_SHA256, &[])
            .extract(shared)
            .expand(&[SEALING_INFO], HKDF_SHA256)
            .and_then(|okm| okm.fill(&mut aead_key_bytes))
    })
    .map_err(|_| SealerError::Crypto)?
    .map_err(|_| SealerError::Crypto)?;

    let unbound =
        UnboundKey::new(&AES_256_GCM, &aead_key_bytes).map_err(|_| SealerError::Crypto)?;
    let key = LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; 12];
    rng.fill(&mut nonce_bytes).map_err(|_| SealerError::Crypto)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = secret.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| SealerError::Crypto)?;

    let mut sealed = Vec::with_capacity(32 + 12 + in_out.len());
    sealed.extend_from_slice(ephemeral_public.as_ref());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&in_out);

    Ok(Base64::encode_string(&sealed))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Any 32-byte value is a valid X25519 public key for agreement.
    const TEST_PROVIDER_KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn sealed_credential_has_expected_structure() {
        let rng = SystemRandom::new();
        let secret = [42u8; 32];

        let sealed = seal_to_key(&TEST_PROVIDER_KEY, &secret, &rng).unwrap();
        let decoded = Base64::decode_vec(&sealed).unwrap();

        // ephemeral public (32) + nonce (12) + ciphertext (32) + GCM tag (16)
        assert_eq!(decoded.len(), 32 + 12 + 32 + 16);
    }

    #[test]
    fn sealing_twice_never_repeats() {
        let rng = SystemRandom::new();
        let secret = [42u8; 32];

        let first = seal_to_key(&TEST_PROVIDER_KEY, &secret, &rng).unwrap();
        let second = seal_to_key(&TEST_PROVIDER_KEY, &secret, &rng).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn decode_key_requires_32_bytes() {
        let ok = Base64::encode_string(&[1u8; 32]);
        assert!(decode_key(&ok).is_ok());

        let short = Base64::encode_string(&[1u8; 16]);
        assert!(matches!(decode_key(&short), Err(SealerError::InvalidKey(_))));

        assert!(matches!(
            decode_key("not base64!!"),
            Err(SealerError::InvalidKey(_))
        ));
    }
}
