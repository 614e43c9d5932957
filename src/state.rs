// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

use std::sync::Arc;

use crate::fees::FeeConfigCache;
use crate::models::NetworkEnv;
use crate::providers::{CredentialSealer, ProviderGateway};
use crate::storage::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub gateway: Arc<ProviderGateway>,
    pub sealer: Arc<CredentialSealer>,
    pub fees: Arc<FeeConfigCache>,
    pub env: NetworkEnv,
    pub webhook_secret: Arc<String>,
}

impl AppState {
    pub fn new(
        store: RecordStore,
        gateway: Arc<ProviderGateway>,
        sealer: Arc<CredentialSealer>,
        env: NetworkEnv,
        webhook_secret: String,
    ) -> Self {
        Self {
            store: Arc::new(store),
            gateway,
            sealer,
            fees: Arc::new(FeeConfigCache::new()),
            env,
            webhook_secret: Arc::new(webhook_secret),
        }
    }
}
