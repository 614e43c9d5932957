// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the record store | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `NETWORK_ENV` | `testnet` or `mainnet` chain allowlist | `testnet` |
//! | `PROVIDER_API_BASE_URL` | Custody provider API base URL | sandbox URL |
//! | `PROVIDER_API_KEY` | Custody provider API key | Required |
//! | `ENTITY_SECRET` | Hex-encoded 32-byte entity secret for sealing | Required |
//! | `WEBHOOK_SECRET` | HMAC secret for inbound webhook signatures | Required |
//! | `FEE_RETRY_INTERVAL_SECS` | Fee retry worker sweep interval | `300` |
//! | `FEE_RETRY_BATCH_SIZE` | Max queue items processed per sweep | `25` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

/// Environment variable name for the record store data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the webhook HMAC secret.
pub const WEBHOOK_SECRET_ENV: &str = "WEBHOOK_SECRET";

/// Environment variable name for the chain-allowlist environment.
pub const NETWORK_ENV_ENV: &str = "NETWORK_ENV";

/// Environment variable name for the fee retry worker interval.
pub const FEE_RETRY_INTERVAL_ENV: &str = "FEE_RETRY_INTERVAL_SECS";

/// Environment variable name for the fee retry worker batch size.
pub const FEE_RETRY_BATCH_ENV: &str = "FEE_RETRY_BATCH_SIZE";

/// Default fee retry worker sweep interval in seconds.
pub const DEFAULT_FEE_RETRY_INTERVAL_SECS: u64 = 300;

/// Default maximum queue items per fee retry sweep.
pub const DEFAULT_FEE_RETRY_BATCH_SIZE: usize = 25;
