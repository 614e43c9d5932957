// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia Systems

//! External custody provider integration.

pub mod gateway;
pub mod sealer;

pub use gateway::{
    parse_accepted, transfer_body, AcceptedTransaction, ProviderError, ProviderGateway,
    CCTP_BURN_PATH, CCTP_MINT_PATH, TRANSFER_PATH,
};
pub use sealer::{CredentialSealer, SealerError};
