//! Token registry types
//!
//! A token's configuration (name/symbol) comes either from a token-creation
//! transaction in the wallet's own history or from the sync layer after it
//! resolves an unknown uid against the full node. The wallet-wide metadata is
//! derived state maintained by the history processor.

use crate::core::balance::TokenBalance;
use crate::core::transaction::NATIVE_TOKEN_UID;
use serde::{Deserialize, Serialize};

/// Immutable configuration of a token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenConfig {
    /// Token uid (the id of its creation transaction)
    pub uid: String,
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
}

impl TokenConfig {
    /// Configuration of the network's native token
    pub fn native() -> Self {
        Self {
            uid: NATIVE_TOKEN_UID.to_string(),
            name: "Native Token".to_string(),
            symbol: "NTV".to_string(),
        }
    }
}

/// Wallet-wide derived metadata for one token
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Number of wallet transactions touching this token
    pub num_transactions: u32,
    /// Aggregate balance across all wallet addresses
    pub balance: TokenBalance,
}
