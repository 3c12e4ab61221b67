//! Wallet address records and per-address derived metadata

use crate::core::balance::TokenBalance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A derived wallet address
///
/// Created when the scanning policy asks for a range to be loaded; immutable
/// afterwards. Key derivation itself happens outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressInfo {
    /// Base58 representation, the address identity
    pub base58: String,
    /// BIP-32 derivation index
    pub bip32_index: u32,
    /// Hex public key, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl AddressInfo {
    pub fn new(base58: &str, bip32_index: u32) -> Self {
        Self {
            base58: base58.to_string(),
            bip32_index,
            public_key: None,
        }
    }
}

/// Derived per-address metadata maintained by the history processor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressMetadata {
    /// Number of wallet transactions touching this address
    pub num_transactions: u32,
    /// Highest nano-contract sequence number signed by this address.
    /// Monotone non-decreasing, bumped even for voided contract calls.
    pub seqnum: u32,
    /// Balance per token uid
    pub balances: HashMap<String, TokenBalance>,
}

impl AddressMetadata {
    /// Raise `seqnum` to `candidate` if greater; never decreases
    pub fn bump_seqnum(&mut self, candidate: u32) {
        if candidate > self.seqnum {
            self.seqnum = candidate;
        }
    }

    /// Mutable balance entry for a token, created zeroed on first touch
    pub fn balance_mut(&mut self, token: &str) -> &mut TokenBalance {
        self.balances.entry(token.to_string()).or_default()
    }

    /// Balance for a token, zero if never touched
    pub fn balance(&self, token: &str) -> TokenBalance {
        self.balances.get(token).copied().unwrap_or_default()
    }
}
