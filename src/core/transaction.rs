//! Transaction history records as observed from the full node
//!
//! The engine consumes fully validated transactions: every input carries the
//! data of the output it spends, and outputs carry their decoded address and
//! lock information. Voided status may flip after the fact, which triggers a
//! history rebuild (see the ledger module).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Token uid of the network's native token.
pub const NATIVE_TOKEN_UID: &str = "00";

/// Bit in `token_data` marking an authority output.
pub const TOKEN_AUTHORITY_MASK: u8 = 0b1000_0000;

/// Version byte of a proof-of-work block.
pub const BLOCK_VERSION: u8 = 0;

/// Version byte of a merge-mined block.
pub const MERGE_MINED_BLOCK_VERSION: u8 = 3;

/// Version byte of a token-creation transaction.
pub const CREATE_TOKEN_TX_VERSION: u8 = 2;

/// Version byte of a nano-contract transaction.
pub const NANO_CONTRACT_TX_VERSION: u8 = 4;

/// Version byte of an on-chain-blueprint transaction.
pub const ON_CHAIN_BLUEPRINT_TX_VERSION: u8 = 6;

/// Maximum number of inputs a transaction may carry.
pub const MAX_TX_INPUTS: usize = 255;

/// Maximum number of outputs a transaction may carry.
pub const MAX_TX_OUTPUTS: usize = 255;

/// Default number of confirmations before a block reward can be spent.
pub const DEFAULT_REWARD_LOCK: u32 = 300;

// =============================================================================
// Authorities
// =============================================================================

bitflags! {
    /// Token authority bits carried by an authority output's value field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Authorities: u8 {
        /// Permission to create new units of the token.
        const MINT = 0b01;
        /// Permission to destroy units of the token.
        const MELT = 0b10;
    }
}

impl Authorities {
    /// Human-readable name of a single authority bit, used in error messages.
    pub fn kind_name(self) -> &'static str {
        if self == Authorities::MINT {
            "mint"
        } else if self == Authorities::MELT {
            "melt"
        } else {
            "authority"
        }
    }
}

// =============================================================================
// Chain Context
// =============================================================================

/// Reference point against which lock predicates are evaluated.
///
/// Carried explicitly so processing and selection are deterministic in tests
/// and replayable outside wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct ChainContext {
    /// Reference timestamp for timelock checks (seconds).
    pub reference_timestamp: u32,
    /// Best block height known to the wallet.
    pub best_block_height: u32,
    /// Confirmations required before block rewards unlock.
    pub reward_lock: u32,
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input, carrying the data of the output it spends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxInput {
    /// Transaction that created the spent output
    pub tx_id: String,
    /// Index of the spent output in that transaction
    pub index: u32,
    /// Token uid of the spent output
    pub token: String,
    /// Value of the spent output (authority bits for authority outputs)
    pub value: i128,
    /// Raw token_data byte of the spent output
    pub token_data: u8,
    /// Decoded address of the spent output, if any
    pub address: Option<String>,
    /// Timelock of the spent output
    pub timelock: Option<u32>,
}

impl TxInput {
    /// Whether the spent output was an authority output
    pub fn is_authority(&self) -> bool {
        self.token_data & TOKEN_AUTHORITY_MASK != 0
    }

    /// Authority bits of the spent output (empty for fund outputs)
    pub fn authorities(&self) -> Authorities {
        if self.is_authority() {
            Authorities::from_bits_truncate(self.value as u8)
        } else {
            Authorities::empty()
        }
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output in full-node history form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxOutput {
    /// Output value (authority bits for authority outputs)
    pub value: i128,
    /// Token uid
    pub token: String,
    /// Raw token_data byte; bit 0x80 marks an authority output
    pub token_data: u8,
    /// Decoded address, `None` when the script is not address-based
    pub address: Option<String>,
    /// Timelock: output unspendable until this timestamp
    pub timelock: Option<u32>,
    /// Id of the transaction that spent this output, if any
    pub spent_by: Option<String>,
}

impl TxOutput {
    /// Whether this is an authority output
    pub fn is_authority(&self) -> bool {
        self.token_data & TOKEN_AUTHORITY_MASK != 0
    }

    /// Authority bits granted by this output (empty for fund outputs)
    pub fn authorities(&self) -> Authorities {
        if self.is_authority() {
            Authorities::from_bits_truncate(self.value as u8)
        } else {
            Authorities::empty()
        }
    }

    /// Check the timelock against a reference timestamp
    pub fn is_time_locked(&self, reference_timestamp: u32) -> bool {
        self.timelock.map(|t| t > reference_timestamp).unwrap_or(false)
    }
}

// =============================================================================
// History Transaction
// =============================================================================

/// A confirmed (or voided) transaction from the wallet's history
///
/// Append-only once saved; only `is_voided` may change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryTx {
    /// Transaction id (hash)
    pub tx_id: String,
    /// Version byte, distinguishing blocks, token creations and contracts
    pub version: u8,
    /// Transaction timestamp (seconds)
    pub timestamp: u32,
    /// Whether the full node voided this transaction
    pub is_voided: bool,
    /// Height at which the transaction was confirmed
    #[serde(default)]
    pub height: Option<u32>,
    /// Inputs, each with the data of the output it spends
    pub inputs: Vec<TxInput>,
    /// Outputs
    pub outputs: Vec<TxOutput>,
    /// Token name, present on token-creation transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    /// Token symbol, present on token-creation transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    /// Nano contract id, present on contract calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nc_id: Option<String>,
    /// Caller address of a nano contract call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nc_address: Option<String>,
    /// Caller sequence number of a nano contract call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nc_seqnum: Option<u32>,
}

impl HistoryTx {
    /// Whether this transaction is a block (subject to reward lock)
    pub fn is_block(&self) -> bool {
        matches!(self.version, BLOCK_VERSION | MERGE_MINED_BLOCK_VERSION)
    }

    /// Whether this transaction created a new token
    pub fn is_create_token(&self) -> bool {
        self.version == CREATE_TOKEN_TX_VERSION
            && self.token_name.is_some()
            && self.token_symbol.is_some()
    }

    /// Whether this transaction carries a nano-contract call
    pub fn is_nano_contract(&self) -> bool {
        self.nc_address.is_some() && self.nc_seqnum.is_some()
    }

    /// Whether reward lock still applies at the given best height
    pub fn is_height_locked(&self, best_block_height: u32, reward_lock: u32) -> bool {
        if !self.is_block() {
            return false;
        }
        match self.height {
            Some(h) => h.saturating_add(reward_lock) > best_block_height,
            None => false,
        }
    }
}

// =============================================================================
// UTXO
// =============================================================================

/// Identity of an unspent output: `(tx_id, index)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtxoId {
    pub tx_id: String,
    pub index: u32,
}

impl UtxoId {
    pub fn new(tx_id: &str, index: u32) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            index,
        }
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// An unspent, wallet-owned transaction output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utxo {
    /// Transaction that created this output
    pub tx_id: String,
    /// Output index
    pub index: u32,
    /// Token uid
    pub token: String,
    /// Owning address (base58)
    pub address: String,
    /// Value (authority bits for authority outputs)
    pub value: i128,
    /// Authority bits, zero for fund outputs
    pub authorities: u8,
    /// Timelock, if any
    pub timelock: Option<u32>,
    /// Confirmation height, present only for block outputs
    pub height: Option<u32>,
    /// Version byte of the creating transaction
    pub version: u8,
}

impl Utxo {
    /// Identity of this UTXO
    pub fn id(&self) -> UtxoId {
        UtxoId::new(&self.tx_id, self.index)
    }

    /// Whether this is an authority UTXO
    pub fn is_authority(&self) -> bool {
        self.authorities != 0
    }

    /// Authority bits granted by this UTXO
    pub fn authority_flags(&self) -> Authorities {
        Authorities::from_bits_truncate(self.authorities)
    }

    /// Check the timelock against a reference timestamp
    pub fn is_time_locked(&self, reference_timestamp: u32) -> bool {
        self.timelock.map(|t| t > reference_timestamp).unwrap_or(false)
    }

    /// Check the reward lock against the best known height
    pub fn is_height_locked(&self, best_block_height: u32, reward_lock: u32) -> bool {
        if !matches!(self.version, BLOCK_VERSION | MERGE_MINED_BLOCK_VERSION) {
            return false;
        }
        match self.height {
            Some(h) => h.saturating_add(reward_lock) > best_block_height,
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_output(value: i128, token_data: u8) -> TxOutput {
        TxOutput {
            value,
            token: NATIVE_TOKEN_UID.to_string(),
            token_data,
            address: Some("addr1".to_string()),
            timelock: None,
            spent_by: None,
        }
    }

    #[test]
    fn test_authority_output_detection() {
        let fund = make_output(100, 0);
        assert!(!fund.is_authority());
        assert_eq!(fund.authorities(), Authorities::empty());

        let mint = make_output(1, TOKEN_AUTHORITY_MASK | 1);
        assert!(mint.is_authority());
        assert_eq!(mint.authorities(), Authorities::MINT);

        let both = make_output(3, TOKEN_AUTHORITY_MASK | 1);
        assert!(both.authorities().contains(Authorities::MINT));
        assert!(both.authorities().contains(Authorities::MELT));
    }

    #[test]
    fn test_output_timelock() {
        let mut output = make_output(100, 0);
        assert!(!output.is_time_locked(0));

        output.timelock = Some(1000);
        assert!(output.is_time_locked(999));
        assert!(!output.is_time_locked(1000));
        assert!(!output.is_time_locked(1001));
    }

    #[test]
    fn test_height_lock_only_for_blocks() {
        let mut tx = HistoryTx {
            tx_id: "tx1".to_string(),
            version: BLOCK_VERSION,
            timestamp: 0,
            is_voided: false,
            height: Some(100),
            inputs: vec![],
            outputs: vec![],
            token_name: None,
            token_symbol: None,
            nc_id: None,
            nc_address: None,
            nc_seqnum: None,
        };

        // 100 + 300 > 350 -> still locked
        assert!(tx.is_height_locked(350, 300));
        // 100 + 300 <= 400 -> unlocked
        assert!(!tx.is_height_locked(400, 300));

        // Ordinary transactions are never height locked
        tx.version = 1;
        assert!(!tx.is_height_locked(0, 300));
    }

    #[test]
    fn test_utxo_id_display() {
        let id = UtxoId::new("abc", 3);
        assert_eq!(id.to_string(), "abc:3");
    }
}
