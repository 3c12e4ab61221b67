//! Store contract
//!
//! The persistence interface every other component reads and writes through.
//! Implementations may be in-memory or durable; the engine never assumes
//! anything beyond this contract. All operations are strict request/response
//! with no implicit reordering, and errors are propagated unchanged.

use crate::core::{
    AddressInfo, AddressMetadata, HistoryTx, TokenConfig, TokenMetadata, Utxo, UtxoId, WalletData,
};
use std::time::Duration;
use thiserror::Error;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Persistence contract consumed by the ledger engine
///
/// Iteration-order guarantees the engine relies on:
/// - `iter_history` yields transactions ordered by `(timestamp, tx_id)`;
/// - `iter_utxos` yields UTXOs in insertion order (the coin selector's
///   stable-order guarantee);
/// - `iter_addresses` yields addresses in BIP-32 index order.
pub trait Store {
    // -------------------------------------------------------------------------
    // Addresses
    // -------------------------------------------------------------------------

    fn save_address(&mut self, info: AddressInfo) -> Result<(), StoreError>;
    fn get_address(&self, base58: &str) -> Result<Option<AddressInfo>, StoreError>;
    fn get_address_at_index(&self, index: u32) -> Result<Option<AddressInfo>, StoreError>;
    fn iter_addresses(&self) -> Result<Vec<AddressInfo>, StoreError>;
    fn address_count(&self) -> Result<usize, StoreError>;

    fn get_address_meta(&self, base58: &str) -> Result<Option<AddressMetadata>, StoreError>;
    fn save_address_meta(&mut self, base58: &str, meta: AddressMetadata)
        -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Tokens
    // -------------------------------------------------------------------------

    fn save_token(&mut self, config: TokenConfig) -> Result<(), StoreError>;
    fn get_token(&self, uid: &str) -> Result<Option<TokenConfig>, StoreError>;
    fn iter_tokens(&self) -> Result<Vec<TokenConfig>, StoreError>;

    fn get_token_meta(&self, uid: &str) -> Result<Option<TokenMetadata>, StoreError>;
    fn save_token_meta(&mut self, uid: &str, meta: TokenMetadata) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // Transaction history
    // -------------------------------------------------------------------------

    fn save_tx(&mut self, tx: HistoryTx) -> Result<(), StoreError>;
    fn get_tx(&self, tx_id: &str) -> Result<Option<HistoryTx>, StoreError>;
    fn iter_history(&self) -> Result<Vec<HistoryTx>, StoreError>;
    fn history_count(&self) -> Result<usize, StoreError>;

    // -------------------------------------------------------------------------
    // UTXO set
    // -------------------------------------------------------------------------

    fn save_utxo(&mut self, utxo: Utxo) -> Result<(), StoreError>;
    fn get_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError>;
    fn delete_utxo(&mut self, id: &UtxoId) -> Result<bool, StoreError>;
    fn iter_utxos(&self) -> Result<Vec<Utxo>, StoreError>;

    // -------------------------------------------------------------------------
    // Locked-UTXO index
    // -------------------------------------------------------------------------

    fn save_locked_utxo(&mut self, utxo: Utxo) -> Result<(), StoreError>;
    fn delete_locked_utxo(&mut self, id: &UtxoId) -> Result<bool, StoreError>;
    fn iter_locked_utxos(&self) -> Result<Vec<Utxo>, StoreError>;

    // -------------------------------------------------------------------------
    // Wallet data
    // -------------------------------------------------------------------------

    fn get_wallet_data(&self) -> Result<WalletData, StoreError>;
    fn save_wallet_data(&mut self, data: WalletData) -> Result<(), StoreError>;

    // -------------------------------------------------------------------------
    // UTXO reservations (advisory, in-process)
    // -------------------------------------------------------------------------

    /// Set or clear the reservation flag for a UTXO id. Returns whether the
    /// call changed the flag. A `ttl` only applies when marking.
    fn utxo_set_reserved(
        &mut self,
        id: &UtxoId,
        mark: bool,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    fn utxo_is_reserved(&self, id: &UtxoId) -> Result<bool, StoreError>;
    fn iter_reserved_utxos(&self) -> Result<Vec<UtxoId>, StoreError>;

    /// Drop reservations past their TTL; returns how many were removed
    fn purge_expired_reservations(&mut self) -> Result<usize, StoreError>;

    // -------------------------------------------------------------------------
    // Derived-state reset
    // -------------------------------------------------------------------------

    /// Clear everything the history processor derives (address metadata,
    /// token metadata, UTXO and locked-UTXO sets), keeping addresses, token
    /// configs, history, wallet data and reservations
    fn clear_derived_state(&mut self) -> Result<(), StoreError>;
}
