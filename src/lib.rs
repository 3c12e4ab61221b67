//! UTXO Ledger: a wallet-side ledger engine for a multi-token UTXO chain
//!
//! This crate derives everything a wallet needs from its transaction history:
//! - Incremental, idempotent history processing into balances and UTXO sets
//! - Multi-token accounting with mint/melt authority unit counts
//! - Timelock and block-reward lock lifecycle with single-fire unlocking
//! - Deterministic coin selection and transaction balancing with change
//! - Advisory UTXO reservation so concurrent builds never collide
//! - Gap-limit and index-limit address scanning policies
//!
//! The engine never talks to a node: the sync layer feeds it fully decoded
//! transactions and the engine maintains derived state over a pluggable store.
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::AddressInfo;
//! use utxo_ledger::selection::{PartialOutput, PartialTx};
//! use utxo_ledger::storage::MemoryStore;
//! use utxo_ledger::LedgerEngine;
//!
//! let mut engine = LedgerEngine::new(MemoryStore::new());
//!
//! // Derive and load the initial address window
//! let range = engine.start_addresses().unwrap();
//! let batch: Vec<AddressInfo> = (range.next_index..range.next_index + range.count)
//!     .map(|i| AddressInfo::new(&format!("addr{}", i), i))
//!     .collect();
//! engine.load_addresses(batch).unwrap();
//!
//! // The sync layer feeds history transactions through `add_tx`; once funds
//! // arrive, a payment is balanced like this:
//! let tx = PartialTx {
//!     inputs: vec![],
//!     outputs: vec![PartialOutput::fund("addr1", "00", 10)],
//! };
//! let result = engine.fill_tx(&tx, None, None);
//! assert!(result.is_err()); // empty wallet: insufficient funds
//! ```

pub mod core;
pub mod engine;
pub mod ledger;
pub mod scan;
pub mod selection;
pub mod storage;

// Re-export commonly used types
pub use crate::core::{
    Authorities, Balance, ChainContext, HistoryTx, TokenBalance, TokenConfig, Utxo, UtxoId,
    NATIVE_TOKEN_UID,
};
pub use engine::{EngineSettings, LedgerEngine};
pub use ledger::{ProcessError, ProcessResult};
pub use scan::{AddressRange, ScanPolicy, ScanPolicyError};
pub use selection::{
    FillOptions, FillResult, PartialOutput, PartialTx, SelectionError, UtxoSelectionOptions,
};
pub use storage::{MemoryStore, Store, StoreError};
