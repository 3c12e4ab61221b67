//! Core data model: transactions, balances, addresses, tokens and wallet
//! bookkeeping.

pub mod address;
pub mod balance;
pub mod token;
pub mod transaction;
pub mod wallet;

pub use address::{AddressInfo, AddressMetadata};
pub use balance::{AuthorityBalance, Balance, TokenBalance};
pub use token::{TokenConfig, TokenMetadata};
pub use transaction::{
    Authorities, ChainContext, HistoryTx, TxInput, TxOutput, Utxo, UtxoId, BLOCK_VERSION,
    CREATE_TOKEN_TX_VERSION, DEFAULT_REWARD_LOCK, MAX_TX_INPUTS, MAX_TX_OUTPUTS,
    MERGE_MINED_BLOCK_VERSION, NANO_CONTRACT_TX_VERSION, NATIVE_TOKEN_UID,
    ON_CHAIN_BLUEPRINT_TX_VERSION, TOKEN_AUTHORITY_MASK,
};
pub use wallet::WalletData;
