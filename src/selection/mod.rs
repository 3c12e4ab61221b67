//! Coin selection and transaction balancing.

pub mod fill;
pub mod selector;

pub use fill::{
    fill_tx, match_balance_selection, tx_token_balances, FillOptions, FillResult, PartialOutput,
    PartialTx, TxTokenBalance,
};
pub use selector::{
    select_utxos, select_utxos_excluding, SelectionError, UtxoSelectionOptions, ValueOrder,
};
