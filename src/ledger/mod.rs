//! The history processor and the locked-UTXO lifecycle.

pub mod processor;
pub mod unlock;

pub use processor::{
    compute_tx_effects, process_history, process_metadata_changed, process_new_tx,
    update_wallet_indices, ProcessError, ProcessResult, TxEffects,
};
pub use unlock::{lock_state, process_utxo_unlock, unlock_utxos, LockState};
