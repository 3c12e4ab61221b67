//! Incremental transaction-history processor
//!
//! Consumes one transaction at a time and derives balances, UTXO sets and
//! address/token metadata. Each transaction's effect is computed as an
//! explicit delta object ([`TxEffects`]) and committed in one pass, so a
//! failure can never leave balances half-updated. Balance math is additive
//! and commutative: replaying the same history in any order converges to the
//! same state.

use crate::core::{
    ChainContext, HistoryTx, TokenBalance, TokenConfig, Utxo, UtxoId,
};
use crate::scan::ScanPolicyError;
use crate::storage::{Store, StoreError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// History processing errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("scan policy error: {0}")]
    ScanPolicy(#[from] ScanPolicyError),
    #[error("wallet not initialized: no addresses loaded")]
    WalletNotInitialized,
}

/// Summary returned to the caller after processing
///
/// Carries everything the sync layer needs to advance scanning and resolve
/// unknown token configurations.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Highest BIP-32 index among wallet addresses touched
    pub max_address_index: Option<u32>,
    /// Token uids touched by wallet-owned inputs or outputs
    pub tokens: HashSet<String>,
}

impl ProcessResult {
    pub fn merge(&mut self, other: ProcessResult) {
        self.max_address_index = match (self.max_address_index, other.max_address_index) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.tokens.extend(other.tokens);
    }
}

// =============================================================================
// Transaction Effects
// =============================================================================

/// The complete set of ledger mutations caused by one transaction
///
/// Computed without touching the store, then applied in a single commit.
#[derive(Debug, Default)]
pub struct TxEffects {
    /// Balance deltas per token (wallet-wide)
    token_deltas: HashMap<String, TokenBalance>,
    /// Balance deltas per address per token
    address_deltas: HashMap<String, HashMap<String, TokenBalance>>,
    /// Addresses whose transaction counter increments
    address_tx_counts: HashSet<String>,
    /// Tokens whose transaction counter increments
    token_tx_counts: HashSet<String>,
    /// Nano-contract seqnum candidates per caller address
    seqnum_bumps: HashMap<String, u32>,
    /// UTXOs created by this transaction
    new_utxos: Vec<Utxo>,
    /// Subset of the new UTXOs that are still locked
    new_locked_utxos: Vec<Utxo>,
    /// UTXOs consumed by this transaction
    spent_utxos: Vec<UtxoId>,
    /// Reservation flags to clear (outputs confirmed spent)
    clear_reservations: Vec<UtxoId>,
    /// Token configuration registered by a token-creation transaction
    new_token: Option<TokenConfig>,
    /// Result summary handed back to the caller
    result: ProcessResult,
}

impl TxEffects {
    fn token_delta(&mut self, token: &str) -> &mut TokenBalance {
        self.token_deltas.entry(token.to_string()).or_default()
    }

    fn address_delta(&mut self, address: &str, token: &str) -> &mut TokenBalance {
        self.address_deltas
            .entry(address.to_string())
            .or_default()
            .entry(token.to_string())
            .or_default()
    }

    fn touch(&mut self, address: &str, bip32_index: u32, token: &str) {
        self.address_tx_counts.insert(address.to_string());
        self.token_tx_counts.insert(token.to_string());
        self.result.tokens.insert(token.to_string());
        self.result.max_address_index = Some(
            self.result
                .max_address_index
                .map_or(bip32_index, |m| m.max(bip32_index)),
        );
    }

    /// Commit all mutations to the store
    ///
    /// Creation is guarded by existence checks so re-applying effects for a
    /// transaction whose UTXOs already exist cannot duplicate them.
    pub fn apply<S: Store>(self, store: &mut S) -> Result<ProcessResult, ProcessError> {
        for (address, seqnum) in &self.seqnum_bumps {
            let mut meta = store.get_address_meta(address)?.unwrap_or_default();
            meta.bump_seqnum(*seqnum);
            store.save_address_meta(address, meta)?;
        }

        for (token, delta) in &self.token_deltas {
            let mut meta = store.get_token_meta(token)?.unwrap_or_default();
            meta.balance.merge(delta);
            if self.token_tx_counts.contains(token) {
                meta.num_transactions += 1;
            }
            store.save_token_meta(token, meta)?;
        }

        for (address, per_token) in &self.address_deltas {
            let mut meta = store.get_address_meta(address)?.unwrap_or_default();
            for (token, delta) in per_token {
                meta.balance_mut(token).merge(delta);
            }
            if self.address_tx_counts.contains(address) {
                meta.num_transactions += 1;
            }
            store.save_address_meta(address, meta)?;
        }

        for utxo in self.new_utxos {
            if store.get_utxo(&utxo.id())?.is_none() {
                store.save_utxo(utxo)?;
            }
        }
        for utxo in self.new_locked_utxos {
            store.save_locked_utxo(utxo)?;
        }
        for id in &self.spent_utxos {
            store.delete_utxo(id)?;
            store.delete_locked_utxo(id)?;
        }
        for id in &self.clear_reservations {
            store.utxo_set_reserved(id, false, None)?;
        }

        if let Some(config) = self.new_token {
            if store.get_token(&config.uid)?.is_none() {
                log::info!(
                    "registering token {} ({}) from creation tx",
                    config.name,
                    config.uid
                );
                store.save_token(config)?;
            }
        }

        Ok(self.result)
    }
}

// =============================================================================
// Processing
// =============================================================================

/// Compute the full effect of one transaction without mutating the store
pub fn compute_tx_effects<S: Store>(
    store: &S,
    tx: &HistoryTx,
    ctx: &ChainContext,
) -> Result<TxEffects, ProcessError> {
    let mut effects = TxEffects::default();

    // A contract call's ordering guarantee must survive a later void, so the
    // caller seqnum bump happens before the voided check.
    if let (Some(caller), Some(seqnum)) = (&tx.nc_address, tx.nc_seqnum) {
        if let Some(info) = store.get_address(caller)? {
            effects.seqnum_bumps.insert(caller.clone(), seqnum);
            effects.result.max_address_index = Some(
                effects
                    .result
                    .max_address_index
                    .map_or(info.bip32_index, |m| m.max(info.bip32_index)),
            );
        }
    }

    if tx.is_voided {
        log::debug!("tx {} is voided, skipping balance effects", tx.tx_id);
        return Ok(effects);
    }

    let height_locked = tx.is_height_locked(ctx.best_block_height, ctx.reward_lock);

    for (index, output) in tx.outputs.iter().enumerate() {
        let address = match &output.address {
            Some(address) => address,
            None => continue,
        };
        let info = match store.get_address(address)? {
            Some(info) => info,
            None => continue,
        };

        effects.touch(address, info.bip32_index, &output.token);

        let locked = output.is_time_locked(ctx.reference_timestamp) || height_locked;
        if output.is_authority() {
            let authorities = output.authorities();
            effects
                .token_delta(&output.token)
                .authorities
                .credit(authorities, 1, locked);
            effects
                .address_delta(address, &output.token)
                .authorities
                .credit(authorities, 1, locked);
        } else {
            effects
                .token_delta(&output.token)
                .tokens
                .credit(output.value, locked);
            effects
                .address_delta(address, &output.token)
                .tokens
                .credit(output.value, locked);
        }

        let id = UtxoId::new(&tx.tx_id, index as u32);
        if output.spent_by.is_none() {
            let utxo = Utxo {
                tx_id: tx.tx_id.clone(),
                index: index as u32,
                token: output.token.clone(),
                address: address.clone(),
                value: output.value,
                authorities: output.authorities().bits(),
                timelock: output.timelock,
                height: if tx.is_block() { tx.height } else { None },
                version: tx.version,
            };
            if locked {
                effects.new_locked_utxos.push(utxo.clone());
            }
            effects.new_utxos.push(utxo);
        } else if store.utxo_is_reserved(&id)? {
            effects.clear_reservations.push(id);
        }
    }

    for input in &tx.inputs {
        let address = match &input.address {
            Some(address) => address,
            None => continue,
        };
        let info = match store.get_address(address)? {
            Some(info) => info,
            None => continue,
        };

        effects.touch(address, info.bip32_index, &input.token);

        // Inputs always spend from the unlocked bucket
        if input.is_authority() {
            let authorities = input.authorities();
            effects
                .token_delta(&input.token)
                .authorities
                .credit(authorities, -1, false);
            effects
                .address_delta(address, &input.token)
                .authorities
                .credit(authorities, -1, false);
        } else {
            effects
                .token_delta(&input.token)
                .tokens
                .credit(-input.value, false);
            effects
                .address_delta(address, &input.token)
                .tokens
                .credit(-input.value, false);
        }

        let id = UtxoId::new(&input.tx_id, input.index);
        if store.utxo_is_reserved(&id)? {
            effects.clear_reservations.push(id.clone());
        }
        effects.spent_utxos.push(id);
    }

    if tx.is_create_token() {
        // The created token's uid is the creation transaction id.
        effects.new_token = Some(TokenConfig {
            uid: tx.tx_id.clone(),
            name: tx.token_name.clone().unwrap_or_default(),
            symbol: tx.token_symbol.clone().unwrap_or_default(),
        });
    }

    Ok(effects)
}

/// Process a transaction not seen before: compute its effects and commit them
pub fn process_new_tx<S: Store>(
    store: &mut S,
    tx: &HistoryTx,
    ctx: &ChainContext,
) -> Result<ProcessResult, ProcessError> {
    let effects = compute_tx_effects(store, tx, ctx)?;
    effects.apply(store)
}

/// Re-sync UTXO existence and reservation state for a transaction whose
/// metadata changed
///
/// Never touches balances, so it is safe to call any number of times.
pub fn process_metadata_changed<S: Store>(
    store: &mut S,
    tx: &HistoryTx,
    ctx: &ChainContext,
) -> Result<(), ProcessError> {
    let height_locked = tx.is_height_locked(ctx.best_block_height, ctx.reward_lock);

    for (index, output) in tx.outputs.iter().enumerate() {
        let address = match &output.address {
            Some(address) => address,
            None => continue,
        };
        if store.get_address(address)?.is_none() {
            continue;
        }

        let id = UtxoId::new(&tx.tx_id, index as u32);
        if output.spent_by.is_none() && !tx.is_voided {
            if store.get_utxo(&id)?.is_none() {
                let locked = output.is_time_locked(ctx.reference_timestamp) || height_locked;
                let utxo = Utxo {
                    tx_id: tx.tx_id.clone(),
                    index: index as u32,
                    token: output.token.clone(),
                    address: address.clone(),
                    value: output.value,
                    authorities: output.authorities().bits(),
                    timelock: output.timelock,
                    height: if tx.is_block() { tx.height } else { None },
                    version: tx.version,
                };
                if locked {
                    store.save_locked_utxo(utxo.clone())?;
                }
                store.save_utxo(utxo)?;
            }
        } else {
            store.delete_utxo(&id)?;
            store.delete_locked_utxo(&id)?;
            if store.utxo_is_reserved(&id)? {
                store.utxo_set_reserved(&id, false, None)?;
            }
        }
    }

    Ok(())
}

/// Full rebuild: clear all derived state and replay the stored history
///
/// Order-independent by construction; used on load and whenever a stored
/// transaction's voided flag flips (additive math cannot subtract a void in
/// place).
pub fn process_history<S: Store>(
    store: &mut S,
    ctx: &ChainContext,
) -> Result<ProcessResult, ProcessError> {
    store.clear_derived_state()?;

    let history = store.iter_history()?;
    let mut result = ProcessResult::default();
    for tx in &history {
        let effects = compute_tx_effects(store, tx, ctx)?;
        result.merge(effects.apply(store)?);
    }

    if let Some(index) = result.max_address_index {
        update_wallet_indices(store, index)?;
    }

    log::info!(
        "processed history: {} transactions, {} tokens touched",
        history.len(),
        result.tokens.len()
    );
    Ok(result)
}

/// Advance the wallet's used/current address indices after processing
pub fn update_wallet_indices<S: Store>(store: &mut S, index: u32) -> Result<(), ProcessError> {
    let mut wallet = store.get_wallet_data()?;
    wallet.mark_used(index);
    store.save_wallet_data(wallet)?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
