//! UTXO selection
//!
//! Filters the stored UTXO set by token, authority bits, address, amount
//! bounds and availability. Without an explicit ordering option the store's
//! insertion order is kept, so selection is deterministic and repeatable.

use crate::core::{Authorities, ChainContext, Utxo, UtxoId, MAX_TX_INPUTS, NATIVE_TOKEN_UID};
use crate::storage::{Store, StoreError};
use std::collections::HashSet;
use thiserror::Error;

/// Selection and transaction-balancing errors
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("insufficient funds for token {token}: missing {deficit}")]
    InsufficientFunds { token: String, deficit: i128 },
    #[error("insufficient {authority} authorities for token {token}: missing {needed}")]
    InsufficientAuthorities {
        token: String,
        authority: &'static str,
        needed: usize,
    },
    #[error("transaction would have {count} inputs, maximum is {max}")]
    TooManyInputs { count: usize, max: usize },
    #[error("transaction would have {count} outputs, maximum is {max}")]
    TooManyOutputs { count: usize, max: usize },
    #[error("no change address available")]
    MissingChangeAddress,
}

/// Sort direction for value-ordered selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrder {
    Asc,
    Desc,
}

/// Filters applied by [`select_utxos`]
#[derive(Debug, Clone)]
pub struct UtxoSelectionOptions {
    /// Token uid to select for
    pub token: String,
    /// Authority bits required; empty selects fund UTXOs only
    pub authorities: Authorities,
    /// Only UTXOs owned by this address
    pub filter_address: Option<String>,
    /// Only fund UTXOs with value strictly above this
    pub amount_bigger_than: Option<i128>,
    /// Only fund UTXOs with value strictly below this
    pub amount_smaller_than: Option<i128>,
    /// Stop after this many UTXOs
    pub max_utxos: usize,
    /// Stop once the accumulated value reaches this amount
    pub target_amount: Option<i128>,
    /// Sort candidates by value before taking them
    pub order_by_value: Option<ValueOrder>,
    /// Skip reserved and still-locked UTXOs
    pub only_available: bool,
    /// Override the chain context's reference timestamp for timelock checks
    pub reference_timestamp: Option<u32>,
}

impl Default for UtxoSelectionOptions {
    fn default() -> Self {
        Self {
            token: NATIVE_TOKEN_UID.to_string(),
            authorities: Authorities::empty(),
            filter_address: None,
            amount_bigger_than: None,
            amount_smaller_than: None,
            max_utxos: MAX_TX_INPUTS,
            target_amount: None,
            order_by_value: None,
            only_available: true,
            reference_timestamp: None,
        }
    }
}

impl UtxoSelectionOptions {
    /// Fund selection for one token with a target amount
    pub fn for_amount(token: &str, amount: i128) -> Self {
        Self {
            token: token.to_string(),
            target_amount: Some(amount),
            ..Default::default()
        }
    }

    /// Authority selection for one token
    pub fn for_authority(token: &str, authorities: Authorities) -> Self {
        Self {
            token: token.to_string(),
            authorities,
            ..Default::default()
        }
    }
}

/// Select UTXOs matching the given options
pub fn select_utxos<S: Store>(
    store: &S,
    options: &UtxoSelectionOptions,
    ctx: &ChainContext,
) -> Result<Vec<Utxo>, SelectionError> {
    select_utxos_excluding(store, options, ctx, &HashSet::new())
}

/// Select UTXOs matching the options, skipping an explicit exclusion set
///
/// The exclusion set lets transaction balancing avoid re-selecting UTXOs it
/// already committed to within the same fill pass.
pub fn select_utxos_excluding<S: Store>(
    store: &S,
    options: &UtxoSelectionOptions,
    ctx: &ChainContext,
    exclude: &HashSet<UtxoId>,
) -> Result<Vec<Utxo>, SelectionError> {
    let reference_timestamp = options
        .reference_timestamp
        .unwrap_or(ctx.reference_timestamp);

    let mut candidates = Vec::new();
    for utxo in store.iter_utxos()? {
        if utxo.token != options.token || exclude.contains(&utxo.id()) {
            continue;
        }
        if options.authorities.is_empty() {
            if utxo.is_authority() {
                continue;
            }
            if let Some(min) = options.amount_bigger_than {
                if utxo.value <= min {
                    continue;
                }
            }
            if let Some(max) = options.amount_smaller_than {
                if utxo.value >= max {
                    continue;
                }
            }
        } else if !utxo.authority_flags().contains(options.authorities) {
            continue;
        }
        if let Some(address) = &options.filter_address {
            if &utxo.address != address {
                continue;
            }
        }
        if options.only_available {
            if store.utxo_is_reserved(&utxo.id())? {
                continue;
            }
            if utxo.is_time_locked(reference_timestamp)
                || utxo.is_height_locked(ctx.best_block_height, ctx.reward_lock)
            {
                continue;
            }
        }
        candidates.push(utxo);
    }

    match options.order_by_value {
        Some(ValueOrder::Asc) => candidates.sort_by_key(|u| u.value),
        Some(ValueOrder::Desc) => candidates.sort_by(|a, b| b.value.cmp(&a.value)),
        None => {}
    }

    let mut selected = Vec::new();
    let mut total: i128 = 0;
    for utxo in candidates {
        if selected.len() >= options.max_utxos {
            break;
        }
        total += utxo.value;
        selected.push(utxo);
        if let Some(target) = options.target_amount {
            if total >= target {
                break;
            }
        }
    }

    log::debug!(
        "selected {} utxos for token {} (total {})",
        selected.len(),
        options.token,
        total
    );
    Ok(selected)
}

// =============================================================================
// Tests
// =============================================================================
