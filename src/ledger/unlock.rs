//! Locked-UTXO lifecycle
//!
//! Locked UTXOs live in a dedicated index alongside the main UTXO set. When a
//! lock expires (a timelock passes or the chain grows past a block reward's
//! lock window) the balance moves from the locked to the unlocked bucket.
//! Deleting the locked-index entry is the promotion's single-fire guard:
//! because the entry is removed before any balance moves, running the unlock
//! pass twice can never promote the same amount twice.

use crate::core::{ChainContext, Utxo};
use crate::ledger::processor::ProcessError;
use crate::storage::Store;

/// Lock status of a UTXO at a given chain context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// Timelocked until this timestamp
    TimeLocked(u32),
    /// Block reward locked until this height
    HeightLocked(u32),
}

/// Evaluate a UTXO's lock predicates against the chain context
pub fn lock_state(utxo: &Utxo, ctx: &ChainContext) -> LockState {
    if utxo.is_time_locked(ctx.reference_timestamp) {
        // Checked above, so the timelock is present
        LockState::TimeLocked(utxo.timelock.unwrap_or(0))
    } else if utxo.is_height_locked(ctx.best_block_height, ctx.reward_lock) {
        LockState::HeightLocked(
            utxo.height
                .unwrap_or(0)
                .saturating_add(ctx.reward_lock),
        )
    } else {
        LockState::Unlocked
    }
}

/// Promote one UTXO from locked to unlocked
///
/// No-op if the UTXO has no locked-index entry (already promoted or never
/// locked).
pub fn process_utxo_unlock<S: Store>(store: &mut S, utxo: &Utxo) -> Result<(), ProcessError> {
    if !store.delete_locked_utxo(&utxo.id())? {
        return Ok(());
    }

    log::debug!("unlocking utxo {} ({} {})", utxo.id(), utxo.value, utxo.token);

    let mut token_meta = store.get_token_meta(&utxo.token)?.unwrap_or_default();
    let mut address_meta = store.get_address_meta(&utxo.address)?.unwrap_or_default();

    if utxo.is_authority() {
        let authorities = utxo.authority_flags();
        token_meta.balance.authorities.promote(authorities);
        address_meta
            .balance_mut(&utxo.token)
            .authorities
            .promote(authorities);
    } else {
        token_meta.balance.tokens.promote(utxo.value);
        address_meta.balance_mut(&utxo.token).tokens.promote(utxo.value);
    }

    store.save_token_meta(&utxo.token, token_meta)?;
    store.save_address_meta(&utxo.address, address_meta)?;
    Ok(())
}

/// Sweep the locked index and promote every UTXO whose locks have expired
///
/// Returns the promoted UTXOs.
pub fn unlock_utxos<S: Store>(store: &mut S, ctx: &ChainContext) -> Result<Vec<Utxo>, ProcessError> {
    let mut unlocked = Vec::new();
    for utxo in store.iter_locked_utxos()? {
        if lock_state(&utxo, ctx) == LockState::Unlocked {
            process_utxo_unlock(store, &utxo)?;
            unlocked.push(utxo);
        }
    }
    if !unlocked.is_empty() {
        log::info!("unlocked {} utxos", unlocked.len());
    }
    Ok(unlocked)
}

// =============================================================================
// Tests
// =============================================================================
