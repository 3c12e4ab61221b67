//! Transaction balancing
//!
//! Takes a partially built transaction and completes it: for every token the
//! inputs must cover the outputs, missing funds are covered by selecting
//! UTXOs, and any overshoot comes back as a change output. Authority units
//! are balanced the same way, one unit per authority output.

use crate::core::{
    Authorities, ChainContext, Utxo, UtxoId, MAX_TX_INPUTS, MAX_TX_OUTPUTS,
};
use crate::selection::selector::{
    select_utxos_excluding, SelectionError, UtxoSelectionOptions,
};
use crate::storage::Store;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

// =============================================================================
// Partial Transaction
// =============================================================================

/// An output of a transaction under construction
#[derive(Debug, Clone, PartialEq)]
pub struct PartialOutput {
    pub address: String,
    pub token: String,
    /// Amount for fund outputs, authority bits for authority outputs
    pub value: i128,
    /// Authority bits, zero for fund outputs
    pub authorities: u8,
    pub timelock: Option<u32>,
}

impl PartialOutput {
    /// A plain fund output
    pub fn fund(address: &str, token: &str, value: i128) -> Self {
        Self {
            address: address.to_string(),
            token: token.to_string(),
            value,
            authorities: 0,
            timelock: None,
        }
    }

    /// An authority output granting the given bits
    pub fn authority(address: &str, token: &str, authorities: Authorities) -> Self {
        Self {
            address: address.to_string(),
            token: token.to_string(),
            value: authorities.bits() as i128,
            authorities: authorities.bits(),
            timelock: None,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.authorities != 0
    }

    pub fn authority_flags(&self) -> Authorities {
        Authorities::from_bits_truncate(self.authorities)
    }
}

/// A transaction under construction: inputs are UTXOs the wallet will spend,
/// outputs are what it intends to create
#[derive(Debug, Clone, Default)]
pub struct PartialTx {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<PartialOutput>,
}

/// Per-token input-minus-output balance of a partial transaction
///
/// Negative means the outputs need more than the inputs provide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxTokenBalance {
    pub funds: i128,
    pub mint: i64,
    pub melt: i64,
}

/// Compute the per-token balance of a partial transaction
pub fn tx_token_balances(tx: &PartialTx) -> HashMap<String, TxTokenBalance> {
    let mut balances: HashMap<String, TxTokenBalance> = HashMap::new();

    for input in &tx.inputs {
        let balance = balances.entry(input.token.clone()).or_default();
        if input.is_authority() {
            let flags = input.authority_flags();
            if flags.contains(Authorities::MINT) {
                balance.mint += 1;
            }
            if flags.contains(Authorities::MELT) {
                balance.melt += 1;
            }
        } else {
            balance.funds += input.value;
        }
    }

    for output in &tx.outputs {
        let balance = balances.entry(output.token.clone()).or_default();
        if output.is_authority() {
            let flags = output.authority_flags();
            if flags.contains(Authorities::MINT) {
                balance.mint -= 1;
            }
            if flags.contains(Authorities::MELT) {
                balance.melt -= 1;
            }
        } else {
            balance.funds -= output.value;
        }
    }

    balances
}

// =============================================================================
// Balancing
// =============================================================================

/// Options for [`fill_tx`]
#[derive(Debug, Clone)]
pub struct FillOptions {
    /// Address receiving change outputs
    pub change_address: String,
    /// Whether missing funds may be covered by selecting UTXOs; when false a
    /// deficit is an immediate error
    pub choose_inputs: bool,
    /// Reserve the selected inputs on success
    pub mark_as_selected: bool,
    /// TTL for the reservation, if any
    pub reservation_ttl: Option<Duration>,
    /// Input limit for the completed transaction
    pub max_inputs: usize,
    /// Output limit for the completed transaction
    pub max_outputs: usize,
}

impl FillOptions {
    pub fn new(change_address: &str) -> Self {
        Self {
            change_address: change_address.to_string(),
            choose_inputs: true,
            mark_as_selected: false,
            reservation_ttl: None,
            max_inputs: MAX_TX_INPUTS,
            max_outputs: MAX_TX_OUTPUTS,
        }
    }
}

/// What [`fill_tx`] adds to the partial transaction
#[derive(Debug, Clone, Default)]
pub struct FillResult {
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<PartialOutput>,
}

/// Balance one token's fund amount
///
/// Deficit selects UTXOs to cover it (change output for any overshoot),
/// surplus becomes a change output, an exact zero adds nothing.
pub fn match_balance_selection<S: Store>(
    store: &S,
    ctx: &ChainContext,
    token: &str,
    balance: i128,
    change_address: &str,
    choose_inputs: bool,
    exclude: &mut HashSet<UtxoId>,
) -> Result<(Vec<Utxo>, Option<PartialOutput>), SelectionError> {
    use std::cmp::Ordering;

    match balance.cmp(&0) {
        Ordering::Less => {
            let deficit = -balance;
            if !choose_inputs {
                return Err(SelectionError::InsufficientFunds {
                    token: token.to_string(),
                    deficit,
                });
            }
            let options = UtxoSelectionOptions::for_amount(token, deficit);
            let selected = select_utxos_excluding(store, &options, ctx, exclude)?;
            let total: i128 = selected.iter().map(|u| u.value).sum();
            if total < deficit {
                return Err(SelectionError::InsufficientFunds {
                    token: token.to_string(),
                    deficit: deficit - total,
                });
            }
            for utxo in &selected {
                exclude.insert(utxo.id());
            }
            let change = (total > deficit)
                .then(|| PartialOutput::fund(change_address, token, total - deficit));
            Ok((selected, change))
        }
        Ordering::Greater => Ok((
            Vec::new(),
            Some(PartialOutput::fund(change_address, token, balance)),
        )),
        Ordering::Equal => Ok((Vec::new(), None)),
    }
}

/// Balance one token's authority units of one kind
///
/// Returns the selected inputs, any authority change outputs, and how many
/// units of the *other* authority kind the selected inputs happen to carry.
fn match_authority_selection<S: Store>(
    store: &S,
    ctx: &ChainContext,
    token: &str,
    authority: Authorities,
    balance: i64,
    change_address: &str,
    choose_inputs: bool,
    exclude: &mut HashSet<UtxoId>,
) -> Result<(Vec<Utxo>, Vec<PartialOutput>, i64), SelectionError> {
    if balance == 0 {
        return Ok((Vec::new(), Vec::new(), 0));
    }

    if balance > 0 {
        // Surplus units come back as one authority output per unit
        let outputs = (0..balance)
            .map(|_| PartialOutput::authority(change_address, token, authority))
            .collect();
        return Ok((Vec::new(), outputs, 0));
    }

    let needed = (-balance) as usize;
    if !choose_inputs {
        return Err(SelectionError::InsufficientAuthorities {
            token: token.to_string(),
            authority: authority.kind_name(),
            needed,
        });
    }

    let options = UtxoSelectionOptions::for_authority(token, authority);
    let mut candidates = select_utxos_excluding(store, &options, ctx, exclude)?;
    // Prefer single-authority UTXOs so a dual mint+melt UTXO is only spent
    // when nothing narrower covers the need.
    candidates.sort_by_key(|u| u.authority_flags().bits().count_ones());

    if candidates.len() < needed {
        return Err(SelectionError::InsufficientAuthorities {
            token: token.to_string(),
            authority: authority.kind_name(),
            needed: needed - candidates.len(),
        });
    }

    let selected: Vec<Utxo> = candidates.into_iter().take(needed).collect();
    let other = authority ^ (Authorities::MINT | Authorities::MELT);
    let mut other_units = 0i64;
    for utxo in &selected {
        exclude.insert(utxo.id());
        if utxo.authority_flags().contains(other) {
            other_units += 1;
        }
    }

    Ok((selected, Vec::new(), other_units))
}

/// Complete a partial transaction
///
/// Computes per-token balances, covers every deficit by selecting UTXOs and
/// returns the inputs and outputs to add. Input/output limits are checked
/// before any reservation is written, so a failed fill leaves no trace.
pub fn fill_tx<S: Store>(
    store: &mut S,
    tx: &PartialTx,
    ctx: &ChainContext,
    options: &FillOptions,
) -> Result<FillResult, SelectionError> {
    let balances = tx_token_balances(tx);
    let mut result = FillResult::default();
    let mut exclude: HashSet<UtxoId> = tx.inputs.iter().map(|u| u.id()).collect();

    // Deterministic token order
    let mut tokens: Vec<&String> = balances.keys().collect();
    tokens.sort();

    for token in tokens {
        let balance = balances[token];

        let (inputs, change) = match_balance_selection(
            store,
            ctx,
            token,
            balance.funds,
            &options.change_address,
            options.choose_inputs,
            &mut exclude,
        )?;
        result.inputs.extend(inputs);
        result.outputs.extend(change);

        let (mint_inputs, mint_changes, extra_melt) = match_authority_selection(
            store,
            ctx,
            token,
            Authorities::MINT,
            balance.mint,
            &options.change_address,
            options.choose_inputs,
            &mut exclude,
        )?;
        result.inputs.extend(mint_inputs);
        result.outputs.extend(mint_changes);

        // Mint-selected dual-authority UTXOs also bring melt units along
        let (melt_inputs, melt_changes, extra_mint) = match_authority_selection(
            store,
            ctx,
            token,
            Authorities::MELT,
            balance.melt + extra_melt,
            &options.change_address,
            options.choose_inputs,
            &mut exclude,
        )?;
        result.inputs.extend(melt_inputs);
        result.outputs.extend(melt_changes);

        // Surplus mint units carried by melt-selected UTXOs come back as change
        for _ in 0..extra_mint {
            result.outputs.push(PartialOutput::authority(
                &options.change_address,
                token,
                Authorities::MINT,
            ));
        }
    }

    let input_count = tx.inputs.len() + result.inputs.len();
    if input_count > options.max_inputs {
        return Err(SelectionError::TooManyInputs {
            count: input_count,
            max: options.max_inputs,
        });
    }
    let output_count = tx.outputs.len() + result.outputs.len();
    if output_count > options.max_outputs {
        return Err(SelectionError::TooManyOutputs {
            count: output_count,
            max: options.max_outputs,
        });
    }

    if options.mark_as_selected {
        for utxo in &result.inputs {
            store.utxo_set_reserved(&utxo.id(), true, options.reservation_ttl)?;
        }
    }

    log::debug!(
        "fill added {} inputs and {} outputs",
        result.inputs.len(),
        result.outputs.len()
    );
    Ok(result)
}

// =============================================================================
// Tests
// =============================================================================
