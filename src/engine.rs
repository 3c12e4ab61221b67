//! Ledger engine facade
//!
//! The single entry point collaborators use: transaction ingestion, history
//! rebuilds, lock sweeps, coin selection, transaction balancing, reservation
//! flags and address scanning. Every ledger mutation takes `&mut self`, so
//! processing steps are serialized by construction.

use crate::core::{
    AddressInfo, ChainContext, HistoryTx, Utxo, UtxoId, DEFAULT_REWARD_LOCK, MAX_TX_INPUTS,
    MAX_TX_OUTPUTS,
};
use crate::ledger::{self, ProcessError, ProcessResult};
use crate::scan::{AddressRange, ScanPolicy};
use crate::selection::{self, FillOptions, FillResult, PartialTx, SelectionError, UtxoSelectionOptions};
use crate::storage::{Store, StoreError};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Confirmations required before block rewards unlock
    pub reward_lock: u32,
    /// Input limit enforced when balancing transactions
    pub max_inputs: usize,
    /// Output limit enforced when balancing transactions
    pub max_outputs: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reward_lock: DEFAULT_REWARD_LOCK,
            max_inputs: MAX_TX_INPUTS,
            max_outputs: MAX_TX_OUTPUTS,
        }
    }
}

/// Wallet-side ledger engine over a store
pub struct LedgerEngine<S: Store> {
    store: S,
    settings: EngineSettings,
}

impl<S: Store> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    pub fn with_settings(store: S, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Chain context for lock evaluation. Without an explicit reference
    /// timestamp the current wall clock is used.
    fn chain_context(&self, reference_timestamp: Option<u32>) -> Result<ChainContext, StoreError> {
        let wallet = self.store.get_wallet_data()?;
        Ok(ChainContext {
            reference_timestamp: reference_timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp() as u32),
            best_block_height: wallet.best_block_height,
            reward_lock: self.settings.reward_lock,
        })
    }

    // -------------------------------------------------------------------------
    // Transaction ingestion
    // -------------------------------------------------------------------------

    /// Ingest one transaction from the sync layer
    ///
    /// Dispatches on what the store already knows:
    /// - unknown tx: save and process it;
    /// - known tx, same voided state: save and re-sync UTXO metadata only;
    /// - known tx, voided state flipped: save and rebuild the whole history
    ///   (additive balance math cannot subtract a void in place).
    pub fn add_tx(
        &mut self,
        tx: HistoryTx,
        reference_timestamp: Option<u32>,
    ) -> Result<ProcessResult, ProcessError> {
        let ctx = self.chain_context(reference_timestamp)?;
        match self.store.get_tx(&tx.tx_id)? {
            Some(stored) if stored.is_voided == tx.is_voided => {
                self.store.save_tx(tx.clone())?;
                ledger::process_metadata_changed(&mut self.store, &tx, &ctx)?;
                Ok(ProcessResult::default())
            }
            Some(_) => {
                log::info!("tx {} voided state flipped, rebuilding history", tx.tx_id);
                self.store.save_tx(tx)?;
                ledger::process_history(&mut self.store, &ctx)
            }
            None => {
                self.store.save_tx(tx.clone())?;
                let result = ledger::process_new_tx(&mut self.store, &tx, &ctx)?;
                if let Some(index) = result.max_address_index {
                    ledger::update_wallet_indices(&mut self.store, index)?;
                }
                Ok(result)
            }
        }
    }

    /// Process an already stored transaction as if newly seen
    pub fn process_new_tx(
        &mut self,
        tx: &HistoryTx,
        reference_timestamp: Option<u32>,
    ) -> Result<ProcessResult, ProcessError> {
        let ctx = self.chain_context(reference_timestamp)?;
        ledger::process_new_tx(&mut self.store, tx, &ctx)
    }

    /// Rebuild all derived state from the stored history
    pub fn process_history(
        &mut self,
        reference_timestamp: Option<u32>,
    ) -> Result<ProcessResult, ProcessError> {
        let ctx = self.chain_context(reference_timestamp)?;
        ledger::process_history(&mut self.store, &ctx)
    }

    /// Sweep the locked-UTXO index and promote everything whose locks expired
    pub fn unlock_utxos(
        &mut self,
        reference_timestamp: Option<u32>,
    ) -> Result<Vec<Utxo>, ProcessError> {
        let ctx = self.chain_context(reference_timestamp)?;
        ledger::unlock_utxos(&mut self.store, &ctx)
    }

    // -------------------------------------------------------------------------
    // Chain height
    // -------------------------------------------------------------------------

    pub fn get_current_height(&self) -> Result<u32, ProcessError> {
        Ok(self.store.get_wallet_data()?.best_block_height)
    }

    /// Record a new best height and run the unlock sweep, since reward locks
    /// may have expired. Returns the promoted UTXOs.
    pub fn set_current_height(&mut self, height: u32) -> Result<Vec<Utxo>, ProcessError> {
        let mut wallet = self.store.get_wallet_data()?;
        wallet.best_block_height = height;
        self.store.save_wallet_data(wallet)?;
        self.unlock_utxos(None)
    }

    // -------------------------------------------------------------------------
    // Selection and balancing
    // -------------------------------------------------------------------------

    pub fn get_all_utxos(&self) -> Result<Vec<Utxo>, ProcessError> {
        Ok(self.store.iter_utxos()?)
    }

    pub fn select_utxos(
        &self,
        options: &UtxoSelectionOptions,
        reference_timestamp: Option<u32>,
    ) -> Result<Vec<Utxo>, SelectionError> {
        let ctx = self.chain_context(reference_timestamp)?;
        selection::select_utxos(&self.store, options, &ctx)
    }

    /// Complete a partial transaction
    ///
    /// Without explicit options the wallet's current address receives the
    /// change. Engine limits override whatever the options carry.
    pub fn fill_tx(
        &mut self,
        tx: &PartialTx,
        options: Option<FillOptions>,
        reference_timestamp: Option<u32>,
    ) -> Result<FillResult, SelectionError> {
        let ctx = self.chain_context(reference_timestamp)?;
        let mut options = match options {
            Some(options) => options,
            None => FillOptions::new(&self.change_address()?),
        };
        options.max_inputs = self.settings.max_inputs;
        options.max_outputs = self.settings.max_outputs;
        selection::fill_tx(&mut self.store, tx, &ctx, &options)
    }

    /// The wallet's current (next unused) address
    pub fn current_address(&self) -> Result<AddressInfo, ProcessError> {
        let wallet = self.store.get_wallet_data()?;
        self.store
            .get_address_at_index(wallet.current_address_index)?
            .ok_or(ProcessError::WalletNotInitialized)
    }

    fn change_address(&self) -> Result<String, SelectionError> {
        let wallet = self.store.get_wallet_data()?;
        self.store
            .get_address_at_index(wallet.current_address_index)?
            .map(|info| info.base58)
            .ok_or(SelectionError::MissingChangeAddress)
    }

    // -------------------------------------------------------------------------
    // UTXO reservation
    // -------------------------------------------------------------------------

    /// Mark or clear a UTXO's reservation flag
    pub fn utxo_select_as_input(
        &mut self,
        id: &UtxoId,
        mark: bool,
        ttl: Option<Duration>,
    ) -> Result<bool, ProcessError> {
        Ok(self.store.utxo_set_reserved(id, mark, ttl)?)
    }

    pub fn is_utxo_selected_as_input(&self, id: &UtxoId) -> Result<bool, ProcessError> {
        Ok(self.store.utxo_is_reserved(id)?)
    }

    pub fn utxo_selected_as_input_iter(&self) -> Result<Vec<UtxoId>, ProcessError> {
        Ok(self.store.iter_reserved_utxos()?)
    }

    /// Drop reservations past their TTL; returns how many were removed
    pub fn purge_expired_reservations(&mut self) -> Result<usize, ProcessError> {
        Ok(self.store.purge_expired_reservations()?)
    }

    // -------------------------------------------------------------------------
    // Address scanning
    // -------------------------------------------------------------------------

    pub fn get_scanning_policy(&self) -> Result<ScanPolicy, ProcessError> {
        Ok(self.store.get_wallet_data()?.scan_policy)
    }

    pub fn set_scanning_policy_data(&mut self, policy: ScanPolicy) -> Result<(), ProcessError> {
        let mut wallet = self.store.get_wallet_data()?;
        wallet.scan_policy = policy;
        Ok(self.store.save_wallet_data(wallet)?)
    }

    /// Address range to derive for a wallet starting from scratch
    pub fn start_addresses(&self) -> Result<AddressRange, ProcessError> {
        let wallet = self.store.get_wallet_data()?;
        Ok(wallet.scan_policy.start_addresses()?)
    }

    /// Whether the active policy wants more addresses loaded
    pub fn check_scanning_policy(&self) -> Result<Option<AddressRange>, ProcessError> {
        let wallet = self.store.get_wallet_data()?;
        Ok(wallet.scan_policy.check(&wallet)?)
    }

    /// Persist a batch of derived addresses and advance the loaded index
    pub fn load_addresses(&mut self, addresses: Vec<AddressInfo>) -> Result<(), ProcessError> {
        let mut max_index = None;
        for info in addresses {
            max_index = Some(max_index.map_or(info.bip32_index, |m: u32| m.max(info.bip32_index)));
            self.store.save_address(info)?;
        }
        if let Some(index) = max_index {
            let mut wallet = self.store.get_wallet_data()?;
            wallet.mark_loaded_up_to(index);
            self.store.save_wallet_data(wallet)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxInput, TxOutput, NATIVE_TOKEN_UID};
    use crate::selection::PartialOutput;
    use crate::storage::MemoryStore;

    const REF_TS: u32 = 1_000_000;

    fn make_engine(addresses: u32) -> LedgerEngine<MemoryStore> {
        let mut engine = LedgerEngine::new(MemoryStore::new());
        let batch: Vec<AddressInfo> = (0..addresses)
            .map(|i| AddressInfo::new(&format!("addr{}", i), i))
            .collect();
        engine.load_addresses(batch).unwrap();
        engine
    }

    fn fund_tx(tx_id: &str, address: &str, value: i128) -> HistoryTx {
        HistoryTx {
            tx_id: tx_id.to_string(),
            version: 1,
            timestamp: 100,
            is_voided: false,
            height: None,
            inputs: vec![],
            outputs: vec![TxOutput {
                value,
                token: NATIVE_TOKEN_UID.to_string(),
                token_data: 0,
                address: Some(address.to_string()),
                timelock: None,
                spent_by: None,
            }],
            token_name: None,
            token_symbol: None,
            nc_id: None,
            nc_address: None,
            nc_seqnum: None,
        }
    }

    #[test]
    fn test_add_tx_and_balances() {
        let mut engine = make_engine(5);
        let result = engine
            .add_tx(fund_tx("tx1", "addr1", 100), Some(REF_TS))
            .unwrap();

        assert_eq!(result.max_address_index, Some(1));
        let meta = engine
            .store()
            .get_token_meta(NATIVE_TOKEN_UID)
            .unwrap()
            .unwrap();
        assert_eq!(meta.balance.tokens.unlocked, 100);

        // The used index advanced the current address
        let wallet = engine.store().get_wallet_data().unwrap();
        assert_eq!(wallet.last_used_address_index, Some(1));
        assert_eq!(wallet.current_address_index, 2);
        assert_eq!(engine.current_address().unwrap().base58, "addr2");
    }

    #[test]
    fn test_add_tx_same_state_does_not_double_count() {
        let mut engine = make_engine(2);
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();

        let meta = engine
            .store()
            .get_token_meta(NATIVE_TOKEN_UID)
            .unwrap()
            .unwrap();
        assert_eq!(meta.balance.tokens.unlocked, 100);
        assert_eq!(meta.num_transactions, 1);
        assert_eq!(engine.get_all_utxos().unwrap().len(), 1);
    }

    #[test]
    fn test_voided_flip_rebuilds() {
        let mut engine = make_engine(2);
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();
        engine
            .add_tx(fund_tx("tx2", "addr1", 40), Some(REF_TS))
            .unwrap();

        let mut voided = fund_tx("tx1", "addr0", 100);
        voided.is_voided = true;
        engine.add_tx(voided, Some(REF_TS)).unwrap();

        let meta = engine
            .store()
            .get_token_meta(NATIVE_TOKEN_UID)
            .unwrap()
            .unwrap();
        assert_eq!(meta.balance.tokens.unlocked, 40);
        assert_eq!(meta.num_transactions, 1);

        let utxos = engine.get_all_utxos().unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].tx_id, "tx2");
    }

    #[test]
    fn test_set_current_height_unlocks_rewards() {
        let mut engine = make_engine(1);
        let mut block = fund_tx("block1", "addr0", 6400);
        block.version = crate::core::BLOCK_VERSION;
        block.height = Some(100);
        engine.add_tx(block, Some(REF_TS)).unwrap();

        let meta = engine
            .store()
            .get_token_meta(NATIVE_TOKEN_UID)
            .unwrap()
            .unwrap();
        assert_eq!(meta.balance.tokens.locked, 6400);

        // Height 399: still inside the reward window
        assert!(engine.set_current_height(399).unwrap().is_empty());

        // Height 400: 100 + 300 <= 400, the reward unlocks
        let unlocked = engine.set_current_height(400).unwrap();
        assert_eq!(unlocked.len(), 1);
        let meta = engine
            .store()
            .get_token_meta(NATIVE_TOKEN_UID)
            .unwrap()
            .unwrap();
        assert_eq!(meta.balance.tokens.unlocked, 6400);
        assert_eq!(meta.balance.tokens.locked, 0);
    }

    #[test]
    fn test_fill_tx_uses_current_address_for_change() {
        let mut engine = make_engine(3);
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();

        let tx = PartialTx {
            inputs: vec![],
            outputs: vec![PartialOutput::fund("dest", NATIVE_TOKEN_UID, 60)],
        };
        let result = engine.fill_tx(&tx, None, Some(REF_TS)).unwrap();

        assert_eq!(result.inputs.len(), 1);
        assert_eq!(result.outputs.len(), 1);
        assert_eq!(result.outputs[0].value, 40);
        // addr0 was used, so change goes to addr1
        assert_eq!(result.outputs[0].address, "addr1");
    }

    #[test]
    fn test_fill_tx_without_addresses_fails() {
        let mut engine = LedgerEngine::new(MemoryStore::new());
        let tx = PartialTx::default();
        let err = engine.fill_tx(&tx, None, Some(REF_TS)).unwrap_err();
        assert!(matches!(err, SelectionError::MissingChangeAddress));
    }

    #[test]
    fn test_engine_limits_override_fill_options() {
        let mut engine = LedgerEngine::with_settings(
            MemoryStore::new(),
            EngineSettings {
                max_outputs: 1,
                ..EngineSettings::default()
            },
        );
        engine
            .load_addresses(vec![AddressInfo::new("addr0", 0)])
            .unwrap();
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();

        // One payment output plus the change output exceeds max_outputs = 1
        let tx = PartialTx {
            inputs: vec![],
            outputs: vec![PartialOutput::fund("dest", NATIVE_TOKEN_UID, 60)],
        };
        let err = engine.fill_tx(&tx, None, Some(REF_TS)).unwrap_err();
        assert!(matches!(err, SelectionError::TooManyOutputs { .. }));
    }

    #[test]
    fn test_reservation_roundtrip() {
        let mut engine = make_engine(1);
        engine
            .add_tx(fund_tx("tx1", "addr0", 100), Some(REF_TS))
            .unwrap();

        let id = UtxoId::new("tx1", 0);
        assert!(engine.utxo_select_as_input(&id, true, None).unwrap());
        assert!(engine.is_utxo_selected_as_input(&id).unwrap());
        assert_eq!(engine.utxo_selected_as_input_iter().unwrap(), vec![id.clone()]);

        // Reserved UTXOs are invisible to selection
        let selected = engine
            .select_utxos(&UtxoSelectionOptions::default(), Some(REF_TS))
            .unwrap();
        assert!(selected.is_empty());

        // Spending the UTXO clears the flag
        let spend = HistoryTx {
            tx_id: "tx2".to_string(),
            version: 1,
            timestamp: 200,
            is_voided: false,
            height: None,
            inputs: vec![TxInput {
                tx_id: "tx1".to_string(),
                index: 0,
                token: NATIVE_TOKEN_UID.to_string(),
                value: 100,
                token_data: 0,
                address: Some("addr0".to_string()),
                timelock: None,
            }],
            outputs: vec![],
            token_name: None,
            token_symbol: None,
            nc_id: None,
            nc_address: None,
            nc_seqnum: None,
        };
        engine.add_tx(spend, Some(REF_TS)).unwrap();
        assert!(!engine.is_utxo_selected_as_input(&id).unwrap());
    }

    #[test]
    fn test_scanning_policy_flow() {
        let mut engine = LedgerEngine::new(MemoryStore::new());

        let start = engine.start_addresses().unwrap();
        assert_eq!(start, AddressRange { next_index: 0, count: 20 });

        let batch: Vec<AddressInfo> = (0..start.count)
            .map(|i| AddressInfo::new(&format!("addr{}", i), i))
            .collect();
        engine.load_addresses(batch).unwrap();
        assert_eq!(engine.check_scanning_policy().unwrap(), None);

        engine
            .add_tx(fund_tx("tx1", "addr5", 1), Some(REF_TS))
            .unwrap();
        // loaded up to 19, used 5: 5 + 20 > 20 -> six more addresses
        let range = engine.check_scanning_policy().unwrap().unwrap();
        assert_eq!(range, AddressRange { next_index: 20, count: 6 });

        let batch: Vec<AddressInfo> = (range.next_index..range.next_index + range.count)
            .map(|i| AddressInfo::new(&format!("addr{}", i), i))
            .collect();
        engine.load_addresses(batch).unwrap();
        assert_eq!(engine.check_scanning_policy().unwrap(), None);
    }

    #[test]
    fn test_set_scanning_policy() {
        let mut engine = LedgerEngine::new(MemoryStore::new());
        engine
            .set_scanning_policy_data(ScanPolicy::IndexLimit {
                start_index: 0,
                end_index: 4,
            })
            .unwrap();

        let start = engine.start_addresses().unwrap();
        assert_eq!(start, AddressRange { next_index: 0, count: 5 });
    }
}
