//! Wallet-wide bookkeeping data

use crate::scan::ScanPolicy;
use serde::{Deserialize, Serialize};

/// Wallet-wide indices and configuration
///
/// The index fields are advanced by the history processor; the scanning
/// policy is explicit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletData {
    /// Highest derived-and-persisted address index, `None` before the first
    /// load
    pub last_loaded_address_index: Option<u32>,
    /// Highest address index seen in a processed transaction
    pub last_used_address_index: Option<u32>,
    /// Next address handed out for change/receive
    pub current_address_index: u32,
    /// Best block height reported by the full node
    pub best_block_height: u32,
    /// Active address scanning policy
    pub scan_policy: ScanPolicy,
}

impl Default for WalletData {
    fn default() -> Self {
        Self {
            last_loaded_address_index: None,
            last_used_address_index: None,
            current_address_index: 0,
            best_block_height: 0,
            scan_policy: ScanPolicy::default(),
        }
    }
}

impl WalletData {
    /// Record that addresses up to `index` have been derived and persisted
    pub fn mark_loaded_up_to(&mut self, index: u32) {
        match self.last_loaded_address_index {
            Some(current) if current >= index => {}
            _ => self.last_loaded_address_index = Some(index),
        }
    }

    /// Record that an address index appeared in a processed transaction,
    /// advancing the current-address pointer past it
    pub fn mark_used(&mut self, index: u32) {
        match self.last_used_address_index {
            Some(current) if current >= index => {}
            _ => self.last_used_address_index = Some(index),
        }
        let next = index.saturating_add(1);
        let ceiling = self.last_loaded_address_index.unwrap_or(next);
        if self.current_address_index <= index {
            self.current_address_index = next.min(ceiling);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_loaded_is_monotonic() {
        let mut data = WalletData::default();
        data.mark_loaded_up_to(19);
        assert_eq!(data.last_loaded_address_index, Some(19));

        data.mark_loaded_up_to(10);
        assert_eq!(data.last_loaded_address_index, Some(19));

        data.mark_loaded_up_to(25);
        assert_eq!(data.last_loaded_address_index, Some(25));
    }

    #[test]
    fn test_mark_used_advances_current() {
        let mut data = WalletData::default();
        data.mark_loaded_up_to(19);

        data.mark_used(4);
        assert_eq!(data.last_used_address_index, Some(4));
        assert_eq!(data.current_address_index, 5);

        // Lower index does not move anything backwards
        data.mark_used(2);
        assert_eq!(data.last_used_address_index, Some(4));
        assert_eq!(data.current_address_index, 5);
    }

    #[test]
    fn test_current_capped_at_last_loaded() {
        let mut data = WalletData::default();
        data.mark_loaded_up_to(5);

        data.mark_used(5);
        assert_eq!(data.current_address_index, 5);
    }
}
