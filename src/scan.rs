//! Address scanning policy
//!
//! Decides how many addresses must be derived and watched. Two variants:
//! a BIP-44 style gap limit, and a fixed index range that never auto-expands.
//! Callers load the returned range, persist the addresses, then re-check;
//! a single check never recurses.

use crate::core::wallet::WalletData;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default gap limit (consecutive unused addresses kept loaded)
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Scanning policy errors
#[derive(Error, Debug)]
pub enum ScanPolicyError {
    #[error("invalid index-limit range: start {start} is after end {end}")]
    InvalidRange { start: u32, end: u32 },
}

/// A contiguous range of address indices to derive and load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    /// First index to derive
    pub next_index: u32,
    /// Number of addresses to derive
    pub count: u32,
}

/// Address scanning policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Keep `gap_limit` unused addresses loaded beyond the last used one
    GapLimit { gap_limit: u32 },
    /// Watch exactly the `[start_index, end_index]` range
    IndexLimit { start_index: u32, end_index: u32 },
}

impl Default for ScanPolicy {
    fn default() -> Self {
        ScanPolicy::GapLimit {
            gap_limit: DEFAULT_GAP_LIMIT,
        }
    }
}

impl ScanPolicy {
    /// Range of addresses to load when the wallet starts from scratch
    pub fn start_addresses(&self) -> Result<AddressRange, ScanPolicyError> {
        match *self {
            ScanPolicy::GapLimit { gap_limit } => Ok(AddressRange {
                next_index: 0,
                count: gap_limit,
            }),
            ScanPolicy::IndexLimit {
                start_index,
                end_index,
            } => {
                if end_index < start_index {
                    return Err(ScanPolicyError::InvalidRange {
                        start: start_index,
                        end: end_index,
                    });
                }
                Ok(AddressRange {
                    next_index: start_index,
                    count: end_index - start_index + 1,
                })
            }
        }
    }

    /// Check whether more addresses must be loaded under the active policy
    pub fn check(&self, wallet: &WalletData) -> Result<Option<AddressRange>, ScanPolicyError> {
        match *self {
            ScanPolicy::GapLimit { gap_limit } => Ok(check_gap_limit(gap_limit, wallet)),
            ScanPolicy::IndexLimit {
                start_index,
                end_index,
            } => check_index_limit(start_index, end_index, wallet),
        }
    }
}

/// Gap-limit check
///
/// Fires when the loaded window no longer covers `gap_limit` addresses past
/// the last used index; a fresh wallet's unused index counts as -1 so the
/// initial window of `gap_limit` addresses satisfies the policy.
pub fn check_gap_limit(gap_limit: u32, wallet: &WalletData) -> Option<AddressRange> {
    let last_loaded = wallet.last_loaded_address_index.map(i64::from).unwrap_or(-1);
    let last_used = wallet.last_used_address_index.map(i64::from).unwrap_or(-1);

    if last_used + i64::from(gap_limit) > last_loaded + 1 {
        Some(AddressRange {
            next_index: (last_loaded + 1) as u32,
            count: (last_used + i64::from(gap_limit) - last_loaded) as u32,
        })
    } else {
        None
    }
}

/// Index-limit check: load up to `end_index`, never beyond
pub fn check_index_limit(
    start_index: u32,
    end_index: u32,
    wallet: &WalletData,
) -> Result<Option<AddressRange>, ScanPolicyError> {
    if end_index < start_index {
        return Err(ScanPolicyError::InvalidRange {
            start: start_index,
            end: end_index,
        });
    }

    let last_loaded = wallet.last_loaded_address_index.map(i64::from).unwrap_or(-1);
    if last_loaded < i64::from(end_index) {
        let next = (last_loaded + 1).max(i64::from(start_index));
        Ok(Some(AddressRange {
            next_index: next as u32,
            count: (i64::from(end_index) - next + 1) as u32,
        }))
    } else {
        Ok(None)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(loaded: Option<u32>, used: Option<u32>) -> WalletData {
        WalletData {
            last_loaded_address_index: loaded,
            last_used_address_index: used,
            ..Default::default()
        }
    }

    #[test]
    fn test_gap_limit_start_addresses() {
        let policy = ScanPolicy::GapLimit { gap_limit: 20 };
        let range = policy.start_addresses().unwrap();
        assert_eq!(range, AddressRange { next_index: 0, count: 20 });
    }

    #[test]
    fn test_index_limit_start_addresses() {
        let policy = ScanPolicy::IndexLimit {
            start_index: 10,
            end_index: 14,
        };
        let range = policy.start_addresses().unwrap();
        assert_eq!(range, AddressRange { next_index: 10, count: 5 });
    }

    #[test]
    fn test_index_limit_invalid_range() {
        let policy = ScanPolicy::IndexLimit {
            start_index: 5,
            end_index: 2,
        };
        assert!(matches!(
            policy.start_addresses(),
            Err(ScanPolicyError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_gap_limit_fresh_wallet_is_satisfied() {
        // 20 addresses loaded, none used: the gap is intact.
        let wallet = wallet_with(Some(19), None);
        assert_eq!(check_gap_limit(20, &wallet), None);
    }

    #[test]
    fn test_gap_limit_boundary() {
        // gap=20, used=5, loaded=24: 25 does not exceed the 25 boundary.
        let wallet = wallet_with(Some(24), Some(5));
        assert_eq!(check_gap_limit(20, &wallet), None);

        // used=6: two more addresses needed, starting at 25.
        let wallet = wallet_with(Some(24), Some(6));
        assert_eq!(
            check_gap_limit(20, &wallet),
            Some(AddressRange {
                next_index: 25,
                count: 2
            })
        );
    }

    #[test]
    fn test_index_limit_never_expands() {
        let wallet = wallet_with(Some(14), Some(14));
        let result = check_index_limit(10, 14, &wallet).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_index_limit_loads_remaining() {
        let wallet = wallet_with(Some(11), None);
        let result = check_index_limit(10, 14, &wallet).unwrap();
        assert_eq!(
            result,
            Some(AddressRange {
                next_index: 12,
                count: 3
            })
        );
    }

    #[test]
    fn test_policy_dispatch() {
        let wallet = wallet_with(Some(24), Some(6));

        let gap = ScanPolicy::GapLimit { gap_limit: 20 };
        assert!(gap.check(&wallet).unwrap().is_some());

        let index = ScanPolicy::IndexLimit {
            start_index: 0,
            end_index: 24,
        };
        assert_eq!(index.check(&wallet).unwrap(), None);
    }
}
