//! Balance accounting primitives
//!
//! All amounts are signed 128-bit integers so that transaction effects can be
//! expressed as deltas and merged commutatively. Authority balances count
//! units (one per authority output), never amounts.

use crate::core::transaction::Authorities;
use serde::{Deserialize, Serialize};

// =============================================================================
// Balance
// =============================================================================

/// A locked/unlocked pair of amounts (or authority unit counts)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub locked: i128,
    pub unlocked: i128,
}

impl Balance {
    /// Add an amount to the locked or unlocked bucket
    pub fn credit(&mut self, amount: i128, locked: bool) {
        if locked {
            self.locked += amount;
        } else {
            self.unlocked += amount;
        }
    }

    /// Move an amount from the locked to the unlocked bucket
    pub fn promote(&mut self, amount: i128) {
        self.locked -= amount;
        self.unlocked += amount;
    }

    /// Merge another balance into this one (bucket-wise addition)
    pub fn merge(&mut self, other: &Balance) {
        self.locked += other.locked;
        self.unlocked += other.unlocked;
    }

    /// Total across both buckets
    pub fn total(&self) -> i128 {
        self.locked + self.unlocked
    }
}

// =============================================================================
// Authority Balance
// =============================================================================

/// Mint and melt authority unit counts, each split locked/unlocked
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorityBalance {
    pub mint: Balance,
    pub melt: Balance,
}

impl AuthorityBalance {
    /// Add one unit per authority bit to the locked or unlocked bucket
    pub fn credit(&mut self, authorities: Authorities, amount: i128, locked: bool) {
        if authorities.contains(Authorities::MINT) {
            self.mint.credit(amount, locked);
        }
        if authorities.contains(Authorities::MELT) {
            self.melt.credit(amount, locked);
        }
    }

    /// Move one unit per authority bit from locked to unlocked
    pub fn promote(&mut self, authorities: Authorities) {
        if authorities.contains(Authorities::MINT) {
            self.mint.promote(1);
        }
        if authorities.contains(Authorities::MELT) {
            self.melt.promote(1);
        }
    }

    /// Merge another authority balance into this one
    pub fn merge(&mut self, other: &AuthorityBalance) {
        self.mint.merge(&other.mint);
        self.melt.merge(&other.melt);
    }
}

// =============================================================================
// Token Balance
// =============================================================================

/// Full balance of one token: funds plus authority units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBalance {
    pub tokens: Balance,
    pub authorities: AuthorityBalance,
}

impl TokenBalance {
    /// Merge another token balance into this one (delta application)
    pub fn merge(&mut self, other: &TokenBalance) {
        self.tokens.merge(&other.tokens);
        self.authorities.merge(&other.authorities);
    }

    /// Whether every bucket is zero
    pub fn is_zero(&self) -> bool {
        *self == TokenBalance::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_total() {
        let mut balance = Balance::default();
        balance.credit(100, false);
        balance.credit(40, true);

        assert_eq!(balance.unlocked, 100);
        assert_eq!(balance.locked, 40);
        assert_eq!(balance.total(), 140);
    }

    #[test]
    fn test_promote() {
        let mut balance = Balance::default();
        balance.credit(40, true);
        balance.promote(40);

        assert_eq!(balance.locked, 0);
        assert_eq!(balance.unlocked, 40);
        assert_eq!(balance.total(), 40);
    }

    #[test]
    fn test_negative_deltas_merge() {
        let mut total = TokenBalance::default();

        let mut credit = TokenBalance::default();
        credit.tokens.credit(100, false);

        let mut debit = TokenBalance::default();
        debit.tokens.credit(-30, false);

        total.merge(&credit);
        total.merge(&debit);

        assert_eq!(total.tokens.unlocked, 70);
        assert_eq!(total.tokens.locked, 0);
    }

    #[test]
    fn test_authority_units() {
        let mut auth = AuthorityBalance::default();
        auth.credit(Authorities::MINT | Authorities::MELT, 1, true);
        auth.credit(Authorities::MINT, 1, false);

        assert_eq!(auth.mint.locked, 1);
        assert_eq!(auth.mint.unlocked, 1);
        assert_eq!(auth.melt.locked, 1);
        assert_eq!(auth.melt.unlocked, 0);

        auth.promote(Authorities::MELT);
        assert_eq!(auth.melt.locked, 0);
        assert_eq!(auth.melt.unlocked, 1);
    }

    #[test]
    fn test_is_zero() {
        let mut balance = TokenBalance::default();
        assert!(balance.is_zero());

        balance.tokens.credit(1, false);
        assert!(!balance.is_zero());

        balance.tokens.credit(-1, false);
        assert!(balance.is_zero());
    }
}
