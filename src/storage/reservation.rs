//! Advisory UTXO reservation table (soft-lock)
//!
//! Prevents two transactions built concurrently in the same wallet session
//! from selecting the same UTXO. Purely in-process coordination: nothing here
//! stops a UTXO from being spent by a transaction built elsewhere.
//!
//! Expiry is lazy: a reservation past its TTL is invisible to every reader,
//! and `purge_expired` removes the stale entries in one pass.

use crate::core::UtxoId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Reservation flags keyed by UTXO id, with optional expiry
#[derive(Debug, Default)]
pub struct ReservationTable {
    entries: HashMap<UtxoId, Option<Instant>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a UTXO as reserved. With a TTL the reservation clears itself
    /// after the duration unless removed earlier. Returns whether the call
    /// changed the table (re-marking an active reservation returns false).
    pub fn mark(&mut self, id: &UtxoId, ttl: Option<Duration>) -> bool {
        let was_active = self.is_reserved(id);
        let expiry = ttl.map(|d| Instant::now() + d);
        self.entries.insert(id.clone(), expiry);
        !was_active
    }

    /// Clear a reservation. Returns whether an active reservation was removed.
    pub fn clear(&mut self, id: &UtxoId) -> bool {
        let was_active = self.is_reserved(id);
        self.entries.remove(id);
        was_active
    }

    /// Whether the UTXO is currently reserved (expired entries don't count)
    pub fn is_reserved(&self, id: &UtxoId) -> bool {
        match self.entries.get(id) {
            Some(None) => true,
            Some(Some(expiry)) => *expiry > Instant::now(),
            None => false,
        }
    }

    /// Currently active reservations
    pub fn iter(&self) -> Vec<UtxoId> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, expiry)| expiry.map(|e| e > now).unwrap_or(true))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove entries past their TTL; returns how many were dropped
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, expiry| expiry.map(|e| e > now).unwrap_or(true));
        before - self.entries.len()
    }

    /// Number of active reservations
    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
