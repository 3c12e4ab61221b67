//! Persistence: the store contract, the in-memory reference implementation
//! and the advisory UTXO reservation table.

pub mod memory;
pub mod reservation;
pub mod store;

pub use memory::{MemoryStore, MemoryStoreStats};
pub use reservation::ReservationTable;
pub use store::{Store, StoreError};
