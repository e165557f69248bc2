//! Counter store implementations.
//!
//! - [`PersistentCounterStore`] for processes that can reach a shared cache
//! - [`BoundedMemoryCounterStore`] for isolates that cannot

mod memory;
mod persistent;

pub use memory::{BoundedMemoryCounterStore, DEFAULT_MAX_ENTRIES};
pub use persistent::{PersistentCounterStore, DEFAULT_STORAGE_TIMEOUT};
