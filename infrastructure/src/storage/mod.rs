//! Repository adapters.

mod memory;
mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{JsonSnapshot, SNAPSHOT_VERSION, SnapshotError, StoreSnapshot};
