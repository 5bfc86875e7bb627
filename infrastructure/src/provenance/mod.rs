//! Provenance ledger adapters.
//!
//! - [`InMemoryLedger`] keeps activities and entities in process memory
//! - [`JsonlProvenanceLedger`] appends every record to a JSONL file and
//!   rebuilds its index from that file on open

mod jsonl;
mod memory;

pub use jsonl::JsonlProvenanceLedger;
pub use memory::InMemoryLedger;
