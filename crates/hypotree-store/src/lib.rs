//! hypotree-store - durable keyed persistence of whole-tree documents
//!
//! The store is a dumb key → document map. Business rules live in the
//! engine; backends only guarantee that a reader never sees a half-written
//! document.

pub mod fs;
pub mod memory;
pub mod store;

pub use fs::LocalFsStore;
pub use memory::MemoryStore;
pub use store::{open_store, TreeStore};
