//! Index Store implementations: LanceDB on disk and an in-memory variant.

pub mod memory;
pub mod schema;
pub mod search;
pub mod store;
pub mod table;
pub mod writer;

pub use memory::MemoryIndexStore;
pub use store::LanceIndexStore;
