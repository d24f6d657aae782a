//! Token persistence adapters

pub mod token_store;

pub use token_store::{FileTokenStore, MemoryTokenStore};
