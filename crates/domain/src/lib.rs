//! # Rentline Domain
//!
//! Data types shared by every Rentline crate.
//!
//! This crate contains:
//! - The closed error taxonomy ([`ApiError`], [`ErrorCode`], [`NormalizedError`])
//! - Request/response descriptors passed through the interceptor pipeline
//! - Health, token and realtime message types
//! - Configuration structures and defaults
//!
//! ## Architecture
//! - No dependencies on other Rentline crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
