//! Time abstractions
//!
//! Real and mock clocks; see [`clock`].

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
