//! Realtime socket ports

pub mod ports;
