//! User notification ports

pub mod ports;
