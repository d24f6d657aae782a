//! Interceptor pipeline contracts

pub mod ports;
