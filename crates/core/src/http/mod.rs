//! HTTP transport port

pub mod ports;
