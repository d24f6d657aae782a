//! Token persistence and refresh ports

pub mod ports;
