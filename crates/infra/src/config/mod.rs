//! Client configuration sources
//!
//! See [`loader`] for the environment variables and file locations read.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, find_config_paths};
