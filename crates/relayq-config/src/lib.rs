//! # Relayq Config
//!
//! Configuration management for relayq.
//! Configuration is layered from TOML files and `RELAYQ__` environment
//! variables, loaded once at startup and immutable afterwards.

mod app_config;
mod loader;

pub use app_config::*;
pub use loader::*;
