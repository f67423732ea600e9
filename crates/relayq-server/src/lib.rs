//! # relayq Server Library
//!
//! Assembles the backing store, the lifecycle engine and the producer API
//! according to the configured process role.

pub mod app;
pub mod startup;

pub use app::App;
