//! # relayq REST
//!
//! Producer API using Axum: enqueue, job status, dead-letter listing and
//! health checks.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
