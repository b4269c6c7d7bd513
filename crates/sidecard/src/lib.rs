//! Game server sidecar library - exposes modules for testing.

pub mod cluster;
pub mod config;
pub mod decider;
pub mod heartbeat;
pub mod latch;
pub mod metrics;
pub mod routes;
pub mod server;
