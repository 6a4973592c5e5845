//! Activity sync agent
//!
//! Configuration loading and the health/metrics HTTP API used by the
//! `activity-sync` binary.

pub mod api;
pub mod config;
