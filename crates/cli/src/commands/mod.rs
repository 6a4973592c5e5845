//! Subcommand implementations

pub mod buckets;
pub mod checkpoints;
pub mod health;
