//! Subcommand implementations

pub mod catalog;
pub mod cluster;
pub mod pricing;
pub mod rebalance;
pub mod settings;
