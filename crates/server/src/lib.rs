//! karp-ops server
//!
//! HTTP surface of the Karpenter cost-optimization engine, with its
//! configuration, Kubernetes inventory provider and catalog hot reload.

pub mod api;
pub mod config;
pub mod error;
pub mod kube_inventory;
pub mod watcher;
