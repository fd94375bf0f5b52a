//! Common test utilities for the mutation scenario tests
//!
//! This module provides a seeded cache and a remote API whose answers the
//! test releases explicitly, so settle order is under the test's control.

#![allow(dead_code)]

pub mod fixtures;
pub mod gated_api;

pub use fixtures::{coordinator, edge_ids, node, seed_graph};
pub use gated_api::{gated_registry, pick, Call, CallLog};
