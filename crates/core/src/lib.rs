//! Domain model and pure state logic for shotcraft.
//!
//! No I/O lives here: the HTTP client, poller and session orchestration are
//! in `shotcraft-client`. Everything in this crate is synchronous and can be
//! unit tested without a runtime.

pub mod error;
pub mod generation;
pub mod product;
pub mod reconcile;
pub mod search;
pub mod selector;
pub mod types;
