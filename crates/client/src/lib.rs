//! HTTP client, job poller and session orchestration for shotcraft.
//!
//! [`api::StudioApi`] talks to the backend over HTTP and implements the
//! [`backend::StudioBackend`] trait. Everything above it (poller, product
//! session, search controller, session context) is written against the
//! trait so it can be driven by an in-memory backend in tests.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod poller;
pub mod search;
pub mod session;
pub mod studio;
pub mod submit;
