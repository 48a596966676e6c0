//! Dev-only HTTP surface over the Turn API, session lifecycle, and Memory
//! API (spec.md §6). Exists so the agent execution core is runnable and
//! testable end-to-end from outside the process; it is not a product
//! transport layer, carries no auth layer, and trusts an `X-User-Id` header
//! for caller identity.

pub mod routes;
pub mod server;
pub mod types;

pub use server::{build_router, serve, AppState};
