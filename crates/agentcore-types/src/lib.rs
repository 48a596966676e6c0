//! Shared data model, identifiers, and error types for the agent execution
//! core. See SPEC_FULL.md §3 for the authoritative entity definitions.

pub mod error;
pub mod ids;
pub mod models;

pub use error::{AgentCoreError, ErrorSurface, Result};
pub use ids::*;
pub use models::*;
