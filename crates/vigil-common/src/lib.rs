//! # Vigil Common
//!
//! Shared leaf types for Project Vigil: agent identifiers and the
//! top-level error enum used across crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;

pub use error::CoreError;
pub use ids::AgentId;
