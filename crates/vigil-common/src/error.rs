//! Error types for Project Vigil.

use thiserror::Error;

/// Top-level error type for Vigil operations.
///
/// Behavior configuration problems are deliberately *not* represented here:
/// they are surfaced as data (validation findings, build diagnostics) so the
/// runtime can degrade gracefully instead of unwinding.
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO errors (asset files, saves)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Asset parsing failed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A definition was rejected outright (e.g. empty state list)
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),
}
