//! Error types shared across the workspace.

use thiserror::Error;

/// Settings violate one or more rules. Fatal before a run starts.
#[derive(Debug, Clone, Error)]
#[error("invalid settings: {}", .violations.join("; "))]
pub struct ValidationError {
    /// Every violated rule, in check order.
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    /// Convenience for a single violation.
    pub fn single(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }
}
