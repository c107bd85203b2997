//! Unified error type for flow decomposition
//!
//! Every fallible operation of the network model and of the decomposition
//! engine returns [`FlowDecompositionResult`]. Component-local error enums
//! (sensitivity, susceptance) convert into [`FlowDecompositionError`] so
//! they can be propagated with `?` at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use flowdec_core::{FlowDecompositionError, FlowDecompositionResult};
//!
//! fn decompose(network: &mut Network) -> FlowDecompositionResult<()> {
//!     let grid = network.working_grid()?;
//!     check_zones(grid)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all flow decomposition operations.
#[derive(Error, Debug)]
pub enum FlowDecompositionError {
    /// Network structure errors (dangling references, duplicate ids)
    #[error("Network error: {0}")]
    Network(String),

    /// Lookup of an element that does not exist in the network
    #[error("Unknown {kind} '{id}'")]
    UnknownElement { kind: &'static str, id: String },

    /// Variant creation, selection or removal errors
    #[error("Variant error: {0}")]
    Variant(String),

    /// Load flow did not converge for a network state
    #[error("{mode} load flow diverged on variant '{variant}'")]
    LoadFlowDiverged { mode: String, variant: String },

    /// Sensitivity computation errors
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// A sparse matrix key that is not part of the matrix index
    #[error("Key '{key}' is not part of the {axis} index")]
    IndexMiss { axis: &'static str, key: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using FlowDecompositionError.
pub type FlowDecompositionResult<T> = Result<T, FlowDecompositionError>;

impl FlowDecompositionError {
    pub fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        FlowDecompositionError::UnknownElement {
            kind,
            id: id.into(),
        }
    }
}

impl From<anyhow::Error> for FlowDecompositionError {
    fn from(err: anyhow::Error) -> Self {
        FlowDecompositionError::Other(err.to_string())
    }
}

impl From<String> for FlowDecompositionError {
    fn from(s: String) -> Self {
        FlowDecompositionError::Other(s)
    }
}

impl From<&str> for FlowDecompositionError {
    fn from(s: &str) -> Self {
        FlowDecompositionError::Other(s.to_string())
    }
}
