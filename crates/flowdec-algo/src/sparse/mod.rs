//! # Sparse Matrix Infrastructure
//!
//! Power grids are inherently sparse, and so are the matrices of a flow
//! decomposition: most PTDF entries fall below the sensitivity epsilon and
//! every nodal injection contributes to at most three columns.
//!
//! ## Module Organization
//!
//! - [`indexed`]: string-keyed sparse matrices (triplet build, CSC multiply)
//! - [`susceptance`]: sparse susceptance matrix (B') for DC load flow and sensitivities

pub mod indexed;
pub mod susceptance;

pub use indexed::{IndexedCsc, IndexedTriplets, MatrixIndex, MatrixMap, NO_FILTERING_EPSILON};
pub use susceptance::{BranchSusceptance, SparseSusceptance, SusceptanceError};
