//! # Sensitivity Acquisition
//!
//! Sensitivities are obtained from an external solver behind the
//! [`SensitivityRunner`] trait and assembled into sparse matrices:
//!
//! | Matrix | Rows | Columns | Unit |
//! |--------|------|---------|------|
//! | PTDF   | XNEC ids | eligible injection ids | MW/MW |
//! | PSDF   | XNEC ids | eligible PST ids | MW/° |
//! | zonal PTDF | branch ids | zone labels | MW/MW |
//!
//! Nodal sensitivities are oriented along the reference flow of each
//! monitored branch: when the solver reports a negative function reference,
//! the factor is negated, so a positive coefficient always pushes flow in
//! the direction it already goes.
//!
//! Both analysers split requests into batches of at most `batch_size`
//! variables, a zone counting as one variable. Batches run one after
//! another; splitting only bounds the size of a single call.

pub mod dc;

pub use dc::DcSensitivityEngine;

use crate::glsk::Glsks;
use crate::sparse::{IndexedTriplets, MatrixIndex, MatrixMap};
use crate::xnec::Xnec;
use flowdec_core::{FlowDecompositionError, FlowDecompositionResult, Grid};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SensitivityError {
    #[error("Solver returned {got} values for {expected} factors")]
    ResultCountMismatch { expected: usize, got: usize },

    #[error("Batch size must be positive")]
    InvalidBatchSize,

    #[error("Solver failure: {0}")]
    Solver(String),
}

impl From<SensitivityError> for FlowDecompositionError {
    fn from(err: SensitivityError) -> Self {
        FlowDecompositionError::Sensitivity(err.to_string())
    }
}

/// Quantity a monitored flow is differentiated against.
#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityVariable {
    /// Active injection of a single piece of equipment.
    Injection(String),
    /// Phase shift of a PST, per degree.
    PhaseShift(String),
    /// Weighted set of injections, e.g. a zone through its GLSK.
    WeightedInjections {
        id: String,
        weights: Vec<(String, f64)>,
    },
}

impl SensitivityVariable {
    pub fn id(&self) -> &str {
        match self {
            SensitivityVariable::Injection(id)
            | SensitivityVariable::PhaseShift(id)
            | SensitivityVariable::WeightedInjections { id, .. } => id,
        }
    }
}

/// Sensitivity of the active flow of `function_branch_id` to `variable`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityFactor {
    pub function_branch_id: String,
    pub variable: SensitivityVariable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensitivityValue {
    pub value: f64,
    /// Reference flow of the function branch, MW.
    pub function_reference: f64,
}

/// External linear sensitivity solver.
///
/// Returns exactly one value per factor, in factor order.
pub trait SensitivityRunner {
    fn run(
        &self,
        grid: &Grid,
        factors: &[SensitivityFactor],
    ) -> FlowDecompositionResult<Vec<SensitivityValue>>;
}

/// Batched PTDF/PSDF acquisition for the XNECs of one state.
pub struct SensitivityAnalyser<'a> {
    runner: &'a dyn SensitivityRunner,
    batch_size: usize,
    epsilon: f64,
}

impl<'a> SensitivityAnalyser<'a> {
    pub fn new(runner: &'a dyn SensitivityRunner, batch_size: usize, epsilon: f64) -> Self {
        Self {
            runner,
            batch_size,
            epsilon,
        }
    }

    /// Matrix of oriented sensitivities, rows keyed by XNEC id and columns by
    /// variable id. `variable_index` must list the ids of `variables`.
    pub fn run(
        &self,
        grid: &Grid,
        xnecs: &[Xnec],
        xnec_index: &Arc<MatrixIndex>,
        variables: &[SensitivityVariable],
        variable_index: &Arc<MatrixIndex>,
    ) -> FlowDecompositionResult<IndexedTriplets> {
        if self.batch_size == 0 {
            return Err(SensitivityError::InvalidBatchSize.into());
        }
        let mut matrix = IndexedTriplets::new(
            Arc::clone(xnec_index),
            Arc::clone(variable_index),
            self.epsilon,
        );
        if xnecs.is_empty() {
            return Ok(matrix);
        }

        for (batch_no, batch) in variables.chunks(self.batch_size).enumerate() {
            let factors: Vec<SensitivityFactor> = batch
                .iter()
                .flat_map(|variable| {
                    xnecs.iter().map(move |xnec| SensitivityFactor {
                        function_branch_id: xnec.branch_id().to_string(),
                        variable: variable.clone(),
                    })
                })
                .collect();
            debug!(
                batch = batch_no,
                variables = batch.len(),
                factors = factors.len(),
                "running sensitivity batch"
            );
            let values = self.runner.run(grid, &factors)?;
            if values.len() != factors.len() {
                return Err(SensitivityError::ResultCountMismatch {
                    expected: factors.len(),
                    got: values.len(),
                }
                .into());
            }

            let pairs = batch
                .iter()
                .flat_map(|variable| xnecs.iter().map(move |xnec| (variable, xnec)));
            for ((variable, xnec), value) in pairs.zip(values) {
                let oriented = if value.function_reference < 0.0 {
                    -value.value
                } else {
                    value.value
                };
                matrix.add_item(xnec.id(), variable.id(), oriented)?;
            }
        }
        Ok(matrix)
    }
}

/// Zone-to-branch PTDFs through GLSK-weighted variable sets.
pub struct ZonalSensitivityAnalyser<'a> {
    runner: &'a dyn SensitivityRunner,
    batch_size: usize,
}

impl<'a> ZonalSensitivityAnalyser<'a> {
    pub fn new(runner: &'a dyn SensitivityRunner, batch_size: usize) -> Self {
        Self { runner, batch_size }
    }

    /// `branch id -> zone label -> PTDF`, every zone of `glsks` present.
    /// At most `batch_size` zones go into one solver request.
    pub fn run(
        &self,
        grid: &Grid,
        branch_ids: &[String],
        glsks: &Glsks,
    ) -> FlowDecompositionResult<MatrixMap> {
        if self.batch_size == 0 {
            return Err(SensitivityError::InvalidBatchSize.into());
        }
        let variables: Vec<SensitivityVariable> = glsks
            .iter()
            .map(|(zone, weights)| SensitivityVariable::WeightedInjections {
                id: zone.to_string(),
                weights: weights.iter().map(|(id, w)| (id.clone(), *w)).collect(),
            })
            .collect();
        let zone_index = Arc::new(MatrixIndex::new(variables.iter().map(|v| v.id())));
        let branch_index = Arc::new(MatrixIndex::new(branch_ids.iter().cloned()));
        let mut matrix = IndexedTriplets::unfiltered(branch_index, zone_index);
        if branch_ids.is_empty() {
            return Ok(matrix.to_map(true));
        }

        for (batch_no, batch) in variables.chunks(self.batch_size).enumerate() {
            let factors: Vec<SensitivityFactor> = batch
                .iter()
                .flat_map(|variable| {
                    branch_ids.iter().map(move |branch_id| SensitivityFactor {
                        function_branch_id: branch_id.clone(),
                        variable: variable.clone(),
                    })
                })
                .collect();
            debug!(
                batch = batch_no,
                zones = batch.len(),
                factors = factors.len(),
                "running zonal sensitivity batch"
            );
            let values = self.runner.run(grid, &factors)?;
            if values.len() != factors.len() {
                return Err(SensitivityError::ResultCountMismatch {
                    expected: factors.len(),
                    got: values.len(),
                }
                .into());
            }
            for (factor, value) in factors.iter().zip(values) {
                matrix.add_item(
                    &factor.function_branch_id,
                    factor.variable.id(),
                    value.value,
                )?;
            }
        }
        Ok(matrix.to_map(true))
    }
}
