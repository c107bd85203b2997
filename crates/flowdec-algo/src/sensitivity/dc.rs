//! DC sensitivity engine.
//!
//! With X = (B'_reduced)⁻¹ (zero at the slack) and branch ℓ from bus i to j:
//!
//! ```text
//! PTDF[ℓ,n]  = b_ℓ (X[i,n] - X[j,n])
//! PSDF[ℓ,k]  = BASE_MVA × b_k (PTDF[ℓ,to(k)] - PTDF[ℓ,from(k)] + δ_ℓk) × π/180
//! zonal[ℓ,z] = Σ_n w_z(n) PTDF[ℓ,bus(n)]
//! ```
//!
//! The function reference is the DC flow of the branch in the current state.
//! Branches and equipment outside the main component get zero sensitivity.

use super::{SensitivityFactor, SensitivityRunner, SensitivityValue, SensitivityVariable};
use crate::load_flow::{DcSolution, BASE_MVA};
use crate::sparse::BranchSusceptance;
use flowdec_core::{FlowDecompositionError, FlowDecompositionResult, Grid};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, Default)]
pub struct DcSensitivityEngine;

struct Context<'g> {
    grid: &'g Grid,
    solution: DcSolution,
}

impl Context<'_> {
    fn branch_data(&self, branch_id: &str) -> FlowDecompositionResult<Option<BranchSusceptance>> {
        if self.grid.branch(branch_id).is_none() {
            return Err(FlowDecompositionError::unknown("branch", branch_id));
        }
        Ok(self.solution.susceptance().branch_data(branch_id))
    }

    fn bus_ptdf(&self, function: &BranchSusceptance, bus_idx: usize) -> f64 {
        let x = self.solution.reactance();
        function.b * (x[function.from_idx][bus_idx] - x[function.to_idx][bus_idx])
    }

    fn injection_ptdf(
        &self,
        function: &BranchSusceptance,
        injection_id: &str,
    ) -> FlowDecompositionResult<f64> {
        let injection = self
            .grid
            .injection(injection_id)
            .ok_or_else(|| FlowDecompositionError::unknown("injection", injection_id))?;
        if !injection.connected {
            return Ok(0.0);
        }
        Ok(self
            .solution
            .susceptance()
            .bus_index(&injection.bus)
            .map(|bus_idx| self.bus_ptdf(function, bus_idx))
            .unwrap_or(0.0))
    }

    fn psdf(
        &self,
        function_id: &str,
        function: &BranchSusceptance,
        pst_id: &str,
    ) -> FlowDecompositionResult<f64> {
        let Some(pst) = self.branch_data(pst_id)? else {
            return Ok(0.0);
        };
        let own = if function_id == pst_id { 1.0 } else { 0.0 };
        let per_radian = BASE_MVA
            * pst.b
            * (self.bus_ptdf(function, pst.to_idx) - self.bus_ptdf(function, pst.from_idx) + own);
        Ok(per_radian * PI / 180.0)
    }

    fn evaluate(&self, factor: &SensitivityFactor) -> FlowDecompositionResult<SensitivityValue> {
        let function_id = factor.function_branch_id.as_str();
        let Some(function) = self.branch_data(function_id)? else {
            return Ok(SensitivityValue {
                value: 0.0,
                function_reference: 0.0,
            });
        };
        let value = match &factor.variable {
            SensitivityVariable::Injection(id) => self.injection_ptdf(&function, id)?,
            SensitivityVariable::PhaseShift(id) => self.psdf(function_id, &function, id)?,
            SensitivityVariable::WeightedInjections { weights, .. } => {
                let mut sum = 0.0;
                for (id, weight) in weights {
                    sum += weight * self.injection_ptdf(&function, id)?;
                }
                sum
            }
        };
        Ok(SensitivityValue {
            value,
            function_reference: self.solution.branch_flow(self.grid, function_id),
        })
    }
}

impl SensitivityRunner for DcSensitivityEngine {
    fn run(
        &self,
        grid: &Grid,
        factors: &[SensitivityFactor],
    ) -> FlowDecompositionResult<Vec<SensitivityValue>> {
        if factors.is_empty() {
            return Ok(Vec::new());
        }
        let context = Context {
            grid,
            solution: DcSolution::solve(grid)?,
        };
        factors.iter().map(|factor| context.evaluate(factor)).collect()
    }
}
