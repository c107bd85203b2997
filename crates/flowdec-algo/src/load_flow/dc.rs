//! Lossless DC load flow.
//!
//! ```text
//! B' × θ = P - Σ_k b_k α_k (e_from(k) - e_to(k))
//! P_ℓ    = BASE_MVA × b_ℓ × (θ_from - θ_to + α_ℓ)
//! ```
//!
//! Injections are the scheduled setpoints of the connected equipment of the
//! main synchronous component. The imbalance is absorbed by the first
//! connected generator of the slack bus.

use super::{LoadFlowMode, LoadFlowReport, LoadFlowRunner};
use crate::sparse::SparseSusceptance;
use flowdec_core::{FlowDecompositionResult, Grid, InjectionKind};
use std::collections::HashSet;

/// System base power in MVA.
pub const BASE_MVA: f64 = 100.0;

/// Mismatch tolerated when no generator can absorb it.
const MISMATCH_TOLERANCE_MW: f64 = 1e-6;

/// Angles of one DC solve together with the matrices used to obtain them.
#[derive(Debug, Clone)]
pub struct DcSolution {
    susceptance: SparseSusceptance,
    reactance: Vec<Vec<f64>>,
    theta: Vec<f64>,
    slack_generator: Option<String>,
    mismatch_mw: f64,
}

impl DcSolution {
    pub fn solve(grid: &Grid) -> FlowDecompositionResult<Self> {
        let susceptance = SparseSusceptance::from_grid(grid)?;
        let reactance = susceptance.reactance_matrix()?;
        let n = susceptance.n_bus();

        let mut injection_pu = vec![0.0; n];
        let mut mismatch_mw = 0.0;
        for inj in grid.injections() {
            if let Some(idx) = susceptance.bus_index(&inj.bus) {
                let p = inj.scheduled_injection_mw();
                injection_pu[idx] += p / BASE_MVA;
                mismatch_mw += p;
            }
        }

        for branch in grid.branches() {
            let alpha = branch.alpha_deg().to_radians();
            if alpha == 0.0 {
                continue;
            }
            if let Some(data) = susceptance.branch_data(&branch.id) {
                injection_pu[data.from_idx] -= data.b * alpha;
                injection_pu[data.to_idx] += data.b * alpha;
            }
        }

        let slack_bus = susceptance.slack_bus().to_string();
        let slack_generator = grid
            .injections_at(&slack_bus)
            .find(|inj| inj.connected && inj.kind == InjectionKind::Generator)
            .map(|inj| inj.id.clone());

        let theta: Vec<f64> = reactance
            .iter()
            .map(|row| row.iter().zip(&injection_pu).map(|(x, p)| x * p).sum())
            .collect();

        Ok(Self {
            susceptance,
            reactance,
            theta,
            slack_generator,
            mismatch_mw,
        })
    }

    pub fn susceptance(&self) -> &SparseSusceptance {
        &self.susceptance
    }

    /// X = (B'_reduced)⁻¹ with zero slack row and column.
    pub fn reactance(&self) -> &[Vec<f64>] {
        &self.reactance
    }

    pub fn slack_generator(&self) -> Option<&str> {
        self.slack_generator.as_deref()
    }

    /// Scheduled generation minus scheduled consumption, in MW.
    pub fn mismatch_mw(&self) -> f64 {
        self.mismatch_mw
    }

    /// Whether the imbalance can be absorbed.
    pub fn is_balanced(&self) -> bool {
        self.slack_generator.is_some() || self.mismatch_mw.abs() <= MISMATCH_TOLERANCE_MW
    }

    /// Active power entering the branch at terminal 1, in MW.
    ///
    /// Zero for branches outside the solved component.
    pub fn branch_flow(&self, grid: &Grid, branch_id: &str) -> f64 {
        let (Some(data), Some(branch)) = (
            self.susceptance.branch_data(branch_id),
            grid.branch(branch_id),
        ) else {
            return 0.0;
        };
        let alpha = branch.alpha_deg().to_radians();
        BASE_MVA * data.b * (self.theta[data.from_idx] - self.theta[data.to_idx] + alpha)
    }

    /// Write terminal flows into `grid`.
    pub fn apply(&self, grid: &mut Grid) {
        let flows: Vec<(String, f64)> = grid
            .branches()
            .map(|b| (b.id.clone(), self.branch_flow(grid, &b.id)))
            .collect();
        for (id, flow) in flows {
            if let Some(branch) = grid.branch_mut(&id) {
                branch.p1 = flow;
                branch.p2 = -flow;
            }
        }

        let main: HashSet<&str> = self
            .susceptance
            .bus_order()
            .iter()
            .map(String::as_str)
            .collect();
        for inj in grid.injections_mut() {
            inj.p = if main.contains(inj.bus.as_str()) {
                -inj.scheduled_injection_mw()
            } else {
                0.0
            };
            if self.slack_generator.as_deref() == Some(inj.id.as_str()) {
                inj.p += self.mismatch_mw;
            }
        }
    }
}

/// Bundled load flow runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcLoadFlow;

impl LoadFlowRunner for DcLoadFlow {
    fn run(&self, grid: &mut Grid, _mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport> {
        let solution = DcSolution::solve(grid)?;
        if !solution.is_balanced() {
            return Ok(LoadFlowReport::diverged(format!(
                "{:.3} MW imbalance and no slack generator",
                solution.mismatch_mw()
            )));
        }
        solution.apply(grid);
        Ok(LoadFlowReport::converged())
    }
}
