//! Sparse susceptance matrix (B') of the main synchronous component.
//!
//! The B' matrix relates bus angles to power injections under DC assumptions:
//! ```text
//! P = B' × θ
//!
//! where:
//!   B'[i,j] = -b_ij        for i ≠ j (off-diagonal = -susceptance)
//!   B'[i,i] = Σ_k b_ik     for all k (diagonal = sum of connected susceptances)
//! ```
//!
//! Only closed branches inside the main component take part. The slack bus is
//! the first main-component bus hosting a connected generator, or the first
//! main-component bus when there is none. Its angle is fixed to zero and its
//! row and column are removed before inversion.

use flowdec_core::{main_component_buses, FlowDecompositionError, Grid, InjectionKind};
use sprs::{CsMat, TriMat};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors from susceptance matrix operations
#[derive(Debug, Error)]
pub enum SusceptanceError {
    #[error("No buses found in the main component")]
    NoBuses,

    #[error("Branch {0} has zero or near-zero reactance")]
    ZeroReactance(String),

    #[error("Unknown bus ID: {0}")]
    UnknownBus(String),

    #[error("Connectivity analysis failed: {0}")]
    Connectivity(String),

    #[error("Matrix inversion failed: {0}")]
    InversionFailed(String),
}

impl From<SusceptanceError> for FlowDecompositionError {
    fn from(err: SusceptanceError) -> Self {
        FlowDecompositionError::Sensitivity(err.to_string())
    }
}

/// Per-branch data kept alongside the matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchSusceptance {
    pub from_idx: usize,
    pub to_idx: usize,
    /// Susceptance 1/x in per-unit.
    pub b: f64,
}

/// Sparse B' susceptance matrix in CSR format.
#[derive(Debug, Clone)]
pub struct SparseSusceptance {
    matrix: CsMat<f64>,
    bus_order: Vec<String>,
    bus_to_idx: HashMap<String, usize>,
    branch_data: HashMap<String, BranchSusceptance>,
    slack_idx: usize,
}

impl SparseSusceptance {
    /// Build the matrix of the main synchronous component of `grid`.
    pub fn from_grid(grid: &Grid) -> Result<Self, SusceptanceError> {
        let main = main_component_buses(grid)
            .map_err(|e| SusceptanceError::Connectivity(e.to_string()))?;

        let bus_order: Vec<String> = grid
            .buses()
            .filter(|bus| main.contains(&bus.id))
            .map(|bus| bus.id.clone())
            .collect();
        if bus_order.is_empty() {
            return Err(SusceptanceError::NoBuses);
        }
        let bus_to_idx: HashMap<String, usize> = bus_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let n = bus_order.len();

        let mut triplets = TriMat::new((n, n));
        let mut branch_data = HashMap::new();

        for branch in grid.branches() {
            if !branch.is_connected() || !main.contains(&branch.bus1) {
                continue;
            }
            if branch.reactance.abs() < 1e-12 {
                return Err(SusceptanceError::ZeroReactance(branch.id.clone()));
            }

            let b = 1.0 / branch.reactance;
            let i = *bus_to_idx
                .get(&branch.bus1)
                .ok_or_else(|| SusceptanceError::UnknownBus(branch.bus1.clone()))?;
            let j = *bus_to_idx
                .get(&branch.bus2)
                .ok_or_else(|| SusceptanceError::UnknownBus(branch.bus2.clone()))?;

            triplets.add_triplet(i, j, -b);
            triplets.add_triplet(j, i, -b);
            triplets.add_triplet(i, i, b);
            triplets.add_triplet(j, j, b);

            branch_data.insert(
                branch.id.clone(),
                BranchSusceptance {
                    from_idx: i,
                    to_idx: j,
                    b,
                },
            );
        }

        let slack_idx = Self::select_slack(grid, &bus_order, &main);

        Ok(Self {
            matrix: triplets.to_csr(),
            bus_order,
            bus_to_idx,
            branch_data,
            slack_idx,
        })
    }

    fn select_slack(grid: &Grid, bus_order: &[String], main: &HashSet<String>) -> usize {
        let generator_buses: HashSet<&str> = grid
            .injections()
            .filter(|inj| inj.connected && inj.kind == InjectionKind::Generator)
            .filter(|inj| main.contains(&inj.bus))
            .map(|inj| inj.bus.as_str())
            .collect();
        bus_order
            .iter()
            .position(|id| generator_buses.contains(id.as_str()))
            .unwrap_or(0)
    }

    /// Get element B'[i,j] by matrix indices.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Number of buses (matrix dimension).
    pub fn n_bus(&self) -> usize {
        self.bus_order.len()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn bus_index(&self, bus_id: &str) -> Option<usize> {
        self.bus_to_idx.get(bus_id).copied()
    }

    pub fn bus_order(&self) -> &[String] {
        &self.bus_order
    }

    pub fn slack_idx(&self) -> usize {
        self.slack_idx
    }

    pub fn slack_bus(&self) -> &str {
        &self.bus_order[self.slack_idx]
    }

    /// Susceptance data of a branch that takes part in the matrix.
    pub fn branch_data(&self, branch_id: &str) -> Option<BranchSusceptance> {
        self.branch_data.get(branch_id).copied()
    }

    /// Build reduced matrix (slack bus removed) for solving.
    pub fn reduced_matrix(&self) -> CsMat<f64> {
        let n = self.n_bus();
        let m = n - 1;
        let mut triplets = TriMat::new((m, m));

        let reduce = |idx: usize| if idx < self.slack_idx { idx } else { idx - 1 };

        for i in 0..n {
            if i == self.slack_idx {
                continue;
            }
            if let Some(row) = self.matrix.outer_view(i) {
                for (j, &val) in row.iter() {
                    if j == self.slack_idx {
                        continue;
                    }
                    triplets.add_triplet(reduce(i), reduce(j), val);
                }
            }
        }

        triplets.to_csr()
    }

    /// Dense X = (B'_reduced)⁻¹, extended with a zero row and column at the slack.
    pub fn reactance_matrix(&self) -> Result<Vec<Vec<f64>>, SusceptanceError> {
        let n = self.n_bus();
        let mut x = vec![vec![0.0; n]; n];
        if n < 2 {
            return Ok(x);
        }

        let reduced = self.reduced_matrix();
        let m = reduced.rows();
        let mut dense = vec![vec![0.0; m]; m];
        for (val, (i, j)) in reduced.iter() {
            dense[i][j] += *val;
        }
        let inv_reduced = lu_inverse(&dense)?;

        let reduced_to_full: Vec<usize> = (0..n).filter(|&i| i != self.slack_idx).collect();
        for (ri, &fi) in reduced_to_full.iter().enumerate() {
            for (rj, &fj) in reduced_to_full.iter().enumerate() {
                x[fi][fj] = inv_reduced[ri][rj];
            }
        }

        Ok(x)
    }
}

/// LU decomposition-based matrix inverse with partial pivoting.
fn lu_inverse(a: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, SusceptanceError> {
    let n = a.len();
    let mut lu: Vec<Vec<f64>> = a.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let mut max_val = lu[k][k].abs();
        let mut max_row = k;
        for (i, row) in lu.iter().enumerate().skip(k + 1) {
            if row[k].abs() > max_val {
                max_val = row[k].abs();
                max_row = i;
            }
        }

        if max_val < 1e-12 {
            return Err(SusceptanceError::InversionFailed(
                "Matrix is singular".into(),
            ));
        }

        if max_row != k {
            lu.swap(k, max_row);
            perm.swap(k, max_row);
        }

        for i in (k + 1)..n {
            lu[i][k] /= lu[k][k];
            for j in (k + 1)..n {
                lu[i][j] -= lu[i][k] * lu[k][j];
            }
        }
    }

    let mut inv = vec![vec![0.0; n]; n];
    for col in 0..n {
        // row `i` of the permuted system holds original row perm[i]
        let mut y = vec![0.0; n];
        for i in 0..n {
            y[i] = if perm[i] == col { 1.0 } else { 0.0 };
            for j in 0..i {
                y[i] -= lu[i][j] * y[j];
            }
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            x[i] = y[i];
            for j in (i + 1)..n {
                x[i] -= lu[i][j] * x[j];
            }
            x[i] /= lu[i][i];
        }

        for i in 0..n {
            inv[i][col] = x[i];
        }
    }

    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdec_core::{Branch, Bus, Injection, Zone};

    fn create_3bus_grid() -> Grid {
        let mut grid = Grid::new();
        let zone = Zone::new("A").unwrap();
        for id in ["Bus1", "Bus2", "Bus3"] {
            grid.add_bus(Bus::new(id, zone.clone())).unwrap();
        }
        grid.add_branch(Branch::line("Line1-2", "Bus1", "Bus2", 0.1))
            .unwrap();
        grid.add_branch(Branch::line("Line2-3", "Bus2", "Bus3", 0.1))
            .unwrap();
        grid.add_branch(Branch::line("Line1-3", "Bus1", "Bus3", 0.2))
            .unwrap();
        grid.add_injection(Injection::generator("G2", "Bus2", 50.0))
            .unwrap();
        grid
    }

    #[test]
    fn test_susceptance_symmetry() {
        let grid = create_3bus_grid();
        let b_prime = SparseSusceptance::from_grid(&grid).unwrap();

        for i in 0..b_prime.n_bus() {
            for j in 0..b_prime.n_bus() {
                let bij = b_prime.get(i, j);
                let bji = b_prime.get(j, i);
                assert!(
                    (bij - bji).abs() < 1e-10,
                    "B'[{},{}]={} != B'[{},{}]={}",
                    i,
                    j,
                    bij,
                    j,
                    i,
                    bji
                );
            }
        }
    }

    #[test]
    fn test_susceptance_row_sum_zero() {
        let grid = create_3bus_grid();
        let b_prime = SparseSusceptance::from_grid(&grid).unwrap();

        for i in 0..b_prime.n_bus() {
            let row_sum: f64 = (0..b_prime.n_bus()).map(|j| b_prime.get(i, j)).sum();
            assert!(row_sum.abs() < 1e-10, "Row {} sum = {}", i, row_sum);
        }
    }

    #[test]
    fn test_slack_is_first_generator_bus() {
        let grid = create_3bus_grid();
        let b_prime = SparseSusceptance::from_grid(&grid).unwrap();
        assert_eq!(b_prime.slack_bus(), "Bus2");
    }

    #[test]
    fn test_reactance_matrix_inverts_reduced() {
        let grid = create_3bus_grid();
        let b_prime = SparseSusceptance::from_grid(&grid).unwrap();
        let x = b_prime.reactance_matrix().unwrap();
        let slack = b_prime.slack_idx();

        // B' × X = I on the non-slack block
        let n = b_prime.n_bus();
        for i in (0..n).filter(|&i| i != slack) {
            for j in (0..n).filter(|&j| j != slack) {
                let v: f64 = (0..n).map(|k| b_prime.get(i, k) * x[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-9, "(B'X)[{},{}] = {}", i, j, v);
            }
        }
        for k in 0..n {
            assert_eq!(x[slack][k], 0.0);
            assert_eq!(x[k][slack], 0.0);
        }
    }

    #[test]
    fn test_open_branch_excluded() {
        let mut grid = create_3bus_grid();
        grid.branch_mut("Line1-3").unwrap().open();
        let b_prime = SparseSusceptance::from_grid(&grid).unwrap();
        assert!(b_prime.branch_data("Line1-3").is_none());
        assert!(b_prime.branch_data("Line1-2").is_some());
        assert_eq!(b_prime.n_bus(), 3);
    }

    #[test]
    fn test_zero_reactance_rejected() {
        let mut grid = create_3bus_grid();
        grid.add_branch(Branch::line("Bad", "Bus1", "Bus2", 0.0))
            .unwrap();
        assert!(matches!(
            SparseSusceptance::from_grid(&grid),
            Err(SusceptanceError::ZeroReactance(_))
        ));
    }
}
