//! Zonal net positions.
//!
//! The net position of a zone is the power leaving it, in MW. Flows are read
//! from the terminals of a solved grid:
//!
//! ```text
//! interconnection ℓ (zone1 ≠ zone2):  exchange = (p1 - p2) / 2
//!                                      NP[zone1] += exchange, NP[zone2] -= exchange
//! unpaired boundary line d:            NP[zone(d)] += p(d)
//! ```
//!
//! Disconnected terminals and NaN flows count as zero.

use flowdec_core::{FlowDecompositionResult, Grid, Zone};
use std::collections::BTreeMap;

/// `zone -> MW`
pub type NetPositions = BTreeMap<Zone, f64>;

pub trait NetPositionProvider {
    fn net_positions(&self, grid: &Grid) -> FlowDecompositionResult<NetPositions>;
}

/// Net positions derived from the terminal flows of the grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadFlowNetPositions;

impl NetPositionProvider for LoadFlowNetPositions {
    fn net_positions(&self, grid: &Grid) -> FlowDecompositionResult<NetPositions> {
        let mut positions = NetPositions::new();

        for branch in grid.branches() {
            let Some((zone1, zone2)) = grid.branch_zones(branch) else {
                continue;
            };
            if zone1 == zone2 {
                continue;
            }
            let p1 = terminal_flow(branch.connected1, branch.p1);
            let p2 = terminal_flow(branch.connected2, branch.p2);
            let exchange = (p1 - p2) / 2.0;
            *positions.entry(zone1).or_insert(0.0) += exchange;
            *positions.entry(zone2).or_insert(0.0) -= exchange;
        }

        for boundary in grid.injections().filter(|inj| inj.is_xnode()) {
            if let Some(zone) = grid.injection_zone(boundary) {
                *positions.entry(zone.clone()).or_insert(0.0) +=
                    terminal_flow(boundary.connected, boundary.p);
            }
        }

        Ok(positions)
    }
}

/// Caller-supplied net positions, returned as is.
#[derive(Debug, Clone, Default)]
pub struct FixedNetPositions(pub NetPositions);

impl NetPositionProvider for FixedNetPositions {
    fn net_positions(&self, _grid: &Grid) -> FlowDecompositionResult<NetPositions> {
        Ok(self.0.clone())
    }
}

fn terminal_flow(connected: bool, p: f64) -> f64 {
    if connected && !p.is_nan() {
        p
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdec_core::{Branch, Bus, Injection};

    fn zone(label: &str) -> Zone {
        Zone::new(label).unwrap()
    }

    fn create_solved_grid() -> Grid {
        let mut grid = Grid::new();
        grid.add_bus(Bus::new("A1", zone("A"))).unwrap();
        grid.add_bus(Bus::new("A2", zone("A"))).unwrap();
        grid.add_bus(Bus::new("B1", zone("B"))).unwrap();

        let mut internal = Branch::line("A1-A2", "A1", "A2", 0.1);
        internal.p1 = 40.0;
        internal.p2 = -40.0;
        grid.add_branch(internal).unwrap();

        // lossy interconnection: 101 sent, 99 received
        let mut tie = Branch::tie_line("A2-B1", "A2", "B1", 0.1);
        tie.p1 = 101.0;
        tie.p2 = -99.0;
        grid.add_branch(tie).unwrap();

        let mut boundary = Injection::boundary_line("DL", "B1", 30.0);
        boundary.p = 30.0;
        grid.add_injection(boundary).unwrap();
        grid
    }

    #[test]
    fn test_interconnection_and_boundary_line() {
        let grid = create_solved_grid();
        let np = LoadFlowNetPositions.net_positions(&grid).unwrap();
        assert!((np[&zone("A")] - 100.0).abs() < 1e-12);
        assert!((np[&zone("B")] - (-100.0 + 30.0)).abs() < 1e-12);
    }

    #[test]
    fn test_open_terminal_counts_as_zero() {
        let mut grid = create_solved_grid();
        grid.branch_mut("A2-B1").unwrap().connected2 = false;
        let np = LoadFlowNetPositions.net_positions(&grid).unwrap();
        assert!((np[&zone("A")] - 50.5).abs() < 1e-12);
    }
}
