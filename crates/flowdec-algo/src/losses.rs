//! Losses compensation.
//!
//! The DC model is lossless. To keep the AC losses in the DC picture, every
//! bus gets a zero load `LOSSES <busId>` and, after the AC solve, the losses
//! of each branch (`p1 + p2`) are placed on the load of its sending bus:
//!
//! - ordinary branch: bus 1 when `p1 > 0`, bus 2 otherwise
//! - tie line: half the losses on each side
//!
//! Losses whose magnitude does not exceed the epsilon are ignored.

use flowdec_core::{BranchKind, FlowDecompositionResult, Grid, Injection};
use std::collections::BTreeMap;
use tracing::debug;

pub fn losses_load_id(bus_id: &str) -> String {
    format!("LOSSES {}", bus_id)
}

#[derive(Debug, Clone, Copy)]
pub struct LossesCompensator {
    epsilon: f64,
}

impl LossesCompensator {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Put a zero losses load on every bus. Losses loads left by an earlier
    /// compensation are reset to zero.
    pub fn add_losses_loads(grid: &mut Grid) -> FlowDecompositionResult<()> {
        let bus_ids: Vec<String> = grid.buses().map(|b| b.id.clone()).collect();
        for bus_id in bus_ids {
            let id = losses_load_id(&bus_id);
            match grid.injection_mut(&id) {
                Some(load) => load.setpoint_mw = 0.0,
                None => grid.add_injection(Injection::load(id, bus_id, 0.0))?,
            }
        }
        Ok(())
    }

    /// Set every existing losses load back to zero.
    pub fn reset_losses_loads(grid: &mut Grid) {
        let bus_ids: Vec<String> = grid.buses().map(|b| b.id.clone()).collect();
        for bus_id in bus_ids {
            if let Some(load) = grid.injection_mut(&losses_load_id(&bus_id)) {
                load.setpoint_mw = 0.0;
            }
        }
    }

    /// Set every losses load from the terminal flows of the last AC solve.
    pub fn compensate(&self, grid: &mut Grid) -> FlowDecompositionResult<()> {
        let mut losses_per_bus: BTreeMap<String, f64> = BTreeMap::new();
        for branch in grid.branches() {
            if !branch.is_connected() || branch.p1.is_nan() || branch.p2.is_nan() {
                continue;
            }
            let losses = branch.p1 + branch.p2;
            if branch.kind == BranchKind::TieLine {
                for bus in [&branch.bus1, &branch.bus2] {
                    self.record(&mut losses_per_bus, bus, losses / 2.0);
                }
            } else {
                let sending = if branch.p1 > 0.0 {
                    &branch.bus1
                } else {
                    &branch.bus2
                };
                self.record(&mut losses_per_bus, sending, losses);
            }
        }

        let bus_ids: Vec<String> = grid.buses().map(|b| b.id.clone()).collect();
        for bus_id in bus_ids {
            let id = losses_load_id(&bus_id);
            let losses = losses_per_bus.get(&bus_id).copied().unwrap_or(0.0);
            match grid.injection_mut(&id) {
                Some(load) => load.setpoint_mw = losses,
                None if losses != 0.0 => {
                    grid.add_injection(Injection::load(id, bus_id, losses))?;
                }
                None => {}
            }
        }
        debug!(
            buses = losses_per_bus.len(),
            total_mw = losses_per_bus.values().sum::<f64>(),
            "losses compensated"
        );
        Ok(())
    }

    fn record(&self, losses_per_bus: &mut BTreeMap<String, f64>, bus_id: &str, losses: f64) {
        if losses.abs() > self.epsilon {
            *losses_per_bus.entry(bus_id.to_string()).or_insert(0.0) += losses;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowdec_core::{Branch, Bus, Zone};

    fn create_grid() -> Grid {
        let mut grid = Grid::new();
        grid.add_bus(Bus::new("A1", Zone::new("A").unwrap())).unwrap();
        grid.add_bus(Bus::new("A2", Zone::new("A").unwrap())).unwrap();
        grid.add_bus(Bus::new("B1", Zone::new("B").unwrap())).unwrap();
        grid.add_branch(Branch::line("L", "A1", "A2", 0.1)).unwrap();
        grid.add_branch(Branch::tie_line("TIE", "A2", "B1", 0.1))
            .unwrap();
        grid
    }

    fn set_flows(grid: &mut Grid, id: &str, p1: f64, p2: f64) {
        let branch = grid.branch_mut(id).unwrap();
        branch.p1 = p1;
        branch.p2 = p2;
    }

    #[test]
    fn test_losses_loads_are_added_once() {
        let mut grid = create_grid();
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        assert_eq!(grid.injections().count(), 3);
        let load = grid.injection("LOSSES A1").unwrap();
        assert_eq!(load.bus, "A1");
        assert_eq!(load.setpoint_mw, 0.0);
    }

    #[test]
    fn test_losses_loads_are_reset_to_zero() {
        let mut grid = create_grid();
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        set_flows(&mut grid, "L", 100.0, -98.0);
        LossesCompensator::new(1e-5).compensate(&mut grid).unwrap();
        assert_eq!(grid.injection("LOSSES A1").unwrap().setpoint_mw, 2.0);

        LossesCompensator::reset_losses_loads(&mut grid);
        assert_eq!(grid.injection("LOSSES A1").unwrap().setpoint_mw, 0.0);

        grid.injection_mut("LOSSES A2").unwrap().setpoint_mw = 7.0;
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        assert_eq!(grid.injections().count(), 3);
        for injection in grid.injections() {
            assert_eq!(injection.setpoint_mw, 0.0, "{}", injection.id);
        }
    }

    #[test]
    fn test_losses_on_sending_bus_and_tie_line_halves() {
        let mut grid = create_grid();
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        // L sends from A2 to A1 (p1 < 0), 2 MW lost
        set_flows(&mut grid, "L", -98.0, 100.0);
        set_flows(&mut grid, "TIE", 50.0, -47.0);

        LossesCompensator::new(1e-5).compensate(&mut grid).unwrap();
        assert_eq!(grid.injection("LOSSES A1").unwrap().setpoint_mw, 0.0);
        assert!((grid.injection("LOSSES A2").unwrap().setpoint_mw - 3.5).abs() < 1e-12);
        assert!((grid.injection("LOSSES B1").unwrap().setpoint_mw - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_small_losses_and_open_branches_are_ignored() {
        let mut grid = create_grid();
        LossesCompensator::add_losses_loads(&mut grid).unwrap();
        set_flows(&mut grid, "L", 100.0, -100.0 + 1e-7);
        set_flows(&mut grid, "TIE", 50.0, -40.0);
        grid.branch_mut("TIE").unwrap().open();

        LossesCompensator::new(1e-5).compensate(&mut grid).unwrap();
        for injection in grid.injections() {
            assert_eq!(injection.setpoint_mw, 0.0, "{}", injection.id);
        }
    }
}
