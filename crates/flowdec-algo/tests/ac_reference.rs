//! Decomposition against an AC reference: rescaling, losses compensation and
//! AC divergence handling.
//!
//! The AC solvers here are DC solves post-processed to look like AC results.

use flowdec_algo::{
    AutoGlsk, DcLoadFlow, DcSensitivityEngine, FixedNetPositions, FlowDecompositionComputer,
    FlowDecompositionParameters, LoadFlowMode, LoadFlowNetPositions, LoadFlowReport,
    LoadFlowRunner, NetPositions, RescaleMode, XnecSelection, XnecsById,
};
use flowdec_core::{
    Branch, Bus, Contingency, FlowDecompositionError, FlowDecompositionResult, Grid, Injection,
    Network, Zone, INITIAL_VARIANT_ID,
};

const EPSILON: f64 = 1e-6;

fn zone(label: &str) -> Zone {
    Zone::new(label).unwrap()
}

/// GA 100 at A1, AB to B1 with GB 100, L1/L2 in parallel to B2 with LB 200.
fn create_two_zone_network() -> Network {
    let mut grid = Grid::new();
    grid.add_bus(Bus::new("A1", zone("A"))).unwrap();
    grid.add_bus(Bus::new("B1", zone("B"))).unwrap();
    grid.add_bus(Bus::new("B2", zone("B"))).unwrap();
    grid.add_branch(Branch::line("AB", "A1", "B1", 0.1)).unwrap();
    grid.add_branch(Branch::line("L1", "B1", "B2", 0.1)).unwrap();
    grid.add_branch(Branch::line("L2", "B1", "B2", 0.1)).unwrap();
    grid.add_injection(Injection::generator("GA", "A1", 100.0))
        .unwrap();
    grid.add_injection(Injection::generator("GB", "B1", 100.0))
        .unwrap();
    grid.add_injection(Injection::load("LB", "B2", 200.0)).unwrap();
    Network::from_grid("two_zones", grid)
}

fn exchange_a_to_b(mw: f64) -> FixedNetPositions {
    let mut positions = NetPositions::new();
    positions.insert(zone("A"), mw);
    positions.insert(zone("B"), -mw);
    FixedNetPositions(positions)
}

fn assert_close(actual: f64, expected: f64, what: &str) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "{}: expected {}, got {}",
        what,
        expected,
        actual
    );
}

/// AC flows are the DC flows scaled by a constant factor.
struct ScaledAcRunner {
    factor: f64,
}

impl LoadFlowRunner for ScaledAcRunner {
    fn run(&self, grid: &mut Grid, mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport> {
        let report = DcLoadFlow.run(grid, mode)?;
        if mode == LoadFlowMode::Ac {
            for branch in grid.branches_mut() {
                branch.p1 *= self.factor;
                branch.p2 *= self.factor;
            }
        }
        Ok(report)
    }
}

/// AC solve losing `rate` of the flow of every branch at its receiving end.
struct LossyAcRunner {
    rate: f64,
}

impl LoadFlowRunner for LossyAcRunner {
    fn run(&self, grid: &mut Grid, mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport> {
        let report = DcLoadFlow.run(grid, mode)?;
        if mode == LoadFlowMode::Ac {
            for branch in grid.branches_mut() {
                branch.p2 = -branch.p1 + self.rate * branch.p1.abs();
            }
        }
        Ok(report)
    }
}

/// AC never converges when `open_branch` is open, or never at all.
struct DivergingAcRunner {
    open_branch: Option<&'static str>,
}

impl LoadFlowRunner for DivergingAcRunner {
    fn run(&self, grid: &mut Grid, mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport> {
        let diverges = mode == LoadFlowMode::Ac
            && match self.open_branch {
                Some(id) => grid.branch(id).is_some_and(|b| !b.is_connected()),
                None => true,
            };
        if diverges {
            return Ok(LoadFlowReport::diverged("maximum iterations reached"));
        }
        DcLoadFlow.run(grid, mode)
    }
}

/// Route engine logs to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rescaled_run(mode: RescaleMode) -> flowdec_algo::FlowDecompositionResults {
    init_tracing();
    let runner = ScaledAcRunner { factor: 1.2 };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new().with_rescale_mode(mode),
        &runner,
        &DcSensitivityEngine,
    );
    let mut network = create_two_zone_network();
    computer
        .run(
            &XnecSelection::Interconnections,
            &AutoGlsk,
            &exchange_a_to_b(100.0),
            &mut network,
        )
        .unwrap()
}

#[test]
fn acer_rescaling_meets_the_ac_flow() {
    let results = rescaled_run(RescaleMode::AcerMethodology);

    let flow = results.decomposed_flow("AB").unwrap();
    assert_close(flow.ac_reference_flow(), 120.0, "AC reference flow");
    assert_close(flow.dc_reference_flow(), 100.0, "DC reference flow");
    // only allocated flow is positive, so it takes the whole difference
    assert_close(flow.allocated_flow(), 120.0, "allocated flow");
    assert_close(flow.total_flow(), 120.0, "total flow");

    let before = &results.pre_rescale_flows()["AB"];
    assert_close(before.allocated_flow(), 100.0, "allocated flow before rescaling");
}

#[test]
fn proportional_rescaling_scales_every_component() {
    let results = rescaled_run(RescaleMode::Proportional);
    let flow = results.decomposed_flow("AB").unwrap();
    assert_close(flow.allocated_flow(), 120.0, "allocated flow");
    assert_close(flow.loop_flow(&zone("A")), 0.0, "loop flow from A");
    assert_close(flow.dc_reference_flow(), 100.0, "DC reference flow");
}

#[test]
fn no_rescaling_keeps_dc_components() {
    let results = rescaled_run(RescaleMode::None);
    let flow = results.decomposed_flow("AB").unwrap();
    assert_close(flow.ac_reference_flow(), 120.0, "AC reference flow");
    assert_close(flow.allocated_flow(), 100.0, "allocated flow");
}

#[test]
fn losses_are_compensated_into_the_dc_state() {
    init_tracing();
    let runner = LossyAcRunner { rate: 0.02 };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new()
            .with_losses_compensation(true)
            .with_save_intermediates(true),
        &runner,
        &DcSensitivityEngine,
    );
    let mut network = create_two_zone_network();
    let results = computer
        .run(
            &XnecSelection::Interconnections,
            &AutoGlsk,
            &LoadFlowNetPositions,
            &mut network,
        )
        .unwrap();

    // AB loses 2 MW on the A1 side, L1 and L2 lose 2 MW each on the B1 side;
    // GA picks up all 6 MW and 4 of them cross AB
    let flow = results.decomposed_flow("AB").unwrap();
    assert_close(flow.ac_reference_flow(), 100.0, "AC reference flow");
    assert_close(flow.ac_max_flow(), 100.0, "AC max flow");
    assert_close(flow.dc_reference_flow(), 104.0, "DC reference flow");
    // net positions come from the AC state: (100 + 98) / 2
    assert_close(flow.allocated_flow(), 99.0, "allocated flow");
    assert_close(flow.loop_flow(&zone("B")), 5.0, "loop flow from B");
    assert_close(flow.total_flow(), 104.0, "total flow");

    let intermediates = &results.intermediates()[INITIAL_VARIANT_ID];
    assert_close(intermediates.dc_injections["LOSSES A1"], -2.0, "LOSSES A1");
    assert_close(intermediates.dc_injections["LOSSES B1"], -4.0, "LOSSES B1");
    assert_close(intermediates.dc_injections["GA"], 106.0, "GA");
    assert_close(intermediates.ac_reference_flows["AB"], 100.0, "AB AC flow");
    assert_close(intermediates.dc_reference_flows["AB"], 104.0, "AB DC flow");
    assert!(intermediates.ptdf.contains_key("AB"));

    // losses loads stay on the network, back at zero
    let grid = network.working_grid().unwrap();
    assert!(grid.injection("LOSSES B2").is_some());
    assert_eq!(grid.injection("LOSSES B1").unwrap().setpoint_mw, 0.0);
}

#[test]
fn repeated_runs_with_losses_compensation_agree() {
    init_tracing();
    let runner = LossyAcRunner { rate: 0.02 };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new().with_losses_compensation(true),
        &runner,
        &DcSensitivityEngine,
    );
    let mut network = create_two_zone_network();
    let mut run = || {
        computer
            .run(
                &XnecSelection::Interconnections,
                &AutoGlsk,
                &LoadFlowNetPositions,
                &mut network,
            )
            .unwrap()
    };

    let first = run();
    let second = run();
    assert_close(
        second.decomposed_flow("AB").unwrap().ac_reference_flow(),
        100.0,
        "AC reference flow of the second run",
    );
    assert_close(
        second.decomposed_flow("AB").unwrap().allocated_flow(),
        99.0,
        "allocated flow of the second run",
    );
    assert_eq!(first, second);
}

#[test]
fn ac_divergence_falls_back_to_dc() {
    init_tracing();
    let runner = DivergingAcRunner { open_branch: None };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new()
            .with_dc_fallback_after_ac_divergence(true)
            .with_losses_compensation(true)
            .with_rescale_mode(RescaleMode::AcerMethodology),
        &runner,
        &DcSensitivityEngine,
    );
    let mut network = create_two_zone_network();
    let results = computer
        .run(
            &XnecSelection::Interconnections,
            &AutoGlsk,
            &LoadFlowNetPositions,
            &mut network,
        )
        .unwrap();

    let flow = results.decomposed_flow("AB").unwrap();
    assert!(flow.ac_reference_flow().is_nan());
    assert!(flow.ac_max_flow().is_nan());
    // no AC losses to compensate, no AC flow to rescale to
    assert_close(flow.dc_reference_flow(), 100.0, "DC reference flow");
    assert_close(flow.allocated_flow(), 100.0, "allocated flow");
    let before = &results.pre_rescale_flows()["AB"];
    assert_eq!(before.allocated_flow(), flow.allocated_flow());
    assert_eq!(before.loop_flows(), flow.loop_flows());
}

#[test]
fn ac_divergence_without_fallback_is_an_error() {
    let runner = DivergingAcRunner {
        open_branch: Some("L1"),
    };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new().with_dc_fallback_after_ac_divergence(false),
        &runner,
        &DcSensitivityEngine,
    );
    let by_ids = XnecsById::new()
        .with_base_case_branches(["AB"])
        .with_contingency(Contingency::branch("trip_L1", "L1"))
        .with_branches_after_contingencies(["L2"], ["trip_L1"])
        .unwrap();
    let mut network = create_two_zone_network();

    let err = computer
        .run(
            &XnecSelection::ByIds(by_ids),
            &AutoGlsk,
            &LoadFlowNetPositions,
            &mut network,
        )
        .unwrap_err();
    match err {
        FlowDecompositionError::LoadFlowDiverged { mode, variant } => {
            assert_eq!(mode, "AC");
            assert_eq!(variant, "trip_L1");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(network.variant_ids().count(), 1);
}

#[test]
fn ac_divergence_with_fallback_only_affects_that_state() {
    let runner = DivergingAcRunner {
        open_branch: Some("L1"),
    };
    let computer = FlowDecompositionComputer::new(
        FlowDecompositionParameters::new().with_dc_fallback_after_ac_divergence(true),
        &runner,
        &DcSensitivityEngine,
    );
    let by_ids = XnecsById::new()
        .with_base_case_branches(["L2"])
        .with_contingency(Contingency::branch("trip_L1", "L1"))
        .with_branches_after_contingencies(["L2"], ["trip_L1"])
        .unwrap();
    let mut network = create_two_zone_network();

    let results = computer
        .run(
            &XnecSelection::ByIds(by_ids),
            &AutoGlsk,
            &LoadFlowNetPositions,
            &mut network,
        )
        .unwrap();
    assert_close(
        results.decomposed_flow("L2").unwrap().ac_reference_flow(),
        100.0,
        "base case AC flow",
    );
    let after = results.decomposed_flow("L2_trip_L1").unwrap();
    assert!(after.ac_reference_flow().is_nan());
    assert_close(after.dc_reference_flow(), 200.0, "DC flow after trip");
}
