//! # Rescaling
//!
//! Brings a DC decomposition in line with the AC reference flow.
//!
//! | Mode | Rule |
//! |------|------|
//! | `None` | unchanged |
//! | `AcerMethodology` | `c += Δ · relu(c) / Σ relu`, `Δ = \|ac\| - total` |
//! | `Proportional` | `c *= \|ac_max / dc\|` |
//!
//! Every mode leaves the flow unchanged when the AC reference flow is NaN.
//! ACER leaves it unchanged when no component is positive; proportional
//! leaves it unchanged when `|dc|` is below the configured minimum.

use crate::results::DecomposedFlow;
use serde::{Deserialize, Serialize};

/// Default `|dc|` below which proportional rescaling is skipped, MW.
pub const DEFAULT_PROPORTIONAL_MIN_FLOW: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescaleMode {
    #[default]
    None,
    AcerMethodology,
    Proportional,
}

/// Rescale `flow` according to `mode`. `min_flow` only applies to
/// [`RescaleMode::Proportional`].
pub fn rescale(flow: &DecomposedFlow, mode: RescaleMode, min_flow: f64) -> DecomposedFlow {
    if flow.ac_reference_flow().is_nan() {
        return flow.clone();
    }
    match mode {
        RescaleMode::None => flow.clone(),
        RescaleMode::AcerMethodology => rescale_acer(flow),
        RescaleMode::Proportional => rescale_proportional(flow, min_flow),
    }
}

fn relu(value: f64) -> f64 {
    value.max(0.0)
}

fn rescale_acer(flow: &DecomposedFlow) -> DecomposedFlow {
    let ac = flow.ac_reference_flow();
    let delta = ac * ac.signum() - flow.total_flow();
    let sum_relu: f64 = flow.components().values().copied().map(relu).sum();
    if sum_relu == 0.0 {
        return flow.clone();
    }
    flow.map_components(|c| c + delta * relu(c) / sum_relu)
}

fn rescale_proportional(flow: &DecomposedFlow, min_flow: f64) -> DecomposedFlow {
    let dc = flow.dc_reference_flow();
    if dc.abs() < min_flow {
        return flow.clone();
    }
    let factor = (flow.ac_max_flow() / dc).abs();
    flow.map_components(|c| factor * c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::DecomposedFlowBuilder;
    use flowdec_core::Zone;

    const EPSILON: f64 = 1e-9;

    fn zone(label: &str) -> Zone {
        Zone::new(label).unwrap()
    }

    fn create_flow(ac: f64, ac_max: f64, dc: f64) -> DecomposedFlow {
        DecomposedFlowBuilder::new("L", zone("FR"), zone("BE"))
            .with_ac_reference_flow(ac)
            .with_ac_max_flow(ac_max)
            .with_dc_reference_flow(dc)
            .with_allocated_flow(100.0)
            .with_pst_flow(200.0)
            .with_xnode_flow(0.0)
            .with_internal_flow(-300.0)
            .with_loop_flow(zone("BE"), 500.0)
            .with_loop_flow(zone("ES"), -100.0)
            .build()
    }

    #[test]
    fn test_none_is_identity() {
        let flow = create_flow(450.0, 460.0, 400.0);
        let once = rescale(&flow, RescaleMode::None, DEFAULT_PROPORTIONAL_MIN_FLOW);
        let twice = rescale(&once, RescaleMode::None, DEFAULT_PROPORTIONAL_MIN_FLOW);
        assert_eq!(once, flow);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_acer_spreads_gap_over_positive_components() {
        // total 400, |ac| 800: the 400 MW gap goes to allocated, PST and BE loop (100/200/500)
        let flow = create_flow(-800.0, 810.0, 400.0);
        let rescaled = rescale(&flow, RescaleMode::AcerMethodology, DEFAULT_PROPORTIONAL_MIN_FLOW);

        assert!((rescaled.allocated_flow() - 150.0).abs() < EPSILON);
        assert!((rescaled.pst_flow() - 300.0).abs() < EPSILON);
        assert!((rescaled.loop_flow(&zone("BE")) - 750.0).abs() < EPSILON);
        assert_eq!(rescaled.internal_flow(), -300.0);
        assert_eq!(rescaled.loop_flow(&zone("ES")), -100.0);
        assert_eq!(rescaled.xnode_flow(), 0.0);
        assert!((rescaled.total_flow() - 800.0).abs() < EPSILON);
        assert_eq!(rescaled.dc_reference_flow(), 400.0);
    }

    #[test]
    fn test_acer_positive_internal_flow_is_rescaled() {
        let flow = DecomposedFlowBuilder::new("L", zone("FR"), zone("FR"))
            .with_ac_reference_flow(1200.0)
            .with_dc_reference_flow(600.0)
            .with_internal_flow(600.0)
            .build();
        let rescaled = rescale(&flow, RescaleMode::AcerMethodology, DEFAULT_PROPORTIONAL_MIN_FLOW);
        assert!((rescaled.internal_flow() - 1200.0).abs() < EPSILON);
    }

    #[test]
    fn test_acer_without_positive_component_is_unchanged() {
        let flow = DecomposedFlowBuilder::new("L", zone("FR"), zone("BE"))
            .with_ac_reference_flow(50.0)
            .with_ac_max_flow(50.0)
            .with_allocated_flow(-10.0)
            .build();
        let rescaled = rescale(&flow, RescaleMode::AcerMethodology, DEFAULT_PROPORTIONAL_MIN_FLOW);
        assert_eq!(rescaled, flow);
    }

    #[test]
    fn test_proportional() {
        let flow = create_flow(450.0, 600.0, -400.0);
        let rescaled = rescale(&flow, RescaleMode::Proportional, DEFAULT_PROPORTIONAL_MIN_FLOW);
        assert!((rescaled.allocated_flow() - 150.0).abs() < EPSILON);
        assert!((rescaled.internal_flow() + 450.0).abs() < EPSILON);
        assert!((rescaled.loop_flow(&zone("ES")) + 150.0).abs() < EPSILON);
        assert!((rescaled.total_flow() - 600.0).abs() < EPSILON);
    }

    #[test]
    fn test_proportional_small_dc_flow_is_unchanged() {
        let flow = create_flow(450.0, 600.0, 1e-7);
        let rescaled = rescale(&flow, RescaleMode::Proportional, DEFAULT_PROPORTIONAL_MIN_FLOW);
        assert_eq!(rescaled, flow);
    }

    #[test]
    fn test_nan_ac_reference_is_unchanged_in_every_mode() {
        let flow = DecomposedFlowBuilder::new("L", zone("FR"), zone("BE"))
            .with_dc_reference_flow(400.0)
            .with_allocated_flow(400.0)
            .build();
        for mode in [
            RescaleMode::None,
            RescaleMode::AcerMethodology,
            RescaleMode::Proportional,
        ] {
            let rescaled = rescale(&flow, mode, DEFAULT_PROPORTIONAL_MIN_FLOW);
            assert_eq!(rescaled.allocated_flow(), 400.0);
            assert!(rescaled.ac_reference_flow().is_nan());
        }
    }

    #[test]
    fn test_mode_serde() {
        assert_eq!(
            serde_json::to_string(&RescaleMode::AcerMethodology).unwrap(),
            "\"ACER_METHODOLOGY\""
        );
        let mode: RescaleMode = serde_json::from_str("\"PROPORTIONAL\"").unwrap();
        assert_eq!(mode, RescaleMode::Proportional);
        assert_eq!(RescaleMode::default(), RescaleMode::None);
    }
}
