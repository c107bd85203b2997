//! Reference flows read from a solved grid, keyed by XNEC id.

use crate::xnec::Xnec;
use flowdec_core::Grid;
use std::collections::BTreeMap;

/// AC flows of one XNEC, MW.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcReferenceFlow {
    /// Active power entering at terminal 1.
    pub reference: f64,
    /// Larger absolute terminal flow.
    pub max: f64,
}

impl AcReferenceFlow {
    pub const UNAVAILABLE: AcReferenceFlow = AcReferenceFlow {
        reference: f64::NAN,
        max: f64::NAN,
    };
}

/// AC reference flows after an AC solve. Every value is NaN when the AC
/// result is not available.
pub fn ac_reference_flows(
    grid: &Grid,
    xnecs: &[Xnec],
    ac_available: bool,
) -> BTreeMap<String, AcReferenceFlow> {
    xnecs
        .iter()
        .map(|xnec| {
            let flow = match grid.branch(xnec.branch_id()) {
                Some(branch) if ac_available => AcReferenceFlow {
                    reference: branch.p1,
                    max: branch.p1.abs().max(branch.p2.abs()),
                },
                _ => AcReferenceFlow::UNAVAILABLE,
            };
            (xnec.id().to_string(), flow)
        })
        .collect()
}

/// Terminal 1 flows after a DC solve.
pub fn dc_reference_flows(grid: &Grid, xnecs: &[Xnec]) -> BTreeMap<String, f64> {
    xnecs
        .iter()
        .map(|xnec| {
            let flow = grid
                .branch(xnec.branch_id())
                .map(|b| b.p1)
                .unwrap_or(f64::NAN);
            (xnec.id().to_string(), flow)
        })
        .collect()
}
