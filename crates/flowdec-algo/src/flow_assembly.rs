//! # Flow Assembly
//!
//! Combines the sensitivity matrices of one state with the nodal injection
//! model:
//!
//! ```text
//! allocated, xnode, loop[z] = PTDF × nodal injections     (XNEC × column)
//! pst                       = PSDF × Δα                   (XNEC × "PST Flow")
//! Δα[k]                     = α_current(k) - α_neutral(k)  degrees
//! ```
//!
//! On an internal XNEC (both terminals in zone `z`) the loop flow from `z`
//! is reported as internal flow and removed from the loop flows.

use crate::indexes::NetworkMatrixIndexes;
use crate::nodal_injection::FlowColumn;
use crate::reference_flow::AcReferenceFlow;
use crate::results::{DecomposedFlow, DecomposedFlowBuilder};
use crate::sparse::{IndexedTriplets, MatrixIndex};
use flowdec_core::{FlowDecompositionError, FlowDecompositionResult, Grid, Zone};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Phase shift of every PST away from its neutral step, PST × `PST Flow`.
pub fn delta_tap_matrix(
    grid: &Grid,
    indexes: &NetworkMatrixIndexes,
) -> FlowDecompositionResult<IndexedTriplets> {
    let pst_label = FlowColumn::Pst.label();
    let mut matrix = IndexedTriplets::unfiltered(
        Arc::clone(indexes.pst_index()),
        Arc::new(MatrixIndex::new([pst_label.as_str()])),
    );
    for pst_id in indexes.pst_ids() {
        let branch = grid
            .branch(pst_id)
            .ok_or_else(|| FlowDecompositionError::unknown("branch", pst_id.clone()))?;
        let delta = branch
            .phase_tap_changer
            .as_ref()
            .and_then(|ptc| ptc.delta_alpha())
            .unwrap_or(0.0);
        matrix.add_item(pst_id, &pst_label, delta)?;
    }
    Ok(matrix)
}

/// Matrices of one state, ready for assembly.
#[derive(Debug)]
pub struct StateMatrices {
    pub ptdf: IndexedTriplets,
    pub psdf: IndexedTriplets,
    pub nodal_injections: IndexedTriplets,
    pub delta_taps: IndexedTriplets,
}

pub struct FlowAssembler<'a> {
    indexes: &'a NetworkMatrixIndexes,
}

impl<'a> FlowAssembler<'a> {
    pub fn new(indexes: &'a NetworkMatrixIndexes) -> Self {
        Self { indexes }
    }

    /// One pre-rescale decomposition per XNEC of the state, in index order.
    pub fn run(
        &self,
        matrices: StateMatrices,
        ac_reference_flows: &BTreeMap<String, AcReferenceFlow>,
        dc_reference_flows: &BTreeMap<String, f64>,
    ) -> FlowDecompositionResult<Vec<DecomposedFlow>> {
        let allocated_and_loop = matrices
            .ptdf
            .to_compressed()
            .multiply(&matrices.nodal_injections.to_compressed())?
            .to_map(true);
        let pst_flows = matrices
            .psdf
            .to_compressed()
            .multiply(&matrices.delta_taps.to_compressed())?
            .to_map(true);

        let allocated_label = FlowColumn::Allocated.label();
        let xnode_label = FlowColumn::XNode.label();
        let pst_label = FlowColumn::Pst.label();

        self.indexes
            .xnecs()
            .iter()
            .map(|xnec| -> FlowDecompositionResult<DecomposedFlow> {
                let row = allocated_and_loop.get(xnec.id());
                let column = |label: &str| {
                    row.and_then(|r| r.get(label))
                        .copied()
                        .unwrap_or(0.0)
                };

                let mut loop_flows: BTreeMap<Zone, f64> = row
                    .into_iter()
                    .flatten()
                    .filter_map(|(label, value)| match FlowColumn::parse(label) {
                        Some(FlowColumn::LoopFlow(zone)) => Some((zone, *value)),
                        _ => None,
                    })
                    .collect();
                let internal_flow = if xnec.is_internal() {
                    loop_flows.remove(xnec.zone1()).unwrap_or(0.0)
                } else {
                    0.0
                };
                let pst_flow = pst_flows
                    .get(xnec.id())
                    .and_then(|r| r.get(&pst_label))
                    .copied()
                    .unwrap_or(0.0);
                let ac = ac_reference_flows
                    .get(xnec.id())
                    .copied()
                    .unwrap_or(AcReferenceFlow::UNAVAILABLE);
                let dc = dc_reference_flows.get(xnec.id()).copied().ok_or_else(|| {
                    FlowDecompositionError::Validation(format!(
                        "no DC reference flow for XNEC '{}'",
                        xnec.id()
                    ))
                })?;

                Ok(DecomposedFlowBuilder::new(
                    xnec.branch_id(),
                    xnec.zone1().clone(),
                    xnec.zone2().clone(),
                )
                .with_contingency_id(xnec.contingency_id().map(str::to_string))
                .with_ac_reference_flow(ac.reference)
                .with_ac_max_flow(ac.max)
                .with_dc_reference_flow(dc)
                .with_allocated_flow(column(&allocated_label))
                .with_xnode_flow(column(&xnode_label))
                .with_pst_flow(pst_flow)
                .with_internal_flow(internal_flow)
                .with_loop_flows(loop_flows)
                .build())
            })
            .collect()
    }
}
