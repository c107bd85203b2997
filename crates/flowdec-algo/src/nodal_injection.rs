//! # Nodal Injection Model
//!
//! Splits the DC reference injection of every node into its causes:
//!
//! ```text
//! allocated[n] = glsk[zone(n)][n] × NP[zone(n)]
//! xnode[n]     = P_dc[n]  if n is an unpaired boundary line, else 0
//! loop[n]      = P_dc[n] - allocated[n] - xnode[n]     (column of zone(n))
//! ```
//!
//! The resulting matrix has one row per node and the columns
//! `Allocated Flow`, `Xnode Flow` and one `Loop Flow from <zone>` per zone.
//! Missing GLSK weights and net positions count as zero. Multiplying the
//! PTDF by this matrix yields allocated, X-node and loop flows per XNEC.

use crate::glsk::Glsks;
use crate::indexes::NetworkMatrixIndexes;
use crate::net_position::NetPositions;
use crate::sparse::{IndexedTriplets, MatrixIndex};
use flowdec_core::{FlowDecompositionError, FlowDecompositionResult, Grid, Zone};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

const LOOP_FLOW_PREFIX: &str = "Loop Flow from ";

/// Column of a decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowColumn {
    Allocated,
    XNode,
    Pst,
    Internal,
    LoopFlow(Zone),
}

impl FlowColumn {
    pub fn label(&self) -> String {
        self.to_string()
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Allocated Flow" => Some(FlowColumn::Allocated),
            "Xnode Flow" => Some(FlowColumn::XNode),
            "PST Flow" => Some(FlowColumn::Pst),
            "Internal Flow" => Some(FlowColumn::Internal),
            _ => label
                .strip_prefix(LOOP_FLOW_PREFIX)
                .and_then(|zone| Zone::new(zone).ok())
                .map(FlowColumn::LoopFlow),
        }
    }
}

impl fmt::Display for FlowColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowColumn::Allocated => f.write_str("Allocated Flow"),
            FlowColumn::XNode => f.write_str("Xnode Flow"),
            FlowColumn::Pst => f.write_str("PST Flow"),
            FlowColumn::Internal => f.write_str("Internal Flow"),
            FlowColumn::LoopFlow(zone) => write!(f, "{}{}", LOOP_FLOW_PREFIX, zone),
        }
    }
}

/// DC reference injection of every node, MW, generator convention.
pub fn dc_reference_injections(
    grid: &Grid,
    indexes: &NetworkMatrixIndexes,
) -> FlowDecompositionResult<BTreeMap<String, f64>> {
    indexes
        .node_ids()
        .iter()
        .map(|id| -> FlowDecompositionResult<(String, f64)> {
            let injection = grid
                .injection(id)
                .ok_or_else(|| FlowDecompositionError::unknown("injection", id.clone()))?;
            let p = -injection.p;
            if p.is_nan() {
                return Err(FlowDecompositionError::Validation(format!(
                    "reference injection of '{}' is NaN, was the DC load flow run?",
                    id
                )));
            }
            Ok((id.clone(), p))
        })
        .collect()
}

pub struct NodalInjectionComputer<'a> {
    indexes: &'a NetworkMatrixIndexes,
}

impl<'a> NodalInjectionComputer<'a> {
    pub fn new(indexes: &'a NetworkMatrixIndexes) -> Self {
        Self { indexes }
    }

    /// Columns: allocated, X-node, then one loop flow column per zone.
    pub fn columns(zones: &BTreeSet<Zone>) -> Vec<FlowColumn> {
        let mut columns = vec![FlowColumn::Allocated, FlowColumn::XNode];
        columns.extend(zones.iter().cloned().map(FlowColumn::LoopFlow));
        columns
    }

    pub fn run(
        &self,
        grid: &Grid,
        glsks: &Glsks,
        net_positions: &NetPositions,
        dc_injections: &BTreeMap<String, f64>,
    ) -> FlowDecompositionResult<IndexedTriplets> {
        let mut zones = grid.zones();
        zones.extend(glsks.keys().cloned());
        let column_index = MatrixIndex::new(Self::columns(&zones).iter().map(FlowColumn::label));
        let mut matrix = IndexedTriplets::unfiltered(
            Arc::clone(self.indexes.node_index()),
            Arc::new(column_index),
        );

        let xnodes: HashSet<&str> = self.indexes.xnode_ids().iter().map(String::as_str).collect();
        let allocated_label = FlowColumn::Allocated.label();
        let xnode_label = FlowColumn::XNode.label();

        for node_id in self.indexes.node_ids() {
            let injection = grid
                .injection(node_id)
                .ok_or_else(|| FlowDecompositionError::unknown("injection", node_id.clone()))?;
            let zone = grid
                .injection_zone(injection)
                .ok_or_else(|| FlowDecompositionError::unknown("bus", injection.bus.clone()))?;
            let reference = *dc_injections.get(node_id).ok_or_else(|| {
                FlowDecompositionError::Validation(format!(
                    "no DC reference injection for '{}'",
                    node_id
                ))
            })?;

            let weight = glsks
                .get(zone)
                .and_then(|weights| weights.get(node_id))
                .copied()
                .unwrap_or(0.0);
            let allocated = weight * net_positions.get(zone).copied().unwrap_or(0.0);
            let xnode = if xnodes.contains(node_id.as_str()) {
                reference
            } else {
                0.0
            };
            let loop_flow = reference - allocated - xnode;

            matrix.add_item(node_id, &allocated_label, allocated)?;
            matrix.add_item(node_id, &xnode_label, xnode)?;
            matrix.add_item(
                node_id,
                &FlowColumn::LoopFlow(zone.clone()).label(),
                loop_flow,
            )?;
        }
        Ok(matrix)
    }
}
