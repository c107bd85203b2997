//! Matrix indexes of one network state.
//!
//! Built from a grid and the XNECs of that state:
//!
//! - **XNECs**: rows of PTDF and PSDF, keyed by composite id
//! - **nodes**: eligible injections, rows of the nodal injection matrix
//! - **PSTs**: eligible phase shifters, rows of the delta-tap matrix
//! - **X-nodes**: the nodes that are unpaired boundary lines
//!
//! An injection is a node when it is connected, sits in the main synchronous
//! component, is not a busbar section, shunt or static VAR compensator, and
//! is not a boundary line already paired into a tie line. Every two-winding
//! transformer whose phase tap changer has a neutral step is a PST.
//!
//! Eligibility depends on topology, so indexes are rebuilt for every state.

use crate::sparse::MatrixIndex;
use crate::xnec::Xnec;
use flowdec_core::{main_component_buses, FlowDecompositionResult, Grid, Injection, InjectionKind};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMatrixIndexes {
    xnecs: Vec<Xnec>,
    xnec_index: Arc<MatrixIndex>,
    node_index: Arc<MatrixIndex>,
    pst_index: Arc<MatrixIndex>,
    xnode_ids: Vec<String>,
}

impl NetworkMatrixIndexes {
    pub fn new(grid: &Grid, xnecs: Vec<Xnec>) -> FlowDecompositionResult<Self> {
        let main = main_component_buses(grid)?;

        let nodes: Vec<&Injection> = grid
            .injections()
            .filter(|inj| is_eligible_node(inj, &main))
            .collect();
        let xnode_ids = nodes
            .iter()
            .filter(|inj| inj.is_xnode())
            .map(|inj| inj.id.clone())
            .collect();
        let node_index = MatrixIndex::new(nodes.iter().map(|inj| inj.id.as_str()));
        let pst_index = MatrixIndex::new(
            grid.branches()
                .filter(|b| b.is_pst())
                .map(|b| b.id.as_str()),
        );
        let xnec_index = MatrixIndex::new(xnecs.iter().map(Xnec::id));

        Ok(Self {
            xnecs,
            xnec_index: Arc::new(xnec_index),
            node_index: Arc::new(node_index),
            pst_index: Arc::new(pst_index),
            xnode_ids,
        })
    }

    pub fn xnecs(&self) -> &[Xnec] {
        &self.xnecs
    }

    pub fn xnec_index(&self) -> &Arc<MatrixIndex> {
        &self.xnec_index
    }

    pub fn node_index(&self) -> &Arc<MatrixIndex> {
        &self.node_index
    }

    pub fn pst_index(&self) -> &Arc<MatrixIndex> {
        &self.pst_index
    }

    pub fn node_ids(&self) -> &[String] {
        self.node_index.labels()
    }

    pub fn pst_ids(&self) -> &[String] {
        self.pst_index.labels()
    }

    pub fn xnode_ids(&self) -> &[String] {
        &self.xnode_ids
    }
}

fn is_eligible_node(injection: &Injection, main: &HashSet<String>) -> bool {
    injection.connected
        && main.contains(&injection.bus)
        && !matches!(
            injection.kind,
            InjectionKind::BusbarSection
                | InjectionKind::ShuntCompensator
                | InjectionKind::StaticVarCompensator
                | InjectionKind::BoundaryLine { paired: true }
        )
}
