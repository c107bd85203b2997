//! # Decomposition Results
//!
//! A [`DecomposedFlow`] is frozen once built; rescaling produces a new value.
//! [`FlowDecompositionResults`] collects, per XNEC composite id, the
//! decomposition before and after rescaling, plus optional per-state
//! intermediates (PTDF, PSDF, nodal injections, reference flows) kept for
//! diagnostics.
//!
//! ```text
//! per state:  DecomposedFlowBuilder ──build()──▶ DecomposedFlow ──rescale──▶ DecomposedFlow
//!                                                      │                          │
//! run:        ResultsBuilder ◀────── pre-rescale ──────┘          rescaled ───────┘
//!                  │
//!                  └──build()──▶ FlowDecompositionResults
//! ```

use crate::nodal_injection::FlowColumn;
use crate::sparse::MatrixMap;
use crate::xnec::xnec_id;
use flowdec_core::Zone;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Decomposition of the flow of one XNEC, MW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedFlow {
    branch_id: String,
    contingency_id: Option<String>,
    zone1: Zone,
    zone2: Zone,
    ac_reference_flow: f64,
    ac_max_flow: f64,
    dc_reference_flow: f64,
    allocated_flow: f64,
    xnode_flow: f64,
    pst_flow: f64,
    internal_flow: f64,
    loop_flows: BTreeMap<Zone, f64>,
}

impl DecomposedFlow {
    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub fn contingency_id(&self) -> Option<&str> {
        self.contingency_id.as_deref()
    }

    /// Composite id: `branchId` or `branchId_contingencyId`.
    pub fn xnec_id(&self) -> String {
        xnec_id(&self.branch_id, self.contingency_id.as_deref())
    }

    pub fn zone1(&self) -> &Zone {
        &self.zone1
    }

    pub fn zone2(&self) -> &Zone {
        &self.zone2
    }

    pub fn is_internal(&self) -> bool {
        self.zone1 == self.zone2
    }

    /// Terminal 1 flow of the AC solve, NaN when AC was unavailable.
    pub fn ac_reference_flow(&self) -> f64 {
        self.ac_reference_flow
    }

    /// Larger absolute terminal flow of the AC solve, NaN when unavailable.
    pub fn ac_max_flow(&self) -> f64 {
        self.ac_max_flow
    }

    pub fn dc_reference_flow(&self) -> f64 {
        self.dc_reference_flow
    }

    pub fn allocated_flow(&self) -> f64 {
        self.allocated_flow
    }

    pub fn xnode_flow(&self) -> f64 {
        self.xnode_flow
    }

    pub fn pst_flow(&self) -> f64 {
        self.pst_flow
    }

    pub fn internal_flow(&self) -> f64 {
        self.internal_flow
    }

    pub fn loop_flows(&self) -> &BTreeMap<Zone, f64> {
        &self.loop_flows
    }

    /// Loop flow from `zone`, zero when absent.
    pub fn loop_flow(&self, zone: &Zone) -> f64 {
        self.loop_flows.get(zone).copied().unwrap_or(0.0)
    }

    pub fn total_loop_flow(&self) -> f64 {
        self.loop_flows.values().sum()
    }

    /// Sum of every component.
    pub fn total_flow(&self) -> f64 {
        self.allocated_flow
            + self.xnode_flow
            + self.pst_flow
            + self.internal_flow
            + self.total_loop_flow()
    }

    /// Columns of the decomposition with their values, reference flows
    /// excluded.
    pub fn components(&self) -> BTreeMap<FlowColumn, f64> {
        let mut components = BTreeMap::new();
        components.insert(FlowColumn::Allocated, self.allocated_flow);
        components.insert(FlowColumn::XNode, self.xnode_flow);
        components.insert(FlowColumn::Pst, self.pst_flow);
        components.insert(FlowColumn::Internal, self.internal_flow);
        for (zone, value) in &self.loop_flows {
            components.insert(FlowColumn::LoopFlow(zone.clone()), *value);
        }
        components
    }

    /// Copy with `f` applied to every component; identity and reference
    /// flows are kept.
    pub fn map_components(&self, f: impl Fn(f64) -> f64) -> DecomposedFlow {
        DecomposedFlow {
            allocated_flow: f(self.allocated_flow),
            xnode_flow: f(self.xnode_flow),
            pst_flow: f(self.pst_flow),
            internal_flow: f(self.internal_flow),
            loop_flows: self
                .loop_flows
                .iter()
                .map(|(zone, value)| (zone.clone(), f(*value)))
                .collect(),
            ..self.clone()
        }
    }
}

impl fmt::Display for DecomposedFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "branchId: {}, contingencyId: {}, decomposition: {{",
            self.branch_id,
            self.contingency_id.as_deref().unwrap_or("")
        )?;
        for (column, value) in self.components() {
            write!(f, "{}={}, ", column, value)?;
        }
        write!(
            f,
            "Reference AC Flow={}, Reference DC Flow={}}}",
            self.ac_reference_flow, self.dc_reference_flow
        )
    }
}

/// Assembles one [`DecomposedFlow`].
#[derive(Debug, Clone)]
pub struct DecomposedFlowBuilder {
    flow: DecomposedFlow,
}

impl DecomposedFlowBuilder {
    pub fn new(branch_id: impl Into<String>, zone1: Zone, zone2: Zone) -> Self {
        Self {
            flow: DecomposedFlow {
                branch_id: branch_id.into(),
                contingency_id: None,
                zone1,
                zone2,
                ac_reference_flow: f64::NAN,
                ac_max_flow: f64::NAN,
                dc_reference_flow: 0.0,
                allocated_flow: 0.0,
                xnode_flow: 0.0,
                pst_flow: 0.0,
                internal_flow: 0.0,
                loop_flows: BTreeMap::new(),
            },
        }
    }

    pub fn with_contingency_id(mut self, contingency_id: Option<String>) -> Self {
        self.flow.contingency_id = contingency_id;
        self
    }

    pub fn with_ac_reference_flow(mut self, flow: f64) -> Self {
        self.flow.ac_reference_flow = flow;
        self
    }

    pub fn with_ac_max_flow(mut self, flow: f64) -> Self {
        self.flow.ac_max_flow = flow;
        self
    }

    pub fn with_dc_reference_flow(mut self, flow: f64) -> Self {
        self.flow.dc_reference_flow = flow;
        self
    }

    pub fn with_allocated_flow(mut self, flow: f64) -> Self {
        self.flow.allocated_flow = flow;
        self
    }

    pub fn with_xnode_flow(mut self, flow: f64) -> Self {
        self.flow.xnode_flow = flow;
        self
    }

    pub fn with_pst_flow(mut self, flow: f64) -> Self {
        self.flow.pst_flow = flow;
        self
    }

    pub fn with_internal_flow(mut self, flow: f64) -> Self {
        self.flow.internal_flow = flow;
        self
    }

    pub fn with_loop_flow(mut self, zone: Zone, flow: f64) -> Self {
        self.flow.loop_flows.insert(zone, flow);
        self
    }

    pub fn with_loop_flows(mut self, loop_flows: BTreeMap<Zone, f64>) -> Self {
        self.flow.loop_flows = loop_flows;
        self
    }

    pub fn build(self) -> DecomposedFlow {
        self.flow
    }
}

/// Diagnostics of one state, kept when intermediates are requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateIntermediates {
    /// Oriented PTDF, XNEC id to injection id, MW/MW.
    pub ptdf: MatrixMap,
    /// Oriented PSDF, XNEC id to PST id, MW/°.
    pub psdf: MatrixMap,
    /// Node to flow column, MW.
    pub nodal_injections: MatrixMap,
    /// DC reference injection per node, MW.
    pub dc_injections: BTreeMap<String, f64>,
    /// AC terminal 1 flow per XNEC id, NaN when AC was unavailable.
    pub ac_reference_flows: BTreeMap<String, f64>,
    /// DC terminal 1 flow per XNEC id.
    pub dc_reference_flows: BTreeMap<String, f64>,
}

/// Outcome of a flow decomposition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDecompositionResults {
    id: String,
    network_id: String,
    zones: BTreeSet<Zone>,
    decomposed_flows: BTreeMap<String, DecomposedFlow>,
    pre_rescale_flows: BTreeMap<String, DecomposedFlow>,
    intermediates: BTreeMap<String, StateIntermediates>,
}

impl FlowDecompositionResults {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    pub fn zones(&self) -> &BTreeSet<Zone> {
        &self.zones
    }

    /// Rescaled decompositions keyed by XNEC composite id.
    pub fn decomposed_flows(&self) -> &BTreeMap<String, DecomposedFlow> {
        &self.decomposed_flows
    }

    /// Decompositions before rescaling, keyed by XNEC composite id.
    pub fn pre_rescale_flows(&self) -> &BTreeMap<String, DecomposedFlow> {
        &self.pre_rescale_flows
    }

    pub fn decomposed_flow(&self, xnec_id: &str) -> Option<&DecomposedFlow> {
        self.decomposed_flows.get(xnec_id)
    }

    /// Intermediates keyed by state id (`InitialState` or contingency id).
    /// Empty unless requested in the parameters.
    pub fn intermediates(&self) -> &BTreeMap<String, StateIntermediates> {
        &self.intermediates
    }

    pub fn len(&self) -> usize {
        self.decomposed_flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decomposed_flows.is_empty()
    }
}

/// Accumulates the frozen per-state outputs of a run.
#[derive(Debug)]
pub struct ResultsBuilder {
    network_id: String,
    zones: BTreeSet<Zone>,
    decomposed_flows: BTreeMap<String, DecomposedFlow>,
    pre_rescale_flows: BTreeMap<String, DecomposedFlow>,
    intermediates: BTreeMap<String, StateIntermediates>,
}

impl ResultsBuilder {
    pub fn new(network_id: impl Into<String>, zones: BTreeSet<Zone>) -> Self {
        Self {
            network_id: network_id.into(),
            zones,
            decomposed_flows: BTreeMap::new(),
            pre_rescale_flows: BTreeMap::new(),
            intermediates: BTreeMap::new(),
        }
    }

    pub fn add_flow(&mut self, pre_rescale: DecomposedFlow, rescaled: DecomposedFlow) {
        self.pre_rescale_flows.insert(pre_rescale.xnec_id(), pre_rescale);
        self.decomposed_flows.insert(rescaled.xnec_id(), rescaled);
    }

    pub fn add_intermediates(&mut self, state_id: impl Into<String>, intermediates: StateIntermediates) {
        self.intermediates.insert(state_id.into(), intermediates);
    }

    pub fn build(self) -> FlowDecompositionResults {
        FlowDecompositionResults {
            id: format!("Flow_Decomposition_Results_of_{}", self.network_id),
            network_id: self.network_id,
            zones: self.zones,
            decomposed_flows: self.decomposed_flows,
            pre_rescale_flows: self.pre_rescale_flows,
            intermediates: self.intermediates,
        }
    }
}
