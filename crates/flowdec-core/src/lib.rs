//! # flowdec-core: Grid Model for Flow Decomposition
//!
//! Provides the network data structures consumed by the flow decomposition
//! engine in `flowdec-algo`.
//!
//! ## Design Philosophy
//!
//! A [`Grid`] is an **undirected multigraph** where:
//! - **Nodes**: Buses, each tagged with the bidding [`Zone`] it belongs to
//! - **Edges**: Branches (lines, transformers, tie lines), parallel branches allowed
//!
//! Injections (generators, loads, boundary lines and the non-injecting
//! equipment that still sits on a bus) are stored beside the graph and
//! reference their bus by id.
//!
//! A [`Network`] owns one [`Grid`] per named variant. All state-dependent
//! operations take an explicit [`VariantId`], and exactly one variant is the
//! working variant at any time.
//!
//! ## Sign Conventions
//!
//! | Quantity | Convention |
//! |----------|------------|
//! | `Injection::p` | load convention: positive when power is drawn from the bus |
//! | `Branch::p1`, `Branch::p2` | positive when power enters the branch at that terminal |
//! | `Injection::setpoint_mw` | production for generators, consumption for loads and boundary lines |
//!
//! Terminal flows are `NaN` until a load flow writes them.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowdec_core::*;
//!
//! let fr = Zone::new("FR").unwrap();
//! let be = Zone::new("BE").unwrap();
//!
//! let mut grid = Grid::new();
//! grid.add_bus(Bus::new("FR1", fr)).unwrap();
//! grid.add_bus(Bus::new("BE1", be)).unwrap();
//! grid.add_branch(Branch::line("FR1-BE1", "FR1", "BE1", 0.1)).unwrap();
//! grid.add_injection(Injection::generator("G_FR", "FR1", 100.0)).unwrap();
//! grid.add_injection(Injection::load("L_BE", "BE1", 100.0)).unwrap();
//!
//! let network = Network::from_grid("two-zones", grid);
//! assert_eq!(network.working_variant_id().as_str(), INITIAL_VARIANT_ID);
//! ```

pub mod contingency;
pub mod error;
pub mod graph_utils;
pub mod variant;

pub use contingency::{Contingency, ContingencyElement};
pub use error::{FlowDecompositionError, FlowDecompositionResult};
pub use graph_utils::{connected_components, main_component_buses};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use variant::{Network, VariantId, INITIAL_VARIANT_ID};

use petgraph::graph::Graph;
use petgraph::Undirected;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Bidding zone label (usually a country code).
///
/// Zone labels key the loop flow columns of a decomposition, so they are
/// validated once on construction: non-empty and without surrounding
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Zone(String);

impl Zone {
    pub fn new(label: impl Into<String>) -> FlowDecompositionResult<Self> {
        let label = label.into();
        if label.is_empty() || label.trim() != label {
            return Err(FlowDecompositionError::Validation(format!(
                "invalid zone label '{}'",
                label
            )));
        }
        Ok(Zone(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Zone {
    type Err = FlowDecompositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::new(s)
    }
}

impl TryFrom<String> for Zone {
    type Error = FlowDecompositionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Zone::new(value)
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: String,
    pub name: String,
    pub zone: Zone,
    pub nominal_kv: f64,
}

impl Bus {
    pub fn new(id: impl Into<String>, zone: Zone) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            zone,
            nominal_kv: 400.0,
        }
    }

    pub fn with_nominal_kv(mut self, nominal_kv: f64) -> Self {
        self.nominal_kv = nominal_kv;
        self
    }
}

/// Kind of equipment connected to a single bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionKind {
    Generator,
    Load,
    /// Boundary (dangling) line towards an X-node. A paired boundary line is
    /// merged into a tie line and carries no injection of its own.
    BoundaryLine { paired: bool },
    BusbarSection,
    ShuntCompensator,
    StaticVarCompensator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    pub id: String,
    pub kind: InjectionKind,
    pub bus: String,
    /// Active power setpoint in MW.
    pub setpoint_mw: f64,
    pub connected: bool,
    /// Terminal active power in MW, load convention.
    pub p: f64,
}

impl Injection {
    pub fn new(id: impl Into<String>, kind: InjectionKind, bus: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            bus: bus.into(),
            setpoint_mw: 0.0,
            connected: true,
            p: f64::NAN,
        }
    }

    pub fn generator(id: impl Into<String>, bus: impl Into<String>, target_p: f64) -> Self {
        Self::new(id, InjectionKind::Generator, bus).with_setpoint(target_p)
    }

    pub fn load(id: impl Into<String>, bus: impl Into<String>, p0: f64) -> Self {
        Self::new(id, InjectionKind::Load, bus).with_setpoint(p0)
    }

    pub fn boundary_line(id: impl Into<String>, bus: impl Into<String>, p0: f64) -> Self {
        Self::new(id, InjectionKind::BoundaryLine { paired: false }, bus).with_setpoint(p0)
    }

    pub fn with_setpoint(mut self, setpoint_mw: f64) -> Self {
        self.setpoint_mw = setpoint_mw;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    /// Scheduled active injection into the bus in MW (generator convention).
    ///
    /// Zero for disconnected equipment, paired boundary lines and the
    /// equipment kinds that carry no active setpoint.
    pub fn scheduled_injection_mw(&self) -> f64 {
        if !self.connected {
            return 0.0;
        }
        match self.kind {
            InjectionKind::Generator => self.setpoint_mw,
            InjectionKind::Load => -self.setpoint_mw,
            InjectionKind::BoundaryLine { paired: false } => -self.setpoint_mw,
            InjectionKind::BoundaryLine { paired: true }
            | InjectionKind::BusbarSection
            | InjectionKind::ShuntCompensator
            | InjectionKind::StaticVarCompensator => 0.0,
        }
    }

    /// Unpaired boundary line, i.e. an X-node pseudo-injection.
    pub fn is_xnode(&self) -> bool {
        matches!(self.kind, InjectionKind::BoundaryLine { paired: false })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    Line,
    Transformer,
    TieLine,
}

/// Phase tap changer of a two-winding transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTapChanger {
    /// Phase shift of each step in degrees.
    pub alphas_deg: Vec<f64>,
    pub current_step: usize,
    pub neutral_step: Option<usize>,
}

impl PhaseTapChanger {
    pub fn new(alphas_deg: Vec<f64>, current_step: usize) -> Self {
        Self {
            alphas_deg,
            current_step,
            neutral_step: None,
        }
    }

    pub fn with_neutral_step(mut self, step: usize) -> Self {
        self.neutral_step = Some(step);
        self
    }

    pub fn current_alpha(&self) -> Option<f64> {
        self.alphas_deg.get(self.current_step).copied()
    }

    pub fn neutral_alpha(&self) -> Option<f64> {
        self.neutral_step
            .and_then(|step| self.alphas_deg.get(step).copied())
    }

    /// Current phase shift relative to the neutral step, in degrees.
    pub fn delta_alpha(&self) -> Option<f64> {
        Some(self.current_alpha()? - self.neutral_alpha()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub kind: BranchKind,
    pub bus1: String,
    pub bus2: String,
    /// Series resistance in per-unit on a 100 MVA base.
    pub resistance: f64,
    /// Series reactance in per-unit on a 100 MVA base.
    pub reactance: f64,
    pub connected1: bool,
    pub connected2: bool,
    pub phase_tap_changer: Option<PhaseTapChanger>,
    pub p1: f64,
    pub p2: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            kind: BranchKind::Line,
            bus1: String::new(),
            bus2: String::new(),
            resistance: 0.0,
            reactance: 0.1,
            connected1: true,
            connected2: true,
            phase_tap_changer: None,
            p1: f64::NAN,
            p2: f64::NAN,
        }
    }
}

impl Branch {
    pub fn line(
        id: impl Into<String>,
        bus1: impl Into<String>,
        bus2: impl Into<String>,
        reactance: f64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            bus1: bus1.into(),
            bus2: bus2.into(),
            reactance,
            ..Default::default()
        }
    }

    pub fn transformer(
        id: impl Into<String>,
        bus1: impl Into<String>,
        bus2: impl Into<String>,
        reactance: f64,
    ) -> Self {
        Self {
            kind: BranchKind::Transformer,
            ..Self::line(id, bus1, bus2, reactance)
        }
    }

    pub fn tie_line(
        id: impl Into<String>,
        bus1: impl Into<String>,
        bus2: impl Into<String>,
        reactance: f64,
    ) -> Self {
        Self {
            kind: BranchKind::TieLine,
            ..Self::line(id, bus1, bus2, reactance)
        }
    }

    pub fn with_resistance(mut self, resistance: f64) -> Self {
        self.resistance = resistance;
        self
    }

    pub fn with_phase_tap_changer(mut self, ptc: PhaseTapChanger) -> Self {
        self.phase_tap_changer = Some(ptc);
        self
    }

    /// Both terminals closed.
    pub fn is_connected(&self) -> bool {
        self.connected1 && self.connected2
    }

    pub fn open(&mut self) {
        self.connected1 = false;
        self.connected2 = false;
    }

    /// Two-winding transformer whose phase tap changer has a neutral step.
    pub fn is_pst(&self) -> bool {
        self.kind == BranchKind::Transformer
            && self
                .phase_tap_changer
                .as_ref()
                .is_some_and(|ptc| ptc.neutral_step.is_some())
    }

    /// Current phase shift in degrees (zero without a phase tap changer).
    pub fn alpha_deg(&self) -> f64 {
        self.phase_tap_changer
            .as_ref()
            .and_then(PhaseTapChanger::current_alpha)
            .unwrap_or(0.0)
    }
}

/// One network state: topology plus injections.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    graph: Graph<Bus, Branch, Undirected>,
    bus_to_idx: HashMap<String, NodeIndex>,
    branch_to_idx: HashMap<String, EdgeIndex>,
    injections: Vec<Injection>,
    injection_to_idx: HashMap<String, usize>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bus(&mut self, bus: Bus) -> FlowDecompositionResult<NodeIndex> {
        if self.bus_to_idx.contains_key(&bus.id) {
            return Err(FlowDecompositionError::Network(format!(
                "duplicate bus id '{}'",
                bus.id
            )));
        }
        let id = bus.id.clone();
        let idx = self.graph.add_node(bus);
        self.bus_to_idx.insert(id, idx);
        Ok(idx)
    }

    pub fn add_branch(&mut self, branch: Branch) -> FlowDecompositionResult<EdgeIndex> {
        if self.branch_to_idx.contains_key(&branch.id) {
            return Err(FlowDecompositionError::Network(format!(
                "duplicate branch id '{}'",
                branch.id
            )));
        }
        let from = self.bus_node(&branch.bus1)?;
        let to = self.bus_node(&branch.bus2)?;
        let id = branch.id.clone();
        let idx = self.graph.add_edge(from, to, branch);
        self.branch_to_idx.insert(id, idx);
        Ok(idx)
    }

    pub fn add_injection(&mut self, injection: Injection) -> FlowDecompositionResult<()> {
        if self.injection_to_idx.contains_key(&injection.id) {
            return Err(FlowDecompositionError::Network(format!(
                "duplicate injection id '{}'",
                injection.id
            )));
        }
        self.bus_node(&injection.bus)?;
        self.injection_to_idx
            .insert(injection.id.clone(), self.injections.len());
        self.injections.push(injection);
        Ok(())
    }

    pub fn graph(&self) -> &Graph<Bus, Branch, Undirected> {
        &self.graph
    }

    pub fn bus_node(&self, bus_id: &str) -> FlowDecompositionResult<NodeIndex> {
        self.bus_to_idx
            .get(bus_id)
            .copied()
            .ok_or_else(|| FlowDecompositionError::unknown("bus", bus_id))
    }

    pub fn bus(&self, bus_id: &str) -> Option<&Bus> {
        self.bus_to_idx.get(bus_id).map(|idx| &self.graph[*idx])
    }

    pub fn branch(&self, branch_id: &str) -> Option<&Branch> {
        self.branch_to_idx.get(branch_id).map(|idx| &self.graph[*idx])
    }

    pub fn branch_mut(&mut self, branch_id: &str) -> Option<&mut Branch> {
        let idx = *self.branch_to_idx.get(branch_id)?;
        Some(&mut self.graph[idx])
    }

    pub fn injection(&self, injection_id: &str) -> Option<&Injection> {
        self.injection_to_idx
            .get(injection_id)
            .map(|idx| &self.injections[*idx])
    }

    pub fn injection_mut(&mut self, injection_id: &str) -> Option<&mut Injection> {
        let idx = *self.injection_to_idx.get(injection_id)?;
        self.injections.get_mut(idx)
    }

    /// Buses in insertion order.
    pub fn buses(&self) -> impl Iterator<Item = &Bus> {
        self.graph.node_weights()
    }

    /// Branches in insertion order.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.graph.edge_weights()
    }

    pub fn branches_mut(&mut self) -> impl Iterator<Item = &mut Branch> {
        self.graph.edge_weights_mut()
    }

    /// Injections in insertion order.
    pub fn injections(&self) -> impl Iterator<Item = &Injection> {
        self.injections.iter()
    }

    pub fn injections_mut(&mut self) -> impl Iterator<Item = &mut Injection> {
        self.injections.iter_mut()
    }

    pub fn injections_at<'a>(&'a self, bus_id: &'a str) -> impl Iterator<Item = &'a Injection> {
        self.injections.iter().filter(move |inj| inj.bus == bus_id)
    }

    pub fn bus_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn branch_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn bus_zone(&self, bus_id: &str) -> Option<&Zone> {
        self.bus(bus_id).map(|bus| &bus.zone)
    }

    pub fn injection_zone(&self, injection: &Injection) -> Option<&Zone> {
        self.bus_zone(&injection.bus)
    }

    /// Zones of the two terminals of a branch.
    pub fn branch_zones(&self, branch: &Branch) -> Option<(Zone, Zone)> {
        Some((
            self.bus_zone(&branch.bus1)?.clone(),
            self.bus_zone(&branch.bus2)?.clone(),
        ))
    }

    /// All zones present in the grid, sorted.
    pub fn zones(&self) -> BTreeSet<Zone> {
        self.buses().map(|bus| bus.zone.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(label: &str) -> Zone {
        Zone::new(label).unwrap()
    }

    fn create_2bus_grid() -> Grid {
        let mut grid = Grid::new();
        grid.add_bus(Bus::new("A1", zone("A"))).unwrap();
        grid.add_bus(Bus::new("B1", zone("B"))).unwrap();
        grid.add_branch(Branch::line("A1-B1", "A1", "B1", 0.1))
            .unwrap();
        grid.add_injection(Injection::generator("GA", "A1", 100.0))
            .unwrap();
        grid.add_injection(Injection::load("LB", "B1", 100.0))
            .unwrap();
        grid
    }

    #[test]
    fn test_zone_validation() {
        assert!(Zone::new("FR").is_ok());
        assert!(Zone::new("").is_err());
        assert!(Zone::new(" FR").is_err());
        assert_eq!("BE".parse::<Zone>().unwrap().as_str(), "BE");
    }

    #[test]
    fn test_zone_serde_rejects_invalid_label() {
        let ok: Zone = serde_json::from_str("\"DE\"").unwrap();
        assert_eq!(ok, zone("DE"));
        assert!(serde_json::from_str::<Zone>("\"\"").is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut grid = create_2bus_grid();
        assert!(grid.add_bus(Bus::new("A1", zone("A"))).is_err());
        assert!(grid
            .add_branch(Branch::line("A1-B1", "A1", "B1", 0.1))
            .is_err());
        assert!(grid
            .add_injection(Injection::load("LB", "B1", 1.0))
            .is_err());
    }

    #[test]
    fn test_unknown_bus_rejected() {
        let mut grid = create_2bus_grid();
        let err = grid
            .add_branch(Branch::line("X", "A1", "C1", 0.1))
            .unwrap_err();
        assert!(matches!(
            err,
            FlowDecompositionError::UnknownElement { kind: "bus", .. }
        ));
    }

    #[test]
    fn test_scheduled_injection_signs() {
        let grid = create_2bus_grid();
        assert_eq!(grid.injection("GA").unwrap().scheduled_injection_mw(), 100.0);
        assert_eq!(grid.injection("LB").unwrap().scheduled_injection_mw(), -100.0);

        let paired = Injection::new("DL", InjectionKind::BoundaryLine { paired: true }, "A1")
            .with_setpoint(50.0);
        assert_eq!(paired.scheduled_injection_mw(), 0.0);
        assert!(!paired.is_xnode());

        let unpaired = Injection::boundary_line("DL2", "A1", 50.0);
        assert_eq!(unpaired.scheduled_injection_mw(), -50.0);
        assert!(unpaired.is_xnode());

        let off = Injection::generator("G", "A1", 10.0).disconnected();
        assert_eq!(off.scheduled_injection_mw(), 0.0);
    }

    #[test]
    fn test_pst_detection() {
        let ptc = PhaseTapChanger::new(vec![-10.0, 0.0, 10.0], 2);
        let no_neutral = Branch::transformer("T1", "A1", "B1", 0.1)
            .with_phase_tap_changer(ptc.clone());
        assert!(!no_neutral.is_pst());

        let pst = Branch::transformer("T2", "A1", "B1", 0.1)
            .with_phase_tap_changer(ptc.clone().with_neutral_step(1));
        assert!(pst.is_pst());
        assert_eq!(pst.alpha_deg(), 10.0);
        assert_eq!(
            pst.phase_tap_changer.as_ref().unwrap().delta_alpha(),
            Some(10.0)
        );

        let line_with_ptc =
            Branch::line("L", "A1", "B1", 0.1).with_phase_tap_changer(ptc.with_neutral_step(1));
        assert!(!line_with_ptc.is_pst());
    }

    #[test]
    fn test_branch_zones() {
        let grid = create_2bus_grid();
        let branch = grid.branch("A1-B1").unwrap();
        assert_eq!(grid.branch_zones(branch), Some((zone("A"), zone("B"))));
        assert_eq!(grid.zones().len(), 2);
    }

    #[test]
    fn test_terminal_flows_start_nan() {
        let grid = create_2bus_grid();
        assert!(grid.branch("A1-B1").unwrap().p1.is_nan());
        assert!(grid.injection("GA").unwrap().p.is_nan());
    }
}
