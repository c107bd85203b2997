//! Monitored elements (XNECs) and their selection.
//!
//! An XNEC is a branch observed either in the base case or after one
//! contingency. Its identity is the externally visible composite id:
//!
//! | State | Id |
//! |-------|----|
//! | base case | `branchId` |
//! | contingency `c` | `branchId_c` |
//!
//! [`XnecSelection`] turns a selection mode into the concrete set of XNECs
//! and contingencies for a run.

use crate::glsk::Glsks;
use crate::sensitivity::{SensitivityRunner, ZonalSensitivityAnalyser};
use flowdec_core::{
    main_component_buses, Branch, Contingency, FlowDecompositionError, FlowDecompositionResult,
    Grid, Zone,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Zone-to-zone PTDF spread above which a branch is monitored.
pub const DEFAULT_ZONAL_PTDF_THRESHOLD: f64 = 0.05;

/// Composite id of a branch in a state.
pub fn xnec_id(branch_id: &str, contingency_id: Option<&str>) -> String {
    match contingency_id {
        None => branch_id.to_string(),
        Some(contingency_id) => format!("{}_{}", branch_id, contingency_id),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xnec {
    id: String,
    branch_id: String,
    contingency_id: Option<String>,
    zone1: Zone,
    zone2: Zone,
}

impl Xnec {
    pub fn new(
        branch_id: impl Into<String>,
        contingency_id: Option<String>,
        zone1: Zone,
        zone2: Zone,
    ) -> Self {
        let branch_id = branch_id.into();
        Self {
            id: xnec_id(&branch_id, contingency_id.as_deref()),
            branch_id,
            contingency_id,
            zone1,
            zone2,
        }
    }

    /// XNEC for a branch of `grid`, zones taken from its terminal buses.
    pub fn from_branch(grid: &Grid, branch: &Branch, contingency_id: Option<&str>) -> Option<Self> {
        let (zone1, zone2) = grid.branch_zones(branch)?;
        Some(Self::new(
            branch.id.clone(),
            contingency_id.map(str::to_string),
            zone1,
            zone2,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub fn contingency_id(&self) -> Option<&str> {
        self.contingency_id.as_deref()
    }

    pub fn zone1(&self) -> &Zone {
        &self.zone1
    }

    pub fn zone2(&self) -> &Zone {
        &self.zone2
    }

    /// Both terminals in the same zone.
    pub fn is_internal(&self) -> bool {
        self.zone1 == self.zone2
    }
}

/// XNECs of a run, grouped by state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XnecSet {
    pub base_case: Vec<Xnec>,
    pub contingencies: Vec<(Contingency, Vec<Xnec>)>,
}

impl XnecSet {
    pub fn len(&self) -> usize {
        self.base_case.len()
            + self
                .contingencies
                .iter()
                .map(|(_, xnecs)| xnecs.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contingency_list(&self) -> Vec<Contingency> {
        self.contingencies.iter().map(|(c, _)| c.clone()).collect()
    }
}

/// Explicit XNEC lists, per state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XnecsById {
    base_case: BTreeSet<String>,
    contingencies: BTreeMap<String, Contingency>,
    after_contingency: BTreeMap<String, BTreeSet<String>>,
}

impl XnecsById {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_case_branches<I, S>(mut self, branch_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_case
            .extend(branch_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_contingency(mut self, contingency: Contingency) -> Self {
        self.after_contingency
            .entry(contingency.id.clone())
            .or_default();
        self.contingencies
            .insert(contingency.id.clone(), contingency);
        self
    }

    /// Monitor `branch_ids` after each of `contingency_ids`.
    ///
    /// Contingencies must have been added first. A branch tripped by the
    /// contingency itself is skipped with a warning.
    pub fn with_branches_after_contingencies<I, S, J, T>(
        mut self,
        branch_ids: I,
        contingency_ids: J,
    ) -> FlowDecompositionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let branch_ids: Vec<String> = branch_ids.into_iter().map(Into::into).collect();
        for contingency_id in contingency_ids {
            let contingency_id = contingency_id.as_ref();
            let contingency = self.contingencies.get(contingency_id).ok_or_else(|| {
                FlowDecompositionError::Config(format!(
                    "contingency '{}' has not been defined",
                    contingency_id
                ))
            })?;
            let monitored = self
                .after_contingency
                .entry(contingency_id.to_string())
                .or_default();
            for branch_id in &branch_ids {
                if contingency.contains_branch(branch_id) {
                    warn!(
                        branch = %branch_id,
                        contingency = %contingency_id,
                        "branch is tripped by the contingency, pair ignored"
                    );
                    continue;
                }
                monitored.insert(branch_id.clone());
            }
        }
        Ok(self)
    }
}

/// How the monitored set of a run is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum XnecSelection {
    /// Every valid branch joining two different zones, base case only.
    Interconnections,
    /// Interconnections plus every valid branch whose zone-to-zone PTDF
    /// spread (max - min) reaches `threshold`, base case only.
    ZonalPtdfThreshold { threshold: f64 },
    /// Every valid branch, base case only.
    AllBranches,
    /// Explicit ids, base case and contingencies.
    ByIds(XnecsById),
}

impl XnecSelection {
    pub fn zonal_ptdf_threshold() -> Self {
        XnecSelection::ZonalPtdfThreshold {
            threshold: DEFAULT_ZONAL_PTDF_THRESHOLD,
        }
    }

    /// `batch_size` bounds the zones per sensitivity request of the zonal
    /// PTDF criterion.
    pub fn select(
        &self,
        grid: &Grid,
        glsks: &Glsks,
        sensitivity: &dyn SensitivityRunner,
        batch_size: usize,
    ) -> FlowDecompositionResult<XnecSet> {
        let set = match self {
            XnecSelection::Interconnections => XnecSet {
                base_case: valid_branches(grid)?
                    .into_iter()
                    .filter_map(|b| Xnec::from_branch(grid, b, None))
                    .filter(|x| !x.is_internal())
                    .collect(),
                contingencies: Vec::new(),
            },
            XnecSelection::AllBranches => XnecSet {
                base_case: valid_branches(grid)?
                    .into_iter()
                    .filter_map(|b| Xnec::from_branch(grid, b, None))
                    .collect(),
                contingencies: Vec::new(),
            },
            XnecSelection::ZonalPtdfThreshold { threshold } => {
                select_by_zonal_ptdf(grid, glsks, sensitivity, batch_size, *threshold)?
            }
            XnecSelection::ByIds(by_ids) => select_by_ids(grid, by_ids),
        };
        debug!(
            base_case = set.base_case.len(),
            contingencies = set.contingencies.len(),
            "XNEC selection done"
        );
        Ok(set)
    }
}

/// Closed branches of the main synchronous component.
fn valid_branches(grid: &Grid) -> FlowDecompositionResult<Vec<&Branch>> {
    let main = main_component_buses(grid)?;
    Ok(grid
        .branches()
        .filter(|b| b.is_connected() && main.contains(&b.bus1) && main.contains(&b.bus2))
        .collect())
}

fn select_by_zonal_ptdf(
    grid: &Grid,
    glsks: &Glsks,
    sensitivity: &dyn SensitivityRunner,
    batch_size: usize,
    threshold: f64,
) -> FlowDecompositionResult<XnecSet> {
    let branches = valid_branches(grid)?;
    let branch_ids: Vec<String> = branches.iter().map(|b| b.id.clone()).collect();
    let zonal_ptdf =
        ZonalSensitivityAnalyser::new(sensitivity, batch_size).run(grid, &branch_ids, glsks)?;

    let base_case = branches
        .into_iter()
        .filter_map(|b| Xnec::from_branch(grid, b, None))
        .filter(|xnec| {
            if !xnec.is_internal() {
                return true;
            }
            let Some(ptdfs) = zonal_ptdf.get(xnec.branch_id()) else {
                return false;
            };
            let max = ptdfs.values().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = ptdfs.values().copied().fold(f64::INFINITY, f64::min);
            !ptdfs.is_empty() && max - min >= threshold
        })
        .collect();
    Ok(XnecSet {
        base_case,
        contingencies: Vec::new(),
    })
}

fn select_by_ids(grid: &Grid, by_ids: &XnecsById) -> XnecSet {
    let resolve = |branch_ids: &BTreeSet<String>, contingency_id: Option<&str>| -> Vec<Xnec> {
        branch_ids
            .iter()
            .filter_map(|branch_id| {
                let xnec = grid
                    .branch(branch_id)
                    .and_then(|b| Xnec::from_branch(grid, b, contingency_id));
                if xnec.is_none() {
                    warn!(branch = %branch_id, "branch not found in network, XNEC dropped");
                }
                xnec
            })
            .collect()
    };

    let contingencies = by_ids
        .after_contingency
        .iter()
        .filter_map(|(contingency_id, branch_ids)| {
            let contingency = by_ids.contingencies.get(contingency_id)?;
            let xnecs = resolve(branch_ids, Some(contingency_id));
            (!xnecs.is_empty()).then(|| (contingency.clone(), xnecs))
        })
        .collect();

    XnecSet {
        base_case: resolve(&by_ids.base_case, None),
        contingencies,
    }
}
