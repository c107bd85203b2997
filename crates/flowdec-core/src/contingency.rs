//! Contingencies: topological modifications applied to a network variant.

use crate::{FlowDecompositionError, FlowDecompositionResult, Grid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContingencyElement {
    /// Trip a branch by opening both of its terminals.
    Branch(String),
}

impl ContingencyElement {
    pub fn id(&self) -> &str {
        match self {
            ContingencyElement::Branch(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contingency {
    pub id: String,
    pub elements: Vec<ContingencyElement>,
}

impl Contingency {
    pub fn new(id: impl Into<String>, elements: Vec<ContingencyElement>) -> Self {
        Self {
            id: id.into(),
            elements,
        }
    }

    /// N-1 outage of a single branch.
    pub fn branch(id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        Self::new(id, vec![ContingencyElement::Branch(branch_id.into())])
    }

    /// Outage of several branches at once.
    pub fn branches<I, S>(id: impl Into<String>, branch_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            branch_ids
                .into_iter()
                .map(|b| ContingencyElement::Branch(b.into()))
                .collect(),
        )
    }

    pub fn contains_branch(&self, branch_id: &str) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, ContingencyElement::Branch(id) if id == branch_id))
    }

    /// Apply the outage to `grid`. Every element must exist.
    pub fn apply(&self, grid: &mut Grid) -> FlowDecompositionResult<()> {
        for element in &self.elements {
            match element {
                ContingencyElement::Branch(branch_id) => grid
                    .branch_mut(branch_id)
                    .ok_or_else(|| FlowDecompositionError::unknown("branch", branch_id.clone()))?
                    .open(),
            }
        }
        Ok(())
    }
}
