//! Named network states.
//!
//! A [`Network`] keeps one full [`Grid`] per variant. Variants are created by
//! cloning an existing one, so a contingency can be applied to its own copy
//! without touching the initial state.

use crate::{FlowDecompositionError, FlowDecompositionResult, Grid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const INITIAL_VARIANT_ID: &str = "InitialState";

/// Handle of a network state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantId(String);

impl VariantId {
    pub fn new(id: impl Into<String>) -> Self {
        VariantId(id.into())
    }

    pub fn initial() -> Self {
        VariantId(INITIAL_VARIANT_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Network {
    id: String,
    variants: BTreeMap<VariantId, Grid>,
    working: VariantId,
}

impl Network {
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_grid(id, Grid::new())
    }

    pub fn from_grid(id: impl Into<String>, grid: Grid) -> Self {
        let mut variants = BTreeMap::new();
        variants.insert(VariantId::initial(), grid);
        Self {
            id: id.into(),
            variants,
            working: VariantId::initial(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn working_variant_id(&self) -> &VariantId {
        &self.working
    }

    pub fn set_working_variant(&mut self, id: &VariantId) -> FlowDecompositionResult<()> {
        if !self.variants.contains_key(id) {
            return Err(unknown_variant(id));
        }
        self.working = id.clone();
        Ok(())
    }

    pub fn variant_ids(&self) -> impl Iterator<Item = &VariantId> {
        self.variants.keys()
    }

    pub fn has_variant(&self, id: &VariantId) -> bool {
        self.variants.contains_key(id)
    }

    pub fn variant(&self, id: &VariantId) -> FlowDecompositionResult<&Grid> {
        self.variants.get(id).ok_or_else(|| unknown_variant(id))
    }

    pub fn variant_mut(&mut self, id: &VariantId) -> FlowDecompositionResult<&mut Grid> {
        self.variants.get_mut(id).ok_or_else(|| unknown_variant(id))
    }

    pub fn working_grid(&self) -> FlowDecompositionResult<&Grid> {
        self.variant(&self.working)
    }

    pub fn working_grid_mut(&mut self) -> FlowDecompositionResult<&mut Grid> {
        let working = self.working.clone();
        self.variant_mut(&working)
    }

    /// Copy `source` into a new variant named `target`.
    pub fn clone_variant(
        &mut self,
        source: &VariantId,
        target: VariantId,
    ) -> FlowDecompositionResult<()> {
        if self.variants.contains_key(&target) {
            return Err(FlowDecompositionError::Variant(format!(
                "variant '{}' already exists",
                target
            )));
        }
        let grid = self.variant(source)?.clone();
        self.variants.insert(target, grid);
        Ok(())
    }

    /// Delete a variant. The initial and the working variant cannot be removed.
    pub fn remove_variant(&mut self, id: &VariantId) -> FlowDecompositionResult<()> {
        if id.as_str() == INITIAL_VARIANT_ID {
            return Err(FlowDecompositionError::Variant(
                "the initial variant cannot be removed".into(),
            ));
        }
        if *id == self.working {
            return Err(FlowDecompositionError::Variant(format!(
                "variant '{}' is the working variant",
                id
            )));
        }
        self.variants
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| unknown_variant(id))
    }
}

fn unknown_variant(id: &VariantId) -> FlowDecompositionError {
    FlowDecompositionError::Variant(format!("unknown variant '{}'", id))
}
