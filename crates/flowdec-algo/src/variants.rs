//! Contingency states of a run.
//!
//! ```text
//!            create()                     teardown()
//! InitialState ──clone + apply c──▶ c   ──────────────▶ removed, InitialState working
//! ```
//!
//! Each contingency gets its own variant, named after the contingency,
//! cloned from the initial variant. Only one variant is the working variant
//! at a time; states are processed one after another.

use flowdec_core::{
    Contingency, FlowDecompositionError, FlowDecompositionResult, Network, VariantId,
};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct NetworkStateManager {
    contingency_variants: Vec<VariantId>,
}

impl NetworkStateManager {
    /// Create one variant per contingency and leave the initial variant
    /// working. On failure, variants created so far are removed.
    pub fn create(
        network: &mut Network,
        contingencies: &[Contingency],
    ) -> FlowDecompositionResult<Self> {
        check_contingency_ids(network, contingencies)?;
        let initial = VariantId::initial();
        network.set_working_variant(&initial)?;

        let mut manager = NetworkStateManager::default();
        for contingency in contingencies {
            if let Err(err) = manager.create_one(network, &initial, contingency) {
                manager.teardown(network)?;
                return Err(err);
            }
        }
        debug!(
            variants = manager.contingency_variants.len(),
            "contingency variants created"
        );
        Ok(manager)
    }

    fn create_one(
        &mut self,
        network: &mut Network,
        initial: &VariantId,
        contingency: &Contingency,
    ) -> FlowDecompositionResult<()> {
        let variant = VariantId::new(contingency.id.clone());
        network.clone_variant(initial, variant.clone())?;
        self.contingency_variants.push(variant.clone());
        contingency.apply(network.variant_mut(&variant)?)
    }

    pub fn contingency_variants(&self) -> &[VariantId] {
        &self.contingency_variants
    }

    pub fn activate_base_case(&self, network: &mut Network) -> FlowDecompositionResult<VariantId> {
        let initial = VariantId::initial();
        network.set_working_variant(&initial)?;
        Ok(initial)
    }

    pub fn activate_contingency(
        &self,
        network: &mut Network,
        contingency_id: &str,
    ) -> FlowDecompositionResult<VariantId> {
        let variant = VariantId::new(contingency_id);
        network.set_working_variant(&variant)?;
        Ok(variant)
    }

    /// Remove every contingency variant and make the initial variant working.
    pub fn teardown(self, network: &mut Network) -> FlowDecompositionResult<()> {
        network.set_working_variant(&VariantId::initial())?;
        for variant in &self.contingency_variants {
            if let Err(err) = network.remove_variant(variant) {
                warn!(variant = %variant, error = %err, "could not remove variant");
            }
        }
        Ok(())
    }
}

/// Contingency ids name variants: they must be unique and must not clash
/// with a variant already in the network.
fn check_contingency_ids(
    network: &Network,
    contingencies: &[Contingency],
) -> FlowDecompositionResult<()> {
    let mut seen = HashSet::new();
    for contingency in contingencies {
        if !seen.insert(contingency.id.as_str()) {
            return Err(FlowDecompositionError::Config(format!(
                "contingency id '{}' is used more than once",
                contingency.id
            )));
        }
        if network.has_variant(&VariantId::new(contingency.id.clone())) {
            return Err(FlowDecompositionError::Config(format!(
                "contingency id '{}' collides with an existing network variant",
                contingency.id
            )));
        }
    }
    Ok(())
}
