//! Generation and load shift keys.
//!
//! A GLSK maps every zone to injection weights. Weights need not sum to one,
//! and an injection missing from its zone's map has weight zero.

use flowdec_core::{main_component_buses, FlowDecompositionResult, Grid, InjectionKind, Zone};
use std::collections::BTreeMap;

/// `zone -> injection id -> weight`
pub type Glsks = BTreeMap<Zone, BTreeMap<String, f64>>;

pub trait GlskProvider {
    fn glsks(&self, grid: &Grid) -> FlowDecompositionResult<Glsks>;
}

/// Country GSK built from generator setpoints.
///
/// Each connected generator of a zone in the main synchronous component is
/// weighted by its target power over the zonal total. When that total is
/// zero every generator of the zone gets the same weight. Every zone of the grid has an entry, possibly empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoGlsk;

impl GlskProvider for AutoGlsk {
    fn glsks(&self, grid: &Grid) -> FlowDecompositionResult<Glsks> {
        let mut glsks: Glsks = grid
            .zones()
            .into_iter()
            .map(|zone| (zone, BTreeMap::new()))
            .collect();

        let main = main_component_buses(grid)?;
        for generator in grid.injections().filter(|inj| {
            inj.connected && inj.kind == InjectionKind::Generator && main.contains(&inj.bus)
        }) {
            if let Some(zone) = grid.injection_zone(generator) {
                glsks
                    .entry(zone.clone())
                    .or_default()
                    .insert(generator.id.clone(), generator.setpoint_mw);
            }
        }

        for weights in glsks.values_mut() {
            let sum: f64 = weights.values().sum();
            let count = weights.len() as f64;
            for weight in weights.values_mut() {
                *weight = if sum == 0.0 { 1.0 / count } else { *weight / sum };
            }
        }
        Ok(glsks)
    }
}

/// Caller-supplied GLSK, returned as is.
#[derive(Debug, Clone, Default)]
pub struct FixedGlsk(pub Glsks);

impl GlskProvider for FixedGlsk {
    fn glsks(&self, _grid: &Grid) -> FlowDecompositionResult<Glsks> {
        Ok(self.0.clone())
    }
}
