//! # Flow Decomposition Orchestrator
//!
//! [`FlowDecompositionComputer::run`] drives a whole decomposition:
//!
//! ```text
//! base case:  GLSK ─▶ XNEC selection ─▶ [losses loads] ─▶ AC ─▶ net positions
//!                                                              │
//!             contingency variants ◀───────────────────────────┘
//!
//! per state:  activate ─▶ AC (reference) ─▶ [losses] ─▶ DC ─▶ indexes
//!             ─▶ nodal injections ─▶ PTDF, PSDF ─▶ assembly ─▶ rescale
//! ```
//!
//! GLSKs and net positions are computed once on the base case and reused for
//! every contingency. States are processed one after another: the working
//! variant is shared state of the network. Contingency variants are removed
//! and losses loads set back to zero when the run ends, whether it succeeded
//! or not.

use crate::flow_assembly::{delta_tap_matrix, FlowAssembler, StateMatrices};
use crate::glsk::{GlskProvider, Glsks};
use crate::indexes::NetworkMatrixIndexes;
use crate::load_flow::{AcOutcome, DcLoadFlow, LoadFlowRunner, LoadFlowRunningService};
use crate::losses::LossesCompensator;
use crate::net_position::{NetPositionProvider, NetPositions};
use crate::nodal_injection::{dc_reference_injections, NodalInjectionComputer};
use crate::parameters::FlowDecompositionParameters;
use crate::reference_flow::{ac_reference_flows, dc_reference_flows};
use crate::rescaler::rescale;
use crate::results::{FlowDecompositionResults, ResultsBuilder, StateIntermediates};
use crate::sensitivity::{DcSensitivityEngine, SensitivityAnalyser, SensitivityRunner, SensitivityVariable};
use crate::variants::NetworkStateManager;
use crate::xnec::{Xnec, XnecSelection, XnecSet};
use flowdec_core::{FlowDecompositionResult, Grid, Network, VariantId};
use std::time::Instant;
use tracing::{debug, info};

/// Inputs shared by every state of a run.
struct RunContext<'r> {
    glsks: &'r Glsks,
    net_positions: &'r NetPositions,
    load_flow: LoadFlowRunningService<'r>,
}

pub struct FlowDecompositionComputer<'a> {
    parameters: FlowDecompositionParameters,
    load_flow: &'a dyn LoadFlowRunner,
    sensitivity: &'a dyn SensitivityRunner,
}

impl FlowDecompositionComputer<'static> {
    /// Computer backed by the bundled DC load flow and DC sensitivity engine.
    pub fn with_dc_engines(parameters: FlowDecompositionParameters) -> Self {
        Self::new(parameters, &DcLoadFlow, &DcSensitivityEngine)
    }
}

impl<'a> FlowDecompositionComputer<'a> {
    pub fn new(
        parameters: FlowDecompositionParameters,
        load_flow: &'a dyn LoadFlowRunner,
        sensitivity: &'a dyn SensitivityRunner,
    ) -> Self {
        Self {
            parameters,
            load_flow,
            sensitivity,
        }
    }

    pub fn parameters(&self) -> &FlowDecompositionParameters {
        &self.parameters
    }

    pub fn run(
        &self,
        xnec_selection: &XnecSelection,
        glsk_provider: &dyn GlskProvider,
        net_position_provider: &dyn NetPositionProvider,
        network: &mut Network,
    ) -> FlowDecompositionResult<FlowDecompositionResults> {
        self.parameters.validate()?;
        let start = Instant::now();
        info!(network = network.id(), "flow decomposition started");

        let initial = VariantId::initial();
        network.set_working_variant(&initial)?;

        let glsks = glsk_provider.glsks(network.working_grid()?)?;
        let xnec_set = xnec_selection.select(
            network.working_grid()?,
            &glsks,
            self.sensitivity,
            self.parameters.sensitivity_variable_batch_size,
        )?;
        info!(
            xnecs = xnec_set.len(),
            contingencies = xnec_set.contingencies.len(),
            "XNECs selected"
        );

        if self.parameters.enable_losses_compensation {
            LossesCompensator::add_losses_loads(network.working_grid_mut()?)?;
        }

        let load_flow = LoadFlowRunningService::new(
            self.load_flow,
            self.parameters.dc_fallback_enabled_after_ac_divergence,
        );
        let base_ac = load_flow.run_ac(network.working_grid_mut()?, &initial)?;
        let net_positions = net_position_provider.net_positions(network.working_grid()?)?;
        debug!(zones = net_positions.len(), "net positions computed");

        let mut zones = network.working_grid()?.zones();
        zones.extend(glsks.keys().cloned());
        let mut results = ResultsBuilder::new(network.id(), zones);

        let context = RunContext {
            glsks: &glsks,
            net_positions: &net_positions,
            load_flow,
        };
        let manager = NetworkStateManager::create(network, &xnec_set.contingency_list())?;
        let outcome = self.decompose_states(network, &manager, &xnec_set, base_ac, &context, &mut results);
        let teardown = manager.teardown(network);
        if self.parameters.enable_losses_compensation {
            LossesCompensator::reset_losses_loads(network.working_grid_mut()?);
        }
        outcome?;
        teardown?;

        let results = results.build();
        info!(
            xnecs = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "flow decomposition finished"
        );
        Ok(results)
    }

    fn decompose_states(
        &self,
        network: &mut Network,
        manager: &NetworkStateManager,
        xnec_set: &XnecSet,
        base_ac: AcOutcome,
        context: &RunContext<'_>,
        results: &mut ResultsBuilder,
    ) -> FlowDecompositionResult<()> {
        if !xnec_set.base_case.is_empty() {
            let variant = manager.activate_base_case(network)?;
            self.decompose_state(
                network.working_grid_mut()?,
                &variant,
                xnec_set.base_case.clone(),
                base_ac,
                context,
                results,
            )?;
        }

        for (contingency, xnecs) in &xnec_set.contingencies {
            let variant = manager.activate_contingency(network, &contingency.id)?;
            let grid = network.working_grid_mut()?;
            let ac = context.load_flow.run_ac(grid, &variant)?;
            self.decompose_state(grid, &variant, xnecs.clone(), ac, context, results)?;
        }
        Ok(())
    }

    /// Decompose the XNECs of the working state. The AC solve of the state
    /// has already run.
    fn decompose_state(
        &self,
        grid: &mut Grid,
        variant: &VariantId,
        xnecs: Vec<Xnec>,
        ac: AcOutcome,
        context: &RunContext<'_>,
        results: &mut ResultsBuilder,
    ) -> FlowDecompositionResult<()> {
        debug!(variant = %variant, xnecs = xnecs.len(), "decomposing state");
        let ac_flows = ac_reference_flows(grid, &xnecs, ac.ac_available());

        if self.parameters.enable_losses_compensation && ac.ac_available() {
            LossesCompensator::new(self.parameters.losses_compensation_epsilon).compensate(grid)?;
        }
        context.load_flow.run_dc(grid, variant)?;
        let dc_flows = dc_reference_flows(grid, &xnecs);

        let indexes = NetworkMatrixIndexes::new(grid, xnecs)?;
        let dc_injections = dc_reference_injections(grid, &indexes)?;
        let nodal_injections = NodalInjectionComputer::new(&indexes).run(
            grid,
            context.glsks,
            context.net_positions,
            &dc_injections,
        )?;

        let analyser = SensitivityAnalyser::new(
            self.sensitivity,
            self.parameters.sensitivity_variable_batch_size,
            self.parameters.sensitivity_epsilon,
        );
        let node_variables: Vec<SensitivityVariable> = indexes
            .node_ids()
            .iter()
            .cloned()
            .map(SensitivityVariable::Injection)
            .collect();
        let ptdf = analyser.run(
            grid,
            indexes.xnecs(),
            indexes.xnec_index(),
            &node_variables,
            indexes.node_index(),
        )?;
        let pst_variables: Vec<SensitivityVariable> = indexes
            .pst_ids()
            .iter()
            .cloned()
            .map(SensitivityVariable::PhaseShift)
            .collect();
        let psdf = analyser.run(
            grid,
            indexes.xnecs(),
            indexes.xnec_index(),
            &pst_variables,
            indexes.pst_index(),
        )?;
        let delta_taps = delta_tap_matrix(grid, &indexes)?;

        let intermediates = self.parameters.save_intermediates.then(|| StateIntermediates {
            ptdf: ptdf.to_map(false),
            psdf: psdf.to_map(false),
            nodal_injections: nodal_injections.to_map(false),
            dc_injections: dc_injections.clone(),
            ac_reference_flows: ac_flows
                .iter()
                .map(|(id, flow)| (id.clone(), flow.reference))
                .collect(),
            dc_reference_flows: dc_flows.clone(),
        });

        let matrices = StateMatrices {
            ptdf,
            psdf,
            nodal_injections,
            delta_taps,
        };
        let flows = FlowAssembler::new(&indexes).run(matrices, &ac_flows, &dc_flows)?;
        for flow in flows {
            let rescaled = rescale(
                &flow,
                self.parameters.rescale_mode,
                self.parameters.proportional_rescaler_min_flow,
            );
            results.add_flow(flow, rescaled);
        }
        if let Some(intermediates) = intermediates {
            results.add_intermediates(variant.as_str(), intermediates);
        }
        Ok(())
    }
}
