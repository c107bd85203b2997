//! # flowdec-algo: Flow Decomposition Engine
//!
//! Splits the active flow of every monitored element (XNEC) into its causes:
//!
//! | Component | Cause |
//! |-----------|-------|
//! | Allocated flow | commercial exchanges, i.e. zonal net positions through GLSKs |
//! | Loop flow from zone `z` | injections of `z` not explained by its net position |
//! | Internal flow | loop flow of the zone an internal branch belongs to |
//! | PST flow | phase shifters away from their neutral tap |
//! | X-node flow | unpaired boundary lines |
//!
//! All components come from DC sensitivities (PTDF, PSDF) applied to the DC
//! reference state, and optionally get rescaled towards the AC reference flow.
//!
//! ## Architecture
//!
//! - **[`sparse`]**: key-addressed sparse matrices (sprs) and the DC susceptance model
//! - **[`indexes`]**: per-state ordering of XNECs, nodes and PSTs
//! - **[`nodal_injection`]**: allocated / X-node / loop split of every injection
//! - **[`sensitivity`]**: batched PTDF and PSDF acquisition behind [`SensitivityRunner`]
//! - **[`flow_assembly`]**: matrix products and internal flow reclassification
//! - **[`rescaler`]**: ACER and proportional rescaling
//! - **[`variants`]**: one network variant per contingency
//! - **[`computer`]**: the orchestrator, [`FlowDecompositionComputer`]
//!
//! Load flows and sensitivities are external collaborators ([`LoadFlowRunner`],
//! [`SensitivityRunner`]); [`DcLoadFlow`] and [`DcSensitivityEngine`] are
//! bundled implementations.
//!
//! ## Example
//!
//! ```ignore
//! use flowdec_algo::{
//!     AutoGlsk, FlowDecompositionComputer, FlowDecompositionParameters,
//!     LoadFlowNetPositions, RescaleMode, XnecSelection,
//! };
//!
//! let parameters = FlowDecompositionParameters::new()
//!     .with_rescale_mode(RescaleMode::AcerMethodology);
//! let computer = FlowDecompositionComputer::with_dc_engines(parameters);
//! let results = computer.run(
//!     &XnecSelection::Interconnections,
//!     &AutoGlsk,
//!     &LoadFlowNetPositions,
//!     &mut network,
//! )?;
//! for (id, flow) in results.decomposed_flows() {
//!     println!("{}: allocated {:.1} MW", id, flow.allocated_flow());
//! }
//! ```

pub mod computer;
pub mod flow_assembly;
pub mod glsk;
pub mod indexes;
pub mod load_flow;
pub mod losses;
pub mod net_position;
pub mod nodal_injection;
pub mod parameters;
pub mod reference_flow;
pub mod rescaler;
pub mod results;
pub mod sensitivity;
pub mod sparse;
pub mod variants;
pub mod xnec;

pub use computer::FlowDecompositionComputer;
pub use glsk::{AutoGlsk, FixedGlsk, GlskProvider, Glsks};
pub use indexes::NetworkMatrixIndexes;
pub use load_flow::{
    AcOutcome, DcLoadFlow, LoadFlowMode, LoadFlowReport, LoadFlowRunner, LoadFlowRunningService,
};
pub use losses::{losses_load_id, LossesCompensator};
pub use net_position::{FixedNetPositions, LoadFlowNetPositions, NetPositionProvider, NetPositions};
pub use nodal_injection::FlowColumn;
pub use parameters::FlowDecompositionParameters;
pub use rescaler::{rescale, RescaleMode};
pub use results::{
    DecomposedFlow, DecomposedFlowBuilder, FlowDecompositionResults, StateIntermediates,
};
pub use sensitivity::{
    DcSensitivityEngine, SensitivityFactor, SensitivityRunner, SensitivityValue,
    SensitivityVariable,
};
pub use variants::NetworkStateManager;
pub use xnec::{xnec_id, Xnec, XnecSelection, XnecSet, XnecsById};
