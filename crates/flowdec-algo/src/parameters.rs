//! Run parameters of the flow decomposition.

use crate::rescaler::{RescaleMode, DEFAULT_PROPORTIONAL_MIN_FLOW};
use flowdec_core::{FlowDecompositionError, FlowDecompositionResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOSSES_COMPENSATION_EPSILON: f64 = 1e-5;
pub const DEFAULT_SENSITIVITY_EPSILON: f64 = 1e-5;
pub const DEFAULT_SENSITIVITY_VARIABLE_BATCH_SIZE: usize = 15_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDecompositionParameters {
    /// Move AC losses onto per-bus loads before the DC solve
    pub enable_losses_compensation: bool,
    /// Losses below this magnitude (MW) are ignored
    pub losses_compensation_epsilon: f64,
    /// Sensitivities below this magnitude are not stored
    pub sensitivity_epsilon: f64,
    pub rescale_mode: RescaleMode,
    /// `|dc|` below which proportional rescaling is skipped (MW)
    pub proportional_rescaler_min_flow: f64,
    /// Solve DC instead when AC diverges, AC flows reported as NaN
    pub dc_fallback_enabled_after_ac_divergence: bool,
    /// Variables per sensitivity request
    pub sensitivity_variable_batch_size: usize,
    /// Keep PTDF, PSDF and nodal injections in the results
    pub save_intermediates: bool,
}

impl FlowDecompositionParameters {
    pub fn new() -> Self {
        Self {
            enable_losses_compensation: false,
            losses_compensation_epsilon: DEFAULT_LOSSES_COMPENSATION_EPSILON,
            sensitivity_epsilon: DEFAULT_SENSITIVITY_EPSILON,
            rescale_mode: RescaleMode::None,
            proportional_rescaler_min_flow: DEFAULT_PROPORTIONAL_MIN_FLOW,
            dc_fallback_enabled_after_ac_divergence: true,
            sensitivity_variable_batch_size: DEFAULT_SENSITIVITY_VARIABLE_BATCH_SIZE,
            save_intermediates: false,
        }
    }

    pub fn with_losses_compensation(mut self, enabled: bool) -> Self {
        self.enable_losses_compensation = enabled;
        self
    }

    pub fn with_losses_compensation_epsilon(mut self, epsilon: f64) -> Self {
        self.losses_compensation_epsilon = epsilon;
        self
    }

    pub fn with_sensitivity_epsilon(mut self, epsilon: f64) -> Self {
        self.sensitivity_epsilon = epsilon;
        self
    }

    pub fn with_rescale_mode(mut self, mode: RescaleMode) -> Self {
        self.rescale_mode = mode;
        self
    }

    pub fn with_proportional_rescaler_min_flow(mut self, min_flow: f64) -> Self {
        self.proportional_rescaler_min_flow = min_flow;
        self
    }

    pub fn with_dc_fallback_after_ac_divergence(mut self, enabled: bool) -> Self {
        self.dc_fallback_enabled_after_ac_divergence = enabled;
        self
    }

    pub fn with_sensitivity_variable_batch_size(mut self, batch_size: usize) -> Self {
        self.sensitivity_variable_batch_size = batch_size;
        self
    }

    pub fn with_save_intermediates(mut self, enabled: bool) -> Self {
        self.save_intermediates = enabled;
        self
    }

    pub fn validate(&self) -> FlowDecompositionResult<()> {
        let epsilons = [
            ("losses_compensation_epsilon", self.losses_compensation_epsilon),
            ("sensitivity_epsilon", self.sensitivity_epsilon),
            (
                "proportional_rescaler_min_flow",
                self.proportional_rescaler_min_flow,
            ),
        ];
        for (name, value) in epsilons {
            if value.is_nan() || value < 0.0 {
                return Err(FlowDecompositionError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.sensitivity_variable_batch_size == 0 {
            return Err(FlowDecompositionError::Config(
                "sensitivity_variable_batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for FlowDecompositionParameters {
    fn default() -> Self {
        Self::new()
    }
}
