//! Load flow collaborators.
//!
//! The decomposition consumes load flows through the [`LoadFlowRunner`]
//! trait: solve a grid in AC or DC mode, write terminal active powers into
//! it, and report convergence. [`LoadFlowRunningService`] wraps a runner with
//! the divergence policy:
//!
//! | Mode | Diverged, fallback on | Diverged, fallback off |
//! |------|-----------------------|------------------------|
//! | AC   | warn, solve DC, AC flows unavailable | error |
//! | DC   | error | error |
//!
//! [`DcLoadFlow`] is the bundled runner. It answers AC requests with the
//! lossless DC solution.

pub mod dc;

pub use dc::{DcLoadFlow, DcSolution, BASE_MVA};

use flowdec_core::{FlowDecompositionError, FlowDecompositionResult, Grid, VariantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadFlowMode {
    Ac,
    Dc,
}

impl fmt::Display for LoadFlowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFlowMode::Ac => f.write_str("AC"),
            LoadFlowMode::Dc => f.write_str("DC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadFlowReport {
    pub converged: bool,
    pub message: Option<String>,
}

impl LoadFlowReport {
    pub fn converged() -> Self {
        Self {
            converged: true,
            message: None,
        }
    }

    pub fn diverged(message: impl Into<String>) -> Self {
        Self {
            converged: false,
            message: Some(message.into()),
        }
    }
}

/// External load flow solver.
///
/// On convergence the runner must have written `p` on every injection and
/// `p1`/`p2` on every branch of `grid`.
pub trait LoadFlowRunner {
    fn run(&self, grid: &mut Grid, mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport>;
}

/// Result of the AC reference computation of one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcOutcome {
    Converged,
    /// AC diverged and the grid holds a DC solution instead.
    FallbackToDc,
}

impl AcOutcome {
    pub fn ac_available(self) -> bool {
        self == AcOutcome::Converged
    }
}

pub struct LoadFlowRunningService<'a> {
    runner: &'a dyn LoadFlowRunner,
    dc_fallback_enabled: bool,
}

impl<'a> LoadFlowRunningService<'a> {
    pub fn new(runner: &'a dyn LoadFlowRunner, dc_fallback_enabled: bool) -> Self {
        Self {
            runner,
            dc_fallback_enabled,
        }
    }

    pub fn run_ac(&self, grid: &mut Grid, variant: &VariantId) -> FlowDecompositionResult<AcOutcome> {
        let report = self.runner.run(grid, LoadFlowMode::Ac)?;
        if report.converged {
            debug!(variant = %variant, "AC load flow converged");
            return Ok(AcOutcome::Converged);
        }
        if !self.dc_fallback_enabled {
            return Err(diverged(LoadFlowMode::Ac, variant));
        }
        warn!(
            variant = %variant,
            reason = report.message.as_deref().unwrap_or("unknown"),
            "AC load flow diverged, falling back to DC"
        );
        self.run_dc(grid, variant)?;
        Ok(AcOutcome::FallbackToDc)
    }

    pub fn run_dc(&self, grid: &mut Grid, variant: &VariantId) -> FlowDecompositionResult<()> {
        let report = self.runner.run(grid, LoadFlowMode::Dc)?;
        if !report.converged {
            return Err(diverged(LoadFlowMode::Dc, variant));
        }
        debug!(variant = %variant, "DC load flow converged");
        Ok(())
    }
}

fn diverged(mode: LoadFlowMode, variant: &VariantId) -> FlowDecompositionError {
    FlowDecompositionError::LoadFlowDiverged {
        mode: mode.to_string(),
        variant: variant.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Runner returning scripted convergence flags and recording calls.
    struct ScriptedRunner {
        ac_converges: bool,
        dc_converges: bool,
        calls: RefCell<Vec<LoadFlowMode>>,
    }

    impl ScriptedRunner {
        fn new(ac_converges: bool, dc_converges: bool) -> Self {
            Self {
                ac_converges,
                dc_converges,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl LoadFlowRunner for ScriptedRunner {
        fn run(&self, _grid: &mut Grid, mode: LoadFlowMode) -> FlowDecompositionResult<LoadFlowReport> {
            self.calls.borrow_mut().push(mode);
            let ok = match mode {
                LoadFlowMode::Ac => self.ac_converges,
                LoadFlowMode::Dc => self.dc_converges,
            };
            Ok(if ok {
                LoadFlowReport::converged()
            } else {
                LoadFlowReport::diverged("max iterations")
            })
        }
    }

    #[test]
    fn test_ac_converged() {
        let runner = ScriptedRunner::new(true, true);
        let service = LoadFlowRunningService::new(&runner, true);
        let outcome = service
            .run_ac(&mut Grid::new(), &VariantId::initial())
            .unwrap();
        assert!(outcome.ac_available());
        assert_eq!(*runner.calls.borrow(), vec![LoadFlowMode::Ac]);
    }

    #[test]
    fn test_ac_diverged_with_fallback() {
        let runner = ScriptedRunner::new(false, true);
        let service = LoadFlowRunningService::new(&runner, true);
        let outcome = service
            .run_ac(&mut Grid::new(), &VariantId::initial())
            .unwrap();
        assert_eq!(outcome, AcOutcome::FallbackToDc);
        assert_eq!(
            *runner.calls.borrow(),
            vec![LoadFlowMode::Ac, LoadFlowMode::Dc]
        );
    }

    #[test]
    fn test_ac_diverged_without_fallback() {
        let runner = ScriptedRunner::new(false, true);
        let service = LoadFlowRunningService::new(&runner, false);
        let err = service
            .run_ac(&mut Grid::new(), &VariantId::new("c1"))
            .unwrap_err();
        assert_eq!(err.to_string(), "AC load flow diverged on variant 'c1'");
    }

    #[test]
    fn test_dc_divergence_is_fatal_even_after_fallback() {
        let runner = ScriptedRunner::new(false, false);
        let service = LoadFlowRunningService::new(&runner, true);
        let err = service
            .run_ac(&mut Grid::new(), &VariantId::initial())
            .unwrap_err();
        assert!(matches!(
            err,
            FlowDecompositionError::LoadFlowDiverged { ref mode, .. } if mode == "DC"
        ));
    }
}
