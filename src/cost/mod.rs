//! Resource cost monitor
//!
//! # Spell: CostLadder
//! ^ Intent: step the capture graph down in quality until both normalized costs are within budget
//!
//! - exceeded flags select a fixed priority ladder
//! - after any successful step the ladder is re-evaluated from the top
//! - a run ends when costs are within budget or every step of the ladder refuses
//! - a refused step never mutates the graph
//! - exhaustion is a soft failure: logged, session keeps running

mod actions;
mod pressure;

pub use actions::{reduce_frame_rate, reduce_resolution, reduce_video_input_ports};
pub use pressure::{apply_pressure_level, PressureResponse};

use crate::buffer::DevicePosition;
use crate::config::DegradationConfig;
use crate::graph::{CaptureGraph, CostState};
use serde::{Deserialize, Serialize};
use std::fmt;

use self::DegradationStep::*;
use crate::buffer::DevicePosition::{Back, Front};

/// Which normalized costs are above the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExceededCosts {
    pub pressure: bool,
    pub hardware: bool,
}

impl ExceededCosts {
    pub const NONE: ExceededCosts = ExceededCosts {
        pressure: false,
        hardware: false,
    };

    pub fn from_costs(costs: &CostState, ceiling: f64) -> Self {
        Self {
            pressure: costs.pressure_cost > ceiling,
            hardware: costs.hardware_cost > ceiling,
        }
    }

    pub fn any(&self) -> bool {
        self.pressure || self.hardware
    }
}

/// One reduction the monitor can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DegradationStep {
    ReduceResolution(DevicePosition),
    ReduceVideoInputPorts,
    ReduceFrameRate(DevicePosition),
}

impl fmt::Display for DegradationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradationStep::ReduceResolution(p) => write!(f, "reduce {} resolution", p),
            DegradationStep::ReduceVideoInputPorts => f.write_str("reduce video input ports"),
            DegradationStep::ReduceFrameRate(p) => write!(f, "reduce {} frame rate", p),
        }
    }
}

const PRESSURE_LADDER: &[DegradationStep] = &[
    ReduceResolution(Front),
    ReduceVideoInputPorts,
    ReduceResolution(Back),
    ReduceFrameRate(Front),
    ReduceFrameRate(Back),
];

const HARDWARE_LADDER: &[DegradationStep] = &[
    ReduceResolution(Front),
    ReduceResolution(Back),
    ReduceFrameRate(Front),
    ReduceFrameRate(Back),
];

/// Priority ladder for a set of exceeded costs. Empty when nothing is
/// exceeded.
pub fn ladder_for(exceeded: ExceededCosts) -> &'static [DegradationStep] {
    match (exceeded.pressure, exceeded.hardware) {
        (true, false) => PRESSURE_LADDER,
        (_, true) => HARDWARE_LADDER,
        (false, false) => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptationOutcome {
    WithinBudget,
    /// Costs still exceeded and no step applies.
    Exhausted,
    /// Stopped by the configured step limit.
    StepLimit,
}

/// What one adaptation run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    pub steps_applied: Vec<DegradationStep>,
    pub initial_costs: CostState,
    pub final_costs: CostState,
    pub outcome: AdaptationOutcome,
    /// Number of cost evaluations, including the final one.
    pub checks: u32,
}

impl DegradationReport {
    pub fn graph_changed(&self) -> bool {
        !self.steps_applied.is_empty()
    }
}

/// Runs the degradation ladder against a capture graph.
#[derive(Debug, Clone, Default)]
pub struct CostMonitor {
    config: DegradationConfig,
}

impl CostMonitor {
    pub fn new(config: DegradationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }

    /// Apply one step. `true` when the graph changed.
    pub fn apply<G: CaptureGraph + ?Sized>(&self, graph: &mut G, step: DegradationStep) -> bool {
        match step {
            ReduceResolution(position) => reduce_resolution(graph, position, &self.config),
            ReduceVideoInputPorts => reduce_video_input_ports(graph),
            ReduceFrameRate(position) => reduce_frame_rate(graph, position, &self.config),
        }
    }

    /// Evaluate costs and degrade until within budget or out of options.
    pub fn check_system_cost<G: CaptureGraph + ?Sized>(&self, graph: &mut G) -> DegradationReport {
        let initial_costs = graph.cost_state();
        let mut costs = initial_costs;
        let mut checks = 1;
        let mut steps_applied = Vec::new();

        let outcome = loop {
            let exceeded = ExceededCosts::from_costs(&costs, self.config.cost_ceiling);
            if !exceeded.any() {
                break AdaptationOutcome::WithinBudget;
            }
            if steps_applied.len() >= self.config.max_steps as usize {
                log::warn!(
                    "Stopping cost adaptation after {} steps ({})",
                    steps_applied.len(),
                    costs
                );
                break AdaptationOutcome::StepLimit;
            }

            let applied = ladder_for(exceeded)
                .iter()
                .copied()
                .find(|step| self.apply(graph, *step));

            match applied {
                Some(step) => {
                    log::info!("Applied {} ({})", step, costs);
                    steps_applied.push(step);
                    costs = graph.cost_state();
                    checks += 1;
                }
                None => {
                    log::warn!("Unable to further reduce session cost ({})", costs);
                    break AdaptationOutcome::Exhausted;
                }
            }
        };

        DegradationReport {
            steps_applied,
            initial_costs,
            final_costs: costs,
            outcome,
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeded_is_strictly_above_ceiling() {
        let at = ExceededCosts::from_costs(&CostState::new(1.0, 1.0), 1.0);
        assert_eq!(at, ExceededCosts::NONE);
        let above = ExceededCosts::from_costs(&CostState::new(1.01, 0.2), 1.0);
        assert!(above.pressure && !above.hardware);
    }

    #[test]
    fn test_ladders() {
        let pressure = ladder_for(ExceededCosts {
            pressure: true,
            hardware: false,
        });
        assert_eq!(pressure.len(), 5);
        assert_eq!(pressure[1], ReduceVideoInputPorts);

        let hardware = ladder_for(ExceededCosts {
            pressure: false,
            hardware: true,
        });
        let both = ladder_for(ExceededCosts {
            pressure: true,
            hardware: true,
        });
        assert_eq!(hardware, both);
        assert!(ladder_for(ExceededCosts::NONE).is_empty());
    }

    #[test]
    fn test_hardware_ladder_is_subsequence_of_pressure_ladder() {
        let mut pressure = PRESSURE_LADDER.iter();
        for step in HARDWARE_LADDER {
            assert!(pressure.any(|s| s == step), "{} out of order", step);
        }
        assert!(!HARDWARE_LADDER.contains(&ReduceVideoInputPorts));
    }
}
