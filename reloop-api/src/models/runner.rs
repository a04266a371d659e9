//! Teardown runner state machine
//!
//! Walks a device's ordered steps. Moving forward into a step that carries
//! a safety gate stops until that gate is acknowledged; moving backward is
//! always allowed and never raises a gate.

use reloop_common::db::TeardownStep;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Device has no teardown steps")]
    NoSteps,

    #[error("No safety gate is awaiting acknowledgment")]
    NoPendingGate,
}

/// Result of a navigation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunnerMove {
    /// Now showing `index`
    Advanced { index: usize },
    /// Step `step_id` must be acknowledged before it can be entered
    GateRequired {
        step_id: Uuid,
        index: usize,
        warnings: Vec<String>,
    },
    /// Moved past the final step
    Finished,
    /// Nothing changed (e.g. previous on the first step)
    Stayed { index: usize },
}

#[derive(Debug, Clone)]
pub struct TeardownRunner {
    steps: Vec<TeardownStep>,
    current: usize,
    acknowledged: HashSet<Uuid>,
    /// Index of the gated step awaiting acknowledgment
    pending_gate: Option<usize>,
}

impl TeardownRunner {
    /// Start at the first step
    ///
    /// If the first step is gated, the gate is pending straight away.
    pub fn new(mut steps: Vec<TeardownStep>) -> Result<Self, RunnerError> {
        if steps.is_empty() {
            return Err(RunnerError::NoSteps);
        }
        steps.sort_by_key(|s| s.step_number);

        let pending_gate = if steps[0].has_safety_gate { Some(0) } else { None };

        Ok(Self {
            steps,
            current: 0,
            acknowledged: HashSet::new(),
            pending_gate,
        })
    }

    pub fn steps(&self) -> &[TeardownStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &TeardownStep {
        &self.steps[self.current]
    }

    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.steps.len()
    }

    /// Share of steps reached, 0-100
    pub fn progress_percent(&self) -> f64 {
        ((self.current + 1) as f64 / self.steps.len() as f64) * 100.0
    }

    pub fn pending_gate(&self) -> Option<&TeardownStep> {
        self.pending_gate.map(|i| &self.steps[i])
    }

    pub fn is_acknowledged(&self, step_id: Uuid) -> bool {
        self.acknowledged.contains(&step_id)
    }

    fn gate_move(&self, index: usize) -> RunnerMove {
        let step = &self.steps[index];
        RunnerMove::GateRequired {
            step_id: step.id,
            index,
            warnings: step.safety_warnings.clone(),
        }
    }

    /// Move to the next step, or report the gate that blocks it
    pub fn advance(&mut self) -> RunnerMove {
        if let Some(index) = self.pending_gate {
            return self.gate_move(index);
        }

        if self.is_last() {
            return RunnerMove::Finished;
        }

        let next = self.current + 1;
        let step = &self.steps[next];
        if step.has_safety_gate && !self.acknowledged.contains(&step.id) {
            self.pending_gate = Some(next);
            return self.gate_move(next);
        }

        self.current = next;
        RunnerMove::Advanced { index: next }
    }

    /// Record the pending gate as satisfied and enter its step
    pub fn acknowledge_gate(&mut self) -> Result<RunnerMove, RunnerError> {
        let index = self.pending_gate.take().ok_or(RunnerError::NoPendingGate)?;
        self.acknowledged.insert(self.steps[index].id);
        self.current = index;
        Ok(RunnerMove::Advanced { index })
    }

    /// Dismiss the gate prompt without entering the step
    ///
    /// A gate on the first step cannot be dismissed; there is nowhere else to be.
    pub fn cancel_gate(&mut self) {
        if self.pending_gate != Some(0) {
            self.pending_gate = None;
        }
    }

    /// Move to the previous step
    pub fn retreat(&mut self) -> RunnerMove {
        if self.pending_gate.is_some_and(|i| i != 0) {
            self.pending_gate = None;
        }

        if self.current == 0 {
            return RunnerMove::Stayed { index: 0 };
        }

        self.current -= 1;
        RunnerMove::Advanced {
            index: self.current,
        }
    }
}
