//! Load run state machine
//!
//! Every load operation walks the same states exactly once:
//! IDLE → RESOLVING → LOADING → DRAINING → REPORTING
//!
//! A rerun builds a new [`PipelineRun`]; a run never goes back.

use crate::error::{EtlError, EtlResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Load run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Created, nothing touched yet
    Idle,
    /// Dimension caches being seeded from the store
    Resolving,
    /// Chunks being dispatched to workers
    Loading,
    /// All chunks dispatched, awaiting results
    Draining,
    /// Summary assembled (terminal)
    Reporting,
}

impl RunState {
    /// The only state this one may move to
    pub fn successor(self) -> Option<RunState> {
        match self {
            RunState::Idle => Some(RunState::Resolving),
            RunState::Resolving => Some(RunState::Loading),
            RunState::Loading => Some(RunState::Draining),
            RunState::Draining => Some(RunState::Reporting),
            RunState::Reporting => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RunState::Reporting
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// One execution of a load operation
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub operation: &'static str,
    pub state: RunState,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl PipelineRun {
    pub fn new(operation: &'static str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation,
            state: RunState::Idle,
            transitions: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Move to `new_state`, which must be the current state's successor
    pub fn transition_to(&mut self, new_state: RunState) -> EtlResult<()> {
        if self.state.successor() != Some(new_state) {
            return Err(EtlError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };

        tracing::info!(
            run_id = %self.run_id,
            operation = self.operation,
            old_state = ?transition.old_state,
            new_state = ?new_state,
            "Run state transition"
        );

        self.state = new_state;
        self.transitions.push(transition);
        Ok(())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
