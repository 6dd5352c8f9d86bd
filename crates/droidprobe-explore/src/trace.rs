use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::{ExploreAction, HandlerKind};

/// One recorded engine action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    /// Engine step (1-based `step()` invocation) that produced the action.
    pub step_number: u64,
    pub action: ExploreAction,
}

/// Ordered log of the actions taken in a session.
#[derive(Debug, Clone, Default)]
pub struct ActionTrace {
    steps: Vec<TraceStep>,
}

impl ActionTrace {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn record(&mut self, step_number: u64, action: ExploreAction) {
        self.steps.push(TraceStep {
            step_number,
            action,
        });
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of actions per handler.
    pub fn counts(&self) -> BTreeMap<HandlerKind, u64> {
        let mut counts = BTreeMap::new();
        for step in &self.steps {
            *counts.entry(step.action.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// Exploration totals for the session report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExploreSummary {
    /// `step()` invocations.
    pub steps: u64,
    /// Steps that performed an action.
    pub actions: u64,
    pub by_handler: BTreeMap<HandlerKind, u64>,
    pub back_presses: u64,
    /// Visited-set size when the summary was taken.
    pub visited: usize,
}
