//! Actions: the unit of work a player runs against an executable node.
//!
//! Every action pre-rolls its outcomes when it is built. Draws come from the
//! mission's shared RNG and stop at the first success; the rest of the
//! sequence is padded with successes up to the number of attempts the
//! mission's starting budget could pay for. Each completed run consumes the
//! head of the sequence, so a retry sees the next pre-rolled outcome instead
//! of a fresh roll.

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of an action. Unique across a mission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ActionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Everything needed to build an action except its id and outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionDraft {
    pub name: String,
    pub description: String,
    /// Simulated duration in milliseconds.
    pub process_time_ms: u64,
    /// Probability in `[0, 1]` that a single draw succeeds.
    pub success_chance: f64,
    pub resource_cost: f64,
    pub post_execution_success_text: String,
    pub post_execution_failure_text: String,
    /// Opaque identifiers of the assets this action affects.
    pub mechanism_state_ids: Vec<String>,
}

impl Default for ActionDraft {
    fn default() -> Self {
        Self {
            name: "New Action".to_string(),
            description: "Enter a description here.".to_string(),
            process_time_ms: 5000,
            success_chance: 0.5,
            resource_cost: 1.0,
            post_execution_success_text: "The action succeeded.".to_string(),
            post_execution_failure_text: "The action failed.".to_string(),
            mechanism_state_ids: Vec::new(),
        }
    }
}

/// An action owned by a node, with its remaining pre-rolled outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    id: ActionId,
    pub name: String,
    pub description: String,
    pub process_time_ms: u64,
    pub post_execution_success_text: String,
    pub post_execution_failure_text: String,
    pub mechanism_state_ids: Vec<String>,
    // Cost and chance are fixed once outcomes are rolled.
    success_chance: f64,
    resource_cost: f64,
    total_possible_attempts: u32,
    will_succeed: VecDeque<bool>,
}

impl Action {
    /// Build an action, pre-rolling its outcomes from `rng`.
    ///
    /// The caller validates `draft`; `success_chance` must lie in `[0, 1]`.
    pub(crate) fn roll<R: Rng + ?Sized>(
        id: ActionId,
        draft: &ActionDraft,
        initial_resources: f64,
        pre_roll_cap: u32,
        rng: &mut R,
    ) -> Self {
        let attempts =
            total_possible_attempts(initial_resources, draft.resource_cost, pre_roll_cap);
        let will_succeed = pre_roll(rng, attempts, draft.success_chance);
        Self {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            process_time_ms: draft.process_time_ms,
            post_execution_success_text: draft.post_execution_success_text.clone(),
            post_execution_failure_text: draft.post_execution_failure_text.clone(),
            mechanism_state_ids: draft.mechanism_state_ids.clone(),
            success_chance: draft.success_chance,
            resource_cost: draft.resource_cost,
            total_possible_attempts: attempts,
            will_succeed,
        }
    }

    pub fn id(&self) -> &ActionId {
        &self.id
    }

    pub fn success_chance(&self) -> f64 {
        self.success_chance
    }

    pub fn resource_cost(&self) -> f64 {
        self.resource_cost
    }

    /// `floor(initial_resources / resource_cost)`, bounded by the pre-roll cap.
    pub fn total_possible_attempts(&self) -> u32 {
        self.total_possible_attempts
    }

    /// Outcome the next run will have, if any attempts remain.
    pub fn will_succeed(&self) -> Option<bool> {
        self.will_succeed.front().copied()
    }

    /// Remaining pre-rolled outcomes, next first.
    pub fn outcomes(&self) -> impl Iterator<Item = bool> + '_ {
        self.will_succeed.iter().copied()
    }

    pub fn remaining_outcomes(&self) -> usize {
        self.will_succeed.len()
    }

    /// Drop the head outcome after a completed run and return it.
    pub(crate) fn consume_outcome(&mut self) -> Option<bool> {
        self.will_succeed.pop_front()
    }

    /// Rebuild the draft this action could be re-created from.
    pub fn to_draft(&self) -> ActionDraft {
        ActionDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            process_time_ms: self.process_time_ms,
            success_chance: self.success_chance,
            resource_cost: self.resource_cost,
            post_execution_success_text: self.post_execution_success_text.clone(),
            post_execution_failure_text: self.post_execution_failure_text.clone(),
            mechanism_state_ids: self.mechanism_state_ids.clone(),
        }
    }
}

/// Number of runs a full starting budget could pay for.
///
/// Zero-cost actions get `cap` attempts.
pub fn total_possible_attempts(initial_resources: f64, resource_cost: f64, cap: u32) -> u32 {
    if resource_cost <= 0.0 {
        return cap;
    }
    let attempts = (initial_resources / resource_cost).floor();
    if attempts >= cap as f64 {
        cap
    } else if attempts > 0.0 {
        attempts as u32
    } else {
        0
    }
}

/// Pre-roll up to `attempts` outcomes.
///
/// Draws stop at the first success; the remaining slots are filled with
/// successes. If every draw fails, the sequence is `attempts` failures.
pub fn pre_roll<R: Rng + ?Sized>(rng: &mut R, attempts: u32, success_chance: f64) -> VecDeque<bool> {
    let len = attempts as usize;
    let mut outcomes = VecDeque::with_capacity(len);
    while outcomes.len() < len {
        let hit = rng.gen_bool(success_chance);
        outcomes.push_back(hit);
        if hit {
            break;
        }
    }
    outcomes.resize(len, true);
    outcomes
}
