//! Action execution: `Idle -> Executing -> Completed(success | failure)`.
//!
//! Time is virtual. `execute()` debits resources immediately and schedules a
//! completion `process_time_ms` ahead of the mission clock; [`Mission::advance`]
//! moves the clock and fires whatever came due, oldest first. A node that
//! completed with a failure may run again and draws the next pre-rolled
//! outcome; a node that succeeded never runs again.

use crate::action::ActionId;
use crate::console::ConsoleKind;
use crate::error::{ExecutionNotReadyError, NotReadyReason, Result, StructuralError};
use crate::events::MissionEvent;
use crate::mission::Mission;
use crate::node::NodeId;

/// A scheduled completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingExecution {
    pub(crate) node: NodeId,
    pub(crate) action: ActionId,
    pub(crate) due_at_ms: u64,
    pub(crate) seq: u64,
}

/// What happened when a completion fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub node: NodeId,
    pub action: ActionId,
    pub succeeded: bool,
    /// The success revealed the node's children.
    pub expanded: bool,
    pub console_key: u64,
    pub completed_at_ms: u64,
}

impl Mission {
    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// True while any completion is pending.
    pub fn is_busy(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_executions(&self) -> usize {
        self.pending.len()
    }

    /// Virtual time of the next pending completion.
    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.first().map(|p| p.due_at_ms)
    }

    /// Check every precondition of `execute()` without mutating anything.
    pub fn check_ready(&self, node: &NodeId, action: &ActionId) -> Result<()> {
        let n = self.get(node)?;
        let a = n.action(action).ok_or_else(|| StructuralError::UnknownAction {
            node: node.clone(),
            action: action.clone(),
        })?;

        let reason = if n.executing {
            Some(NotReadyReason::AlreadyExecuting)
        } else if n.succeeded() {
            // Only a success is terminal; a failed run may be retried.
            Some(NotReadyReason::AlreadySucceeded)
        } else if !n.executable {
            Some(NotReadyReason::NotExecutable)
        } else if self.config().exclusive_execution && self.is_busy() {
            Some(NotReadyReason::MissionBusy)
        } else if a.resource_cost() > self.resources() {
            Some(NotReadyReason::InsufficientResources)
        } else if a.remaining_outcomes() == 0 {
            Some(NotReadyReason::OutcomesExhausted)
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ExecutionNotReadyError {
                node: node.clone(),
                action: action.clone(),
                reason,
            }
            .into()),
            None => Ok(()),
        }
    }

    pub fn ready_to_execute(&self, node: &NodeId, action: &ActionId) -> bool {
        self.check_ready(node, action).is_ok()
    }

    /// Start executing `action` on `node`. Returns the virtual time the run
    /// completes at.
    pub fn execute(&mut self, node: &NodeId, action: &ActionId) -> Result<u64> {
        self.check_ready(node, action)?;

        let n = self.get_mut(node)?;
        let a = n.action(action).ok_or_else(|| StructuralError::UnknownAction {
            node: node.clone(),
            action: action.clone(),
        })?;
        let cost = a.resource_cost();
        let process_time = a.process_time_ms;
        n.executing = true;
        n.executed = false;
        n.last_outcome = None;
        n.selected_action = Some(action.clone());

        let due_at_ms = self.now_ms.saturating_add(process_time);
        let seq = self.next_schedule_seq;
        self.next_schedule_seq += 1;
        let pending = PendingExecution {
            node: node.clone(),
            action: action.clone(),
            due_at_ms,
            seq,
        };
        let index = self
            .pending
            .partition_point(|p| (p.due_at_ms, p.seq) <= (due_at_ms, seq));
        self.pending.insert(index, pending);

        log::info!(
            "executing {} on {} (cost {}, due at {} ms)",
            action,
            node,
            cost,
            due_at_ms
        );
        self.debit(cost);
        self.emit(MissionEvent::ExecutionStarted {
            node: node.clone(),
            action: action.clone(),
            due_at_ms,
        });
        Ok(due_at_ms)
    }

    /// Execute the node's selected action.
    pub fn execute_selected(&mut self, node: &NodeId) -> Result<u64> {
        let action = self
            .get(node)?
            .selected_action
            .clone()
            .ok_or_else(|| StructuralError::NoSelectedAction(node.clone()))?;
        self.execute(node, &action)
    }

    /// Move virtual time forward by `delta_ms`, firing every completion that
    /// comes due on the way.
    pub fn advance(&mut self, delta_ms: u64) -> Vec<ExecutionReport> {
        let until = self.now_ms.saturating_add(delta_ms);
        let mut reports = Vec::new();
        while self.pending.first().is_some_and(|p| p.due_at_ms <= until) {
            let due = self.pending.remove(0);
            self.now_ms = due.due_at_ms;
            if let Some(report) = self.complete(due) {
                reports.push(report);
            }
        }
        self.now_ms = until;
        reports
    }

    /// Advance until nothing is pending.
    pub fn run_until_idle(&mut self) -> Vec<ExecutionReport> {
        let mut reports = Vec::new();
        while let Some(due) = self.next_due_ms() {
            let delta = due.saturating_sub(self.now_ms);
            reports.extend(self.advance(delta));
        }
        reports
    }

    /// Whether a success is still reachable with the resources left: some
    /// outcome the remaining budget can pay for is a success.
    pub fn outcomes_reachable(&self, node: &NodeId, action: &ActionId) -> Result<bool, StructuralError> {
        let a = self
            .get(node)?
            .action(action)
            .ok_or_else(|| StructuralError::UnknownAction {
                node: node.clone(),
                action: action.clone(),
            })?;
        let affordable = if a.resource_cost() <= 0.0 {
            a.remaining_outcomes()
        } else {
            (self.resources() / a.resource_cost()).floor() as usize
        };
        Ok(a.outcomes().take(affordable).any(|o| o))
    }

    fn complete(&mut self, due: PendingExecution) -> Option<ExecutionReport> {
        let Some(node) = self.nodes.get_mut(&due.node) else {
            log::warn!("completion for missing node {} dropped", due.node);
            return None;
        };
        if node.action(&due.action).is_none() {
            log::warn!("completion for missing action {} dropped", due.action);
            node.executing = false;
            return None;
        }
        let action = node.action_mut(&due.action)?;

        let succeeded = action.consume_outcome().unwrap_or(false);
        let text = if succeeded {
            action.post_execution_success_text.clone()
        } else {
            action.post_execution_failure_text.clone()
        };

        node.executing = false;
        node.executed = true;
        node.last_outcome = Some(succeeded);
        let expanded = succeeded && node.has_children() && !node.expanded;
        if expanded {
            node.expanded = true;
        }

        log::info!(
            "{} on {} completed: {}",
            due.action,
            due.node,
            if succeeded { "success" } else { "failure" }
        );
        let kind = if succeeded {
            ConsoleKind::Success
        } else {
            ConsoleKind::Failure
        };
        let console_key =
            self.output_to_console(kind, due.node.clone(), Some(due.action.clone()), text);
        self.emit(MissionEvent::ExecutionCompleted {
            node: due.node.clone(),
            action: due.action.clone(),
            succeeded,
        });
        if expanded {
            self.handle_structure_change();
        }

        Some(ExecutionReport {
            node: due.node,
            action: due.action,
            succeeded,
            expanded,
            console_key,
            completed_at_ms: self.now_ms,
        })
    }
}
