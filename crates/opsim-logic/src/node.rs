//! Nodes of the mission tree.
//!
//! The mission owns every node in an id-keyed index. Parent and child links
//! are ids, so a node never borrows another node; structural changes go
//! through [`Mission`](crate::mission::Mission) so the tree invariants hold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionDraft, ActionId};

/// Identifier of a node. Unique within a mission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a node lands relative to a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Relation {
    /// Appended as the target's last child.
    Parent,
    /// Inserted immediately before the target.
    PreviousSibling,
    /// Inserted immediately after the target.
    FollowingSibling,
}

/// Execution state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Executing,
    Completed { succeeded: bool },
}

/// Everything needed to add a node except its id and position.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub name: String,
    pub color: String,
    pub pre_execution_text: String,
    pub executable: bool,
    pub device: bool,
    pub actions: Vec<ActionDraft>,
}

impl Default for NodeDraft {
    fn default() -> Self {
        Self {
            name: "New Node".to_string(),
            color: "default".to_string(),
            pre_execution_text: String::new(),
            executable: false,
            device: false,
            actions: Vec::new(),
        }
    }
}

/// A vertex in the mission tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub name: String,
    pub color: String,
    pub pre_execution_text: String,
    /// Marks nodes that stand for a device rather than a system.
    pub device: bool,
    pub(crate) executable: bool,
    pub(crate) depth: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) actions: Vec<Action>,
    pub(crate) selected_action: Option<ActionId>,
    pub(crate) expanded: bool,
    pub(crate) executing: bool,
    pub(crate) executed: bool,
    /// Outcome of the latest completed run.
    pub(crate) last_outcome: Option<bool>,
}

impl Node {
    pub(crate) fn new(id: NodeId, draft: &NodeDraft, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            id,
            name: draft.name.clone(),
            color: draft.color.clone(),
            pre_execution_text: draft.pre_execution_text.clone(),
            device: draft.device,
            executable: draft.executable,
            depth,
            parent,
            children: Vec::new(),
            actions: Vec::new(),
            selected_action: None,
            expanded: false,
            executing: false,
            executed: false,
            last_outcome: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// `None` only for the root.
    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Expand/collapse only apply to nodes with children.
    pub fn is_expandable(&self) -> bool {
        self.has_children()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Distance from the root (root = 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn executable(&self) -> bool {
        self.executable
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, id: &ActionId) -> Option<&Action> {
        self.actions.iter().find(|a| a.id() == id)
    }

    pub(crate) fn action_mut(&mut self, id: &ActionId) -> Option<&mut Action> {
        self.actions.iter_mut().find(|a| a.id() == id)
    }

    pub fn selected_action(&self) -> Option<&Action> {
        self.selected_action.as_ref().and_then(|id| self.action(id))
    }

    pub fn executing(&self) -> bool {
        self.executing
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    /// True once a completed run drew a success. Permanent.
    pub fn succeeded(&self) -> bool {
        self.executed && self.last_outcome == Some(true)
    }

    pub fn execution_state(&self) -> ExecutionState {
        if self.executing {
            ExecutionState::Executing
        } else if self.executed {
            ExecutionState::Completed {
                succeeded: self.succeeded(),
            }
        } else {
            ExecutionState::Idle
        }
    }
}
