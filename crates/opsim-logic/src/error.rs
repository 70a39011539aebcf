//! Error taxonomy for mission operations.
//!
//! Structural errors come from invalid tree operations, not-ready errors from
//! execution preconditions, document errors from malformed input. Nothing here
//! is retried by the model; callers decide how to present them.

use std::fmt;

use thiserror::Error;

use crate::action::ActionId;
use crate::config::ConfigError;
use crate::node::NodeId;

/// An invalid operation on the node tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// Expand/collapse/toggle on a node without children.
    #[error("node {0} has no child nodes")]
    NoChildNodes(NodeId),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {node} has no action {action}")]
    UnknownAction { node: NodeId, action: ActionId },
    /// The placement target lies inside the subtree being placed.
    #[error("cannot place node {node} relative to {target}: target is the node or one of its descendants")]
    WouldNestInSelf { node: NodeId, target: NodeId },
    #[error("the root node cannot be deleted")]
    CannotDeleteRoot,
    #[error("the root node has no siblings")]
    RootHasNoSiblings,
    /// The node (or a node in its subtree) has a completion pending.
    #[error("node {0} has an execution in flight")]
    NodeExecuting(NodeId),
    #[error("node {0} is executable and must keep at least one action")]
    LastAction(NodeId),
    #[error("node {0} has no selected action")]
    NoSelectedAction(NodeId),
}

/// Why an action cannot be executed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    /// `resource_cost` exceeds the mission's remaining resources.
    InsufficientResources,
    NotExecutable,
    /// The node already completed a successful run.
    AlreadySucceeded,
    /// The node is waiting on its completion.
    AlreadyExecuting,
    /// Every pre-rolled outcome has been consumed.
    OutcomesExhausted,
    /// Another execution is in flight and the mission allows only one.
    MissionBusy,
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NotReadyReason::InsufficientResources => "not enough resources remain",
            NotReadyReason::NotExecutable => "node is not executable",
            NotReadyReason::AlreadySucceeded => "node has already succeeded",
            NotReadyReason::AlreadyExecuting => "node is already executing",
            NotReadyReason::OutcomesExhausted => "no execution attempts remain",
            NotReadyReason::MissionBusy => "another execution is in progress",
        };
        f.write_str(text)
    }
}

/// `execute()` was called while the action was not ready.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("action {action} on node {node} cannot execute: {reason}")]
pub struct ExecutionNotReadyError {
    pub node: NodeId,
    pub action: ActionId,
    pub reason: NotReadyReason,
}

/// A mission document (or draft) failed validation. No partial mission is built.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed mission JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} must not be empty")]
    EmptyId(&'static str),
    #[error("duplicate node id {0}")]
    DuplicateNode(String),
    #[error("duplicate action id {0}")]
    DuplicateAction(String),
    #[error("{field} of {owner} must be a finite, non-negative number (got {value})")]
    InvalidNumber {
        owner: String,
        field: &'static str,
        value: f64,
    },
    #[error("success chance of {owner} must lie in [0, 1] (got {value})")]
    SuccessChanceOutOfRange { owner: String, value: f64 },
    #[error("resources {resources} exceed initial resources {initial}")]
    ResourcesAboveInitial { resources: f64, initial: f64 },
    #[error("node structure references unknown node {0}")]
    UnknownStructureNode(String),
    #[error("node structure entry {key} is malformed: {detail}")]
    MalformedStructure { key: String, detail: String },
    #[error("node {0} appears more than once in the node structure")]
    DuplicatePlacement(String),
    #[error("node {0} is missing from the node structure")]
    UnplacedNode(String),
}

/// Any error the mission model can raise.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    NotReady(#[from] ExecutionNotReadyError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("invalid mission config: {}", format_config_errors(.0))]
    Config(Vec<ConfigError>),
}

fn format_config_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
