//! Mission documents: the nested JSON a mission is imported from and exported to.
//!
//! A document is validated as a whole before anything is built, so a
//! malformed document never yields a partial mission. Nodes are built in
//! depth-first pre-order with each node's actions before its children; that
//! order fixes how the shared RNG is consumed, so the same document and seed
//! always pre-roll the same outcomes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionDraft, ActionId};
use crate::config::MissionConfig;
use crate::error::{DocumentError, Result};
use crate::mission::Mission;
use crate::node::{Node, NodeDraft, NodeId};

// ============================================================================
// WIRE FORMAT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionDocument {
    pub mission_id: String,
    pub name: String,
    pub initial_resources: f64,
    /// Remaining budget; defaults to `initial_resources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<f64>,
    /// RNG seed; defaults to the config seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub root_node: NodeDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub node_id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub pre_execution_text: String,
    #[serde(default)]
    pub executable: bool,
    #[serde(default)]
    pub device: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
    #[serde(default)]
    pub actions: Vec<ActionDocument>,
    #[serde(default)]
    pub child_nodes: Vec<NodeDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDocument {
    pub action_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "processTime")]
    pub process_time_ms: u64,
    pub success_chance: f64,
    pub resource_cost: f64,
    #[serde(default)]
    pub post_execution_success_text: String,
    #[serde(default)]
    pub post_execution_failure_text: String,
    #[serde(default, rename = "mechanismStateIDs", alias = "commandScripts")]
    pub mechanism_state_ids: Vec<String>,
}

fn default_color() -> String {
    NodeDraft::default().color
}

impl NodeDocument {
    /// A leaf with default presentation fields.
    pub fn new(node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            color: default_color(),
            pre_execution_text: String::new(),
            executable: false,
            device: false,
            is_expanded: None,
            actions: Vec::new(),
            child_nodes: Vec::new(),
        }
    }

    fn draft(&self) -> NodeDraft {
        NodeDraft {
            name: self.name.clone(),
            color: self.color.clone(),
            pre_execution_text: self.pre_execution_text.clone(),
            executable: self.executable,
            device: self.device,
            actions: Vec::new(),
        }
    }
}

impl ActionDocument {
    pub fn draft(&self) -> ActionDraft {
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

impl From<&Action> for ActionDocument {
    fn from(action: &Action) -> Self {
        let draft = action.to_draft();
        Self {
            action_id: action.id().to_string(),
            name: draft.name,
            description: draft.description,
            process_time_ms: draft.process_time_ms,
            success_chance: draft.success_chance,
            resource_cost: draft.resource_cost,
            post_execution_success_text: draft.post_execution_success_text,
            post_execution_failure_text: draft.post_execution_failure_text,
            mechanism_state_ids: draft.mechanism_state_ids,
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// A budget or cost must be finite and non-negative.
pub(crate) fn check_amount(owner: &str, field: &'static str, value: f64) -> Result<(), DocumentError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DocumentError::InvalidNumber {
            owner: owner.to_string(),
            field,
            value,
        })
    }
}

pub(crate) fn check_action_draft(owner: &str, draft: &ActionDraft) -> Result<(), DocumentError> {
    check_amount(owner, "resourceCost", draft.resource_cost)?;
    if !(0.0..=1.0).contains(&draft.success_chance) {
        return Err(DocumentError::SuccessChanceOutOfRange {
            owner: owner.to_string(),
            value: draft.success_chance,
        });
    }
    Ok(())
}

/// Check ids and numbers across the whole tree.
pub fn validate_document(doc: &MissionDocument) -> Result<(), DocumentError> {
    if doc.mission_id.trim().is_empty() {
        return Err(DocumentError::EmptyId("mission id"));
    }
    let owner = format!("mission {}", doc.mission_id);
    check_amount(&owner, "initialResources", doc.initial_resources)?;
    if let Some(resources) = doc.resources {
        check_amount(&owner, "resources", resources)?;
        if resources > doc.initial_resources {
            return Err(DocumentError::ResourcesAboveInitial {
                resources,
                initial: doc.initial_resources,
            });
        }
    }

    let mut node_ids = HashSet::new();
    let mut action_ids = HashSet::new();
    let mut stack = vec![&doc.root_node];
    while let Some(node) = stack.pop() {
        if node.node_id.trim().is_empty() {
            return Err(DocumentError::EmptyId("node id"));
        }
        if !node_ids.insert(node.node_id.as_str()) {
            return Err(DocumentError::DuplicateNode(node.node_id.clone()));
        }
        for action in &node.actions {
            if action.action_id.trim().is_empty() {
                return Err(DocumentError::EmptyId("action id"));
            }
            if !action_ids.insert(action.action_id.as_str()) {
                return Err(DocumentError::DuplicateAction(action.action_id.clone()));
            }
            check_action_draft(&format!("action {}", action.action_id), &action.draft())?;
        }
        stack.extend(node.child_nodes.iter());
    }
    Ok(())
}

// ============================================================================
// IMPORT / EXPORT
// ============================================================================

impl Mission {
    /// Build a mission from a validated document.
    ///
    /// Executable nodes without actions receive the configured default action
    /// once every document action has been built.
    pub fn from_document(doc: &MissionDocument, config: MissionConfig) -> Result<Mission> {
        validate_document(doc)?;

        let root_doc = &doc.root_node;
        let mut mission = Mission::with_root(
            doc.mission_id.clone(),
            doc.name.clone(),
            doc.initial_resources,
            doc.resources.unwrap_or(doc.initial_resources),
            doc.seed,
            NodeId::new(root_doc.node_id.clone()),
            &root_doc.draft(),
            config,
        )?;

        let root = mission.root_id().clone();
        mission.attach_document_actions(&root, root_doc)?;
        mission.insert_subtree(&root, root_doc)?;
        let root_expanded = root_doc.is_expanded.unwrap_or(true) && !root_doc.child_nodes.is_empty();
        mission.get_mut(&root)?.expanded = root_expanded;

        for id in mission.node_ids() {
            let needs_default = mission
                .node(&id)
                .is_some_and(|n| n.executable() && n.actions().is_empty());
            if needs_default {
                mission.set_executable(&id, true)?;
            }
        }

        log::info!(
            "loaded mission {} ({} nodes, {} actions, seed {})",
            mission.id(),
            mission.node_count(),
            mission.action_ids().len(),
            mission.seed()
        );
        Ok(mission)
    }

    /// Parse and build a mission from JSON.
    pub fn from_json(json: &str, config: MissionConfig) -> Result<Mission> {
        let doc: MissionDocument = serde_json::from_str(json).map_err(DocumentError::from)?;
        Self::from_document(&doc, config)
    }

    /// Export the current tree, resources and expansion state.
    pub fn to_document(&self) -> MissionDocument {
        MissionDocument {
            mission_id: self.id().to_string(),
            name: self.name.clone(),
            initial_resources: self.initial_resources(),
            resources: Some(self.resources()),
            seed: Some(self.seed()),
            root_node: self.node_document(self.root_id()),
        }
    }

    /// Rebuild this mission from scratch: full budget, collapsed tree, the
    /// same seed. Listeners, console output and the clock are not carried over.
    pub fn reset(&self) -> Result<Mission> {
        let mut doc = self.to_document();
        doc.resources = None;
        let mut stack = vec![&mut doc.root_node];
        while let Some(node) = stack.pop() {
            node.is_expanded = None;
            stack.extend(node.child_nodes.iter_mut());
        }
        Mission::from_document(&doc, self.config().clone())
    }

    fn node_document(&self, id: &NodeId) -> NodeDocument {
        let Some(node) = self.node(id) else {
            return NodeDocument::new(id.to_string(), String::new());
        };
        NodeDocument {
            node_id: id.to_string(),
            name: node.name.clone(),
            color: node.color.clone(),
            pre_execution_text: node.pre_execution_text.clone(),
            executable: node.executable(),
            device: node.device,
            is_expanded: Some(node.is_expanded()),
            actions: node.actions().iter().map(ActionDocument::from).collect(),
            child_nodes: node
                .child_ids()
                .iter()
                .map(|c| self.node_document(c))
                .collect(),
        }
    }

    fn attach_document_actions(&mut self, id: &NodeId, doc: &NodeDocument) -> Result<()> {
        for action in &doc.actions {
            self.attach_action(id, ActionId::new(action.action_id.clone()), &action.draft())?;
        }
        Ok(())
    }

    fn insert_subtree(&mut self, parent: &NodeId, doc: &NodeDocument) -> Result<()> {
        let depth = self.get(parent)?.depth() + 1;
        for child in &doc.child_nodes {
            let id = NodeId::new(child.node_id.clone());
            let mut node = Node::new(id.clone(), &child.draft(), Some(parent.clone()), depth);
            node.expanded = child.is_expanded.unwrap_or(false) && !child.child_nodes.is_empty();
            self.nodes.insert(id.clone(), node);
            self.get_mut(parent)?.children.push(id.clone());

            self.attach_document_actions(&id, child)?;
            self.insert_subtree(&id, child)?;
        }
        Ok(())
    }
}
