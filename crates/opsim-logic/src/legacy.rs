//! Import for the older mission layout: a flat node list plus a nested
//! `nodeStructure` object giving the tree shape.
//!
//! Each key of `nodeStructure` is a node id. Its value is either an object of
//! child entries, or the string `"END"` (an empty object means the same) for
//! a leaf. Object key order is sibling order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{MissionDocument, NodeDocument};
use crate::error::DocumentError;
use crate::mission::ROOT_NODE_ID;

/// Leaf marker in `nodeStructure`.
pub const END_MARKER: &str = "END";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMissionDocument {
    pub mission_id: String,
    pub name: String,
    pub initial_resources: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    pub node_structure: Value,
    #[serde(default)]
    pub node_data: Vec<NodeDocument>,
}

impl LegacyMissionDocument {
    /// Convert to the nested layout. The root is synthetic and named after
    /// the mission.
    pub fn into_document(self) -> Result<MissionDocument, DocumentError> {
        let mut root = document_from_structure(&self.node_structure, self.node_data)?;
        root.name = self.name.clone();
        Ok(MissionDocument {
            mission_id: self.mission_id,
            name: self.name,
            initial_resources: self.initial_resources,
            resources: None,
            seed: self.seed,
            root_node: root,
        })
    }
}

/// Arrange a flat node list into a tree under a synthetic root with id
/// [`ROOT_NODE_ID`].
///
/// Every listed node must be placed exactly once, and every placed id must be
/// listed.
pub fn document_from_structure(
    structure: &Value,
    nodes: Vec<NodeDocument>,
) -> Result<NodeDocument, DocumentError> {
    let mut pool: HashMap<String, NodeDocument> = HashMap::with_capacity(nodes.len());
    let mut listed = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !node.child_nodes.is_empty() {
            return Err(DocumentError::MalformedStructure {
                key: node.node_id,
                detail: "listed nodes must not carry child nodes".to_string(),
            });
        }
        if pool.contains_key(&node.node_id) {
            return Err(DocumentError::DuplicateNode(node.node_id));
        }
        listed.push(node.node_id.clone());
        pool.insert(node.node_id.clone(), node);
    }

    let entries = structure.as_object().ok_or_else(|| DocumentError::MalformedStructure {
        key: ROOT_NODE_ID.to_string(),
        detail: "structure root must be an object".to_string(),
    })?;

    let mut root = NodeDocument::new(ROOT_NODE_ID, ROOT_NODE_ID);
    root.child_nodes = place_children(entries, &mut pool, &mut HashSet::new())?;

    // Whatever is left in the pool was never placed; report in list order.
    if let Some(id) = listed.into_iter().find(|id| pool.contains_key(id)) {
        return Err(DocumentError::UnplacedNode(id));
    }
    Ok(root)
}

fn place_children(
    entries: &Map<String, Value>,
    pool: &mut HashMap<String, NodeDocument>,
    placed: &mut HashSet<String>,
) -> Result<Vec<NodeDocument>, DocumentError> {
    let mut children = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if !placed.insert(key.clone()) {
            return Err(DocumentError::DuplicatePlacement(key.clone()));
        }
        let mut node = pool
            .remove(key)
            .ok_or_else(|| DocumentError::UnknownStructureNode(key.clone()))?;
        match value {
            Value::String(s) if s == END_MARKER => {}
            Value::Object(grandchildren) => {
                node.child_nodes = place_children(grandchildren, pool, placed)?;
            }
            other => {
                return Err(DocumentError::MalformedStructure {
                    key: key.clone(),
                    detail: format!("expected an object or \"{END_MARKER}\", found {other}"),
                });
            }
        }
        children.push(node);
    }
    Ok(children)
}
