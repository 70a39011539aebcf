//! Mission aggregate: the node tree, resource pool, RNG and console log.
//!
//! A mission is a plain owned value. Single-threaded callers mutate it through
//! methods and learn about changes through [`Mission::subscribe`]. Tree
//! operations live in `tree.rs`, execution in `execution.rs`, and document
//! import/export in `document.rs`; they all extend this type.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action::{Action, ActionDraft, ActionId};
use crate::config::{validate_config, MissionConfig};
use crate::console::{ConsoleEntry, ConsoleKind, ConsoleLog};
use crate::document::{check_action_draft, check_amount};
use crate::error::{DocumentError, Error, Result, StructuralError};
use crate::events::{MissionEvent, Observers, SubscriptionId};
use crate::execution::PendingExecution;
use crate::node::{Node, NodeDraft, NodeId};

/// Id given to the root of missions built with [`Mission::new`].
pub const ROOT_NODE_ID: &str = "ROOT";

#[derive(Debug)]
pub struct Mission {
    id: String,
    pub name: String,
    resources: f64,
    initial_resources: f64,
    seed: u64,
    // Shared by every action; advanced each time one is built.
    rng: StdRng,
    config: MissionConfig,
    pub(crate) root: NodeId,
    pub(crate) nodes: HashMap<NodeId, Node>,
    console: ConsoleLog,
    observers: Observers,
    structure_revision: u64,
    pub(crate) now_ms: u64,
    /// Sorted by (due time, scheduling order).
    pub(crate) pending: Vec<PendingExecution>,
    pub(crate) next_schedule_seq: u64,
    pub(crate) selected_node: Option<NodeId>,
    next_generated_id: u64,
}

impl Mission {
    /// Create a mission whose tree is a lone root named after the mission.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        initial_resources: f64,
        config: MissionConfig,
    ) -> Result<Self> {
        let name = name.into();
        let root = NodeDraft {
            name: name.clone(),
            ..NodeDraft::default()
        };
        Self::with_root(
            id.into(),
            name,
            initial_resources,
            initial_resources,
            None,
            NodeId::from(ROOT_NODE_ID),
            &root,
            config,
        )
    }

    /// Validate the mission-level values and create the root node. The root's
    /// actions are left to the caller.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn with_root(
        id: String,
        name: String,
        initial_resources: f64,
        resources: f64,
        seed: Option<u64>,
        root_id: NodeId,
        root: &NodeDraft,
        config: MissionConfig,
    ) -> Result<Self> {
        let errors = validate_config(&config);
        if !errors.is_empty() {
            return Err(Error::Config(errors));
        }
        if id.trim().is_empty() {
            return Err(DocumentError::EmptyId("mission id").into());
        }
        if root_id.as_str().trim().is_empty() {
            return Err(DocumentError::EmptyId("node id").into());
        }
        let owner = format!("mission {id}");
        check_amount(&owner, "initialResources", initial_resources)?;
        check_amount(&owner, "resources", resources)?;
        if resources > initial_resources {
            return Err(DocumentError::ResourcesAboveInitial {
                resources,
                initial: initial_resources,
            }
            .into());
        }

        let seed = seed.unwrap_or(config.seed);
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), Node::new(root_id.clone(), root, None, 0));

        Ok(Self {
            id,
            name,
            resources,
            initial_resources,
            seed,
            rng: StdRng::seed_from_u64(seed),
            config,
            root: root_id,
            nodes,
            console: ConsoleLog::new(),
            observers: Observers::default(),
            structure_revision: 0,
            now_ms: 0,
            pending: Vec::new(),
            next_schedule_seq: 0,
            selected_node: None,
            next_generated_id: 0,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remaining budget. Never below zero, never above the starting budget.
    pub fn resources(&self) -> f64 {
        self.resources
    }

    pub fn initial_resources(&self) -> f64 {
        self.initial_resources
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&self.root]
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable access for presentation fields (name, color, texts, device).
    /// Structural and execution state is only reachable through mission methods.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Find the node owning an action.
    pub fn action_owner(&self, action: &ActionId) -> Option<&NodeId> {
        self.nodes
            .values()
            .find(|n| n.action(action).is_some())
            .map(|n| &n.id)
    }

    pub fn console_outputs(&self) -> &[ConsoleEntry] {
        self.console.entries()
    }

    /// Console entries appended after `key`.
    pub fn console_since(&self, key: u64) -> &[ConsoleEntry] {
        self.console.since(key)
    }

    /// Number of structure-change notifications raised so far.
    pub fn structure_revision(&self) -> u64 {
        self.structure_revision
    }

    pub fn selected_node(&self) -> Option<&NodeId> {
        self.selected_node.as_ref()
    }

    pub(crate) fn get(&self, id: &NodeId) -> Result<&Node, StructuralError> {
        self.nodes
            .get(id)
            .ok_or_else(|| StructuralError::UnknownNode(id.clone()))
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, StructuralError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StructuralError::UnknownNode(id.clone()))
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    /// Register a listener for every subsequent [`MissionEvent`].
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&MissionEvent) + 'static,
    {
        self.observers.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn emit(&mut self, event: MissionEvent) {
        self.observers.emit(&event);
    }

    /// Raised after every mutating tree operation so observers can resync.
    pub fn handle_structure_change(&mut self) {
        self.structure_revision += 1;
        log::debug!(
            "mission {}: structure changed (revision {})",
            self.id,
            self.structure_revision
        );
        self.emit(MissionEvent::StructureChanged {
            revision: self.structure_revision,
        });
    }

    /// Append a console entry stamped with the current virtual time.
    pub fn output_to_console(
        &mut self,
        kind: ConsoleKind,
        node: NodeId,
        action: Option<ActionId>,
        text: impl Into<String>,
    ) -> u64 {
        let key = self.console.push(kind, self.now_ms, node, action, text.into());
        self.emit(MissionEvent::ConsoleOutput { key });
        key
    }

    pub(crate) fn debit(&mut self, cost: f64) {
        self.resources = (self.resources - cost).max(0.0);
        self.emit(MissionEvent::ResourcesChanged {
            remaining: self.resources,
        });
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    /// Select a node. Its pre-execution text, if any, goes to the console.
    pub fn select_node(&mut self, id: &NodeId) -> Result<Option<u64>, StructuralError> {
        let text = self.get(id)?.pre_execution_text.clone();
        self.selected_node = Some(id.clone());
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(self.output_to_console(
            ConsoleKind::Info,
            id.clone(),
            None,
            text,
        )))
    }

    pub fn select_action(&mut self, node: &NodeId, action: &ActionId) -> Result<(), StructuralError> {
        let n = self.get_mut(node)?;
        if n.action(action).is_none() {
            return Err(StructuralError::UnknownAction {
                node: node.clone(),
                action: action.clone(),
            });
        }
        n.selected_action = Some(action.clone());
        Ok(())
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    /// Toggle whether a node can be executed.
    ///
    /// Turning it on for a node without actions synthesizes exactly one action
    /// from the configured default; its id is returned so the caller can
    /// surface the new action.
    pub fn set_executable(&mut self, node: &NodeId, executable: bool) -> Result<Option<ActionId>> {
        let needs_default = executable && self.get(node)?.actions.is_empty();
        let synthesized = if needs_default {
            let draft = self.config.default_action.clone();
            let id = self.generate_action_id();
            self.attach_action(node, id.clone(), &draft)?;
            log::info!("node {}: synthesized default action {}", node, id);
            Some(id)
        } else {
            None
        };
        self.get_mut(node)?.executable = executable;
        Ok(synthesized)
    }

    /// Add an action to a node, pre-rolling its outcomes now.
    pub fn add_action(&mut self, node: &NodeId, draft: ActionDraft) -> Result<ActionId> {
        self.get(node)?;
        let id = self.generate_action_id();
        check_action_draft(&format!("action {id}"), &draft)?;
        self.attach_action(node, id.clone(), &draft)?;
        Ok(id)
    }

    /// Remove an action. An executable node keeps at least one.
    pub fn remove_action(&mut self, node: &NodeId, action: &ActionId) -> Result<(), StructuralError> {
        let n = self.get_mut(node)?;
        let index = n
            .actions
            .iter()
            .position(|a| a.id() == action)
            .ok_or_else(|| StructuralError::UnknownAction {
                node: node.clone(),
                action: action.clone(),
            })?;
        if n.executing {
            return Err(StructuralError::NodeExecuting(node.clone()));
        }
        if n.executable && n.actions.len() == 1 {
            return Err(StructuralError::LastAction(node.clone()));
        }
        n.actions.remove(index);
        if n.selected_action.as_ref() == Some(action) {
            n.selected_action = None;
        }
        Ok(())
    }

    /// Build an action against the shared RNG and give it to `node`. The first
    /// action a node receives becomes its selected action.
    pub(crate) fn attach_action(
        &mut self,
        node: &NodeId,
        id: ActionId,
        draft: &ActionDraft,
    ) -> Result<(), StructuralError> {
        self.get(node)?;
        let action = Action::roll(
            id.clone(),
            draft,
            self.initial_resources,
            self.config.pre_roll_cap,
            &mut self.rng,
        );
        let n = self.get_mut(node)?;
        n.actions.push(action);
        if n.selected_action.is_none() {
            n.selected_action = Some(id);
        }
        Ok(())
    }

    // ========================================================================
    // ID GENERATION
    // ========================================================================

    pub(crate) fn generate_node_id(&mut self) -> NodeId {
        loop {
            self.next_generated_id += 1;
            let id = NodeId::new(format!("node-{}", self.next_generated_id));
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn generate_action_id(&mut self) -> ActionId {
        loop {
            self.next_generated_id += 1;
            let id = ActionId::new(format!("action-{}", self.next_generated_id));
            if self.action_owner(&id).is_none() {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Relation;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn mission() -> Mission {
        Mission::new("m1", "Test Mission", 100.0, MissionConfig::default()).unwrap()
    }

    fn child(m: &mut Mission, name: &str) -> NodeId {
        let root = m.root_id().clone();
        m.add_node(
            &root,
            Relation::Parent,
            NodeDraft {
                name: name.into(),
                ..NodeDraft::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_new_mission() {
        let m = mission();
        assert_eq!(m.id(), "m1");
        assert_eq!(m.resources(), 100.0);
        assert_eq!(m.initial_resources(), 100.0);
        assert_eq!(m.node_count(), 1);
        assert_eq!(m.root().name, "Test Mission");
        assert!(m.console_outputs().is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = MissionConfig {
            pre_roll_cap: 0,
            ..MissionConfig::default()
        };
        let err = Mission::new("m1", "x", 10.0, config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_negative_budget() {
        let err = Mission::new("m1", "x", -1.0, MissionConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Document(DocumentError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_set_executable_synthesizes_exactly_one_action() {
        let mut m = mission();
        let n = child(&mut m, "server");

        let first = m.set_executable(&n, true).unwrap();
        assert!(first.is_some());
        assert_eq!(m.node(&n).unwrap().actions().len(), 1);
        assert!(m.node(&n).unwrap().executable());
        assert_eq!(m.node(&n).unwrap().selected_action().map(|a| a.id()), first.as_ref());

        m.set_executable(&n, false).unwrap();
        let again = m.set_executable(&n, true).unwrap();
        assert!(again.is_none());
        assert_eq!(m.node(&n).unwrap().actions().len(), 1);
    }

    #[test]
    fn test_remove_last_action_of_executable_node() {
        let mut m = mission();
        let n = child(&mut m, "server");
        let action = m.set_executable(&n, true).unwrap().unwrap();

        assert_eq!(
            m.remove_action(&n, &action),
            Err(StructuralError::LastAction(n.clone()))
        );

        m.set_executable(&n, false).unwrap();
        m.remove_action(&n, &action).unwrap();
        assert!(m.node(&n).unwrap().actions().is_empty());
        assert!(m.node(&n).unwrap().selected_action().is_none());
    }

    #[test]
    fn test_add_action_validates_draft() {
        let mut m = mission();
        let n = child(&mut m, "server");
        let bad = ActionDraft {
            success_chance: 2.0,
            ..ActionDraft::default()
        };
        assert!(matches!(
            m.add_action(&n, bad),
            Err(Error::Document(DocumentError::SuccessChanceOutOfRange { .. }))
        ));
        assert!(m.node(&n).unwrap().actions().is_empty());
    }

    #[test]
    fn test_select_node_outputs_pre_execution_text() {
        let mut m = mission();
        let n = child(&mut m, "gateway");
        m.node_mut(&n).unwrap().pre_execution_text = "A hardened gateway.".into();

        let key = m.select_node(&n).unwrap();
        assert!(key.is_some());
        assert_eq!(m.selected_node(), Some(&n));
        let entry = m.console_outputs().last().unwrap();
        assert_eq!(entry.kind, ConsoleKind::Info);
        assert_eq!(entry.text, "A hardened gateway.");

        let quiet = child(&mut m, "quiet");
        assert_eq!(m.select_node(&quiet).unwrap(), None);
        assert_eq!(m.console_outputs().len(), 1);
    }

    #[test]
    fn test_subscribers_see_console_and_structure_events() {
        let mut m = mission();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = m.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        m.handle_structure_change();
        let root = m.root_id().clone();
        let key = m.output_to_console(ConsoleKind::Info, root, None, "hello");

        assert_eq!(
            *seen.borrow(),
            vec![
                MissionEvent::StructureChanged { revision: 1 },
                MissionEvent::ConsoleOutput { key },
            ]
        );
        assert!(m.unsubscribe(sub));
    }

    #[test]
    fn test_generated_ids_skip_existing() {
        let mut m = mission();
        let first = child(&mut m, "a");
        assert_eq!(first.as_str(), "node-1");
        let second = child(&mut m, "b");
        assert_ne!(first, second);
        assert!(m.contains_node(&second));
    }
}
