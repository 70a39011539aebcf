//! Structural operations on the mission tree.
//!
//! The tree is single-rooted, cycle-free and ordered: sibling order is the
//! order of the parent's child list. Every mutating operation ends with one
//! [`Mission::handle_structure_change`] call.

use crate::action::ActionId;
use crate::error::{Result, StructuralError};
use crate::mission::Mission;
use crate::node::{Node, NodeDraft, NodeId, Relation};

impl Mission {
    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Child nodes in order.
    pub fn children(&self, id: &NodeId) -> Result<Vec<&Node>, StructuralError> {
        let node = self.get(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .collect())
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: &NodeId) -> Result<Vec<NodeId>, StructuralError> {
        let mut out = Vec::new();
        let mut cursor = self.get(id)?.parent.clone();
        while let Some(parent) = cursor {
            cursor = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            out.push(parent);
        }
        Ok(out)
    }

    /// All descendants in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: &NodeId) -> Result<Vec<NodeId>, StructuralError> {
        let mut out = self.preorder(id)?;
        out.remove(0);
        Ok(out)
    }

    /// Every node id in pre-order starting at the root.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.preorder(&self.root).unwrap_or_default()
    }

    /// True if `ancestor` lies on the parent chain of `node` (strictly above it).
    pub fn is_ancestor_of(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent.as_ref());
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.nodes.get(parent).and_then(|n| n.parent.as_ref());
        }
        false
    }

    /// Siblings of `id` in order, excluding itself. The root has none.
    pub fn siblings(&self, id: &NodeId) -> Result<Vec<&Node>, StructuralError> {
        let node = self.get(id)?;
        let Some(parent) = node.parent.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(self
            .children(parent)?
            .into_iter()
            .filter(|n| &n.id != id)
            .collect())
    }

    pub fn previous_sibling(&self, id: &NodeId) -> Result<Option<&Node>, StructuralError> {
        self.sibling_at(id, -1)
    }

    pub fn following_sibling(&self, id: &NodeId) -> Result<Option<&Node>, StructuralError> {
        self.sibling_at(id, 1)
    }

    fn sibling_at(&self, id: &NodeId, offset: isize) -> Result<Option<&Node>, StructuralError> {
        let node = self.get(id)?;
        let Some(parent) = node.parent.as_ref() else {
            return Ok(None);
        };
        let siblings = &self.get(parent)?.children;
        let Some(index) = siblings.iter().position(|c| c == id) else {
            return Ok(None);
        };
        let target = index as isize + offset;
        if target < 0 {
            return Ok(None);
        }
        Ok(siblings
            .get(target as usize)
            .and_then(|s| self.nodes.get(s)))
    }

    fn preorder(&self, id: &NodeId) -> Result<Vec<NodeId>, StructuralError> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(current);
        }
        Ok(out)
    }

    // ========================================================================
    // EXPANSION
    // ========================================================================

    pub fn expand(&mut self, id: &NodeId) -> Result<(), StructuralError> {
        self.set_expanded(id, |_| true)
    }

    pub fn collapse(&mut self, id: &NodeId) -> Result<(), StructuralError> {
        self.set_expanded(id, |_| false)
    }

    pub fn toggle(&mut self, id: &NodeId) -> Result<(), StructuralError> {
        self.set_expanded(id, |expanded| !expanded)
    }

    fn set_expanded(&mut self, id: &NodeId, next: impl FnOnce(bool) -> bool) -> Result<(), StructuralError> {
        let node = self.get_mut(id)?;
        if !node.is_expandable() {
            return Err(StructuralError::NoChildNodes(id.clone()));
        }
        node.expanded = next(node.expanded);
        self.handle_structure_change();
        Ok(())
    }

    /// Copy a node's color onto every descendant.
    pub fn apply_color_fill(&mut self, id: &NodeId) -> Result<(), StructuralError> {
        let color = self.get(id)?.color.clone();
        for descendant in self.descendants(id)? {
            if let Some(node) = self.nodes.get_mut(&descendant) {
                node.color = color.clone();
            }
        }
        Ok(())
    }

    // ========================================================================
    // RESTRUCTURING
    // ========================================================================

    /// Move `id` (with its subtree) relative to `target`.
    ///
    /// Fails without mutating if `target` is `id` or one of its descendants.
    /// A sibling placement against a parentless target is a silent no-op.
    pub fn move_node(&mut self, id: &NodeId, target: &NodeId, relation: Relation) -> Result<(), StructuralError> {
        self.get(id)?;
        let target_node = self.get(target)?;
        if id == target || self.is_ancestor_of(id, target) {
            return Err(StructuralError::WouldNestInSelf {
                node: id.clone(),
                target: target.clone(),
            });
        }
        if relation != Relation::Parent && target_node.parent.is_none() {
            log::debug!("move of {} beside parentless {} ignored", id, target);
            return Ok(());
        }

        self.detach(id);
        self.attach(id, target, relation)?;
        self.refresh_depths(id);
        log::debug!("moved {} to {:?} of {}", id, relation, target);
        self.handle_structure_change();
        Ok(())
    }

    /// Add a new node relative to `target` and return its id.
    ///
    /// An executable draft without actions gets the configured default action.
    pub fn add_node(&mut self, target: &NodeId, relation: Relation, draft: NodeDraft) -> Result<NodeId> {
        let target_node = self.get(target)?;
        if relation != Relation::Parent && target_node.parent.is_none() {
            return Err(StructuralError::RootHasNoSiblings.into());
        }
        for (i, action) in draft.actions.iter().enumerate() {
            crate::document::check_action_draft(&format!("draft action {i}"), action)?;
        }

        let id = self.generate_node_id();
        let node = Node::new(id.clone(), &draft, None, 0);
        self.nodes.insert(id.clone(), node);
        self.attach(&id, target, relation)?;
        self.refresh_depths(&id);

        for action in &draft.actions {
            let action_id = self.generate_action_id();
            self.attach_action(&id, action_id, action)?;
        }
        if draft.executable && draft.actions.is_empty() {
            self.set_executable(&id, true)?;
        }

        log::debug!("added {} as {:?} of {}", id, relation, target);
        self.handle_structure_change();
        Ok(id)
    }

    /// Delete a node and its whole subtree. Returns the removed ids, deepest first.
    pub fn delete_node(&mut self, id: &NodeId) -> Result<Vec<NodeId>, StructuralError> {
        let node = self.get(id)?;
        if node.parent.is_none() {
            return Err(StructuralError::CannotDeleteRoot);
        }
        let mut doomed = self.preorder(id)?;
        if let Some(busy) = doomed
            .iter()
            .find(|n| self.nodes.get(*n).is_some_and(|n| n.executing))
        {
            return Err(StructuralError::NodeExecuting(busy.clone()));
        }

        self.detach(id);
        // Children before parents.
        doomed.reverse();
        for removed in &doomed {
            self.nodes.remove(removed);
        }
        if self
            .selected_node
            .as_ref()
            .is_some_and(|s| doomed.contains(s))
        {
            self.selected_node = None;
        }

        log::info!("deleted {} ({} nodes)", id, doomed.len());
        self.handle_structure_change();
        Ok(doomed)
    }

    /// Action ids across the whole tree, in pre-order.
    pub fn action_ids(&self) -> Vec<ActionId> {
        self.node_ids()
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .flat_map(|n| n.actions.iter().map(|a| a.id().clone()))
            .collect()
    }

    /// Unlink a node from its parent's child list. A parent left without
    /// children is no longer expanded.
    fn detach(&mut self, id: &NodeId) {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            if let Some(index) = parent_node.children.iter().position(|c| c == id) {
                parent_node.children.remove(index);
            }
            if parent_node.children.is_empty() {
                parent_node.expanded = false;
            }
        }
    }

    /// Link a detached node next to or under `target`.
    fn attach(&mut self, id: &NodeId, target: &NodeId, relation: Relation) -> Result<(), StructuralError> {
        let parent = match relation {
            Relation::Parent => target.clone(),
            Relation::PreviousSibling | Relation::FollowingSibling => self
                .get(target)?
                .parent
                .clone()
                .ok_or(StructuralError::RootHasNoSiblings)?,
        };

        let parent_node = self.get_mut(&parent)?;
        match relation {
            Relation::Parent => parent_node.children.push(id.clone()),
            Relation::PreviousSibling | Relation::FollowingSibling => {
                let index = parent_node
                    .children
                    .iter()
                    .position(|c| c == target)
                    .map(|i| {
                        if relation == Relation::FollowingSibling {
                            i + 1
                        } else {
                            i
                        }
                    })
                    .unwrap_or(parent_node.children.len());
                parent_node.children.insert(index, id.clone());
            }
        }
        self.get_mut(id)?.parent = Some(parent);
        Ok(())
    }

    fn refresh_depths(&mut self, id: &NodeId) {
        let Ok(subtree) = self.preorder(id) else {
            return;
        };
        // Pre-order visits every parent before its children.
        for node_id in subtree {
            let depth = self
                .nodes
                .get(&node_id)
                .and_then(|n| n.parent.as_ref())
                .and_then(|p| self.nodes.get(p))
                .map_or(0, |p| p.depth + 1);
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.depth = depth;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MissionConfig;
    use crate::error::StructuralError;
    use crate::mission::Mission;
    use crate::node::{NodeDraft, NodeId, Relation};

    fn named(name: &str) -> NodeDraft {
        NodeDraft {
            name: name.into(),
            ..NodeDraft::default()
        }
    }

    /// root -> [a -> [a1, a2], b]
    fn sample() -> (Mission, NodeId, NodeId, NodeId, NodeId) {
        let mut m = Mission::new("m", "Mission", 100.0, MissionConfig::default()).unwrap();
        let root = m.root_id().clone();
        let a = m.add_node(&root, Relation::Parent, named("a")).unwrap();
        let b = m.add_node(&root, Relation::Parent, named("b")).unwrap();
        let a1 = m.add_node(&a, Relation::Parent, named("a1")).unwrap();
        let a2 = m.add_node(&a, Relation::Parent, named("a2")).unwrap();
        (m, a, b, a1, a2)
    }

    fn names(m: &Mission, id: &NodeId) -> Vec<String> {
        m.children(id)
            .unwrap()
            .iter()
            .map(|n| n.name.clone())
            .collect()
    }

    #[test]
    fn test_sibling_queries() {
        let (m, a, b, a1, a2) = sample();
        assert_eq!(m.following_sibling(&a).unwrap().map(|n| n.id()), Some(&b));
        assert_eq!(m.previous_sibling(&b).unwrap().map(|n| n.id()), Some(&a));
        assert!(m.previous_sibling(&a).unwrap().is_none());
        assert!(m.following_sibling(&a2).unwrap().is_none());
        let sibs: Vec<_> = m.siblings(&a1).unwrap().iter().map(|n| n.id().clone()).collect();
        assert_eq!(sibs, vec![a2]);
        assert!(m.siblings(m.root_id()).unwrap().is_empty());
    }

    #[test]
    fn test_depths() {
        let (m, a, _, a1, _) = sample();
        assert_eq!(m.root().depth(), 0);
        assert_eq!(m.node(&a).unwrap().depth(), 1);
        assert_eq!(m.node(&a1).unwrap().depth(), 2);
    }

    #[test]
    fn test_move_under_new_parent_updates_depth() {
        let (mut m, a, b, _, _) = sample();
        let before = m.structure_revision();
        m.move_node(&a, &b, Relation::Parent).unwrap();
        assert_eq!(m.structure_revision(), before + 1);
        assert_eq!(names(&m, m.root_id()), vec!["b"]);
        assert_eq!(names(&m, &b), vec!["a"]);
        assert_eq!(m.node(&a).unwrap().parent(), Some(&b));
        assert_eq!(m.node(&a).unwrap().depth(), 2);
        let a1 = m.node(&a).unwrap().child_ids()[0].clone();
        assert_eq!(m.node(&a1).unwrap().depth(), 3);
    }

    #[test]
    fn test_move_as_sibling_keeps_order() {
        let (mut m, a, _, a1, a2) = sample();
        let before = m.structure_revision();
        m.move_node(&a2, &a1, Relation::PreviousSibling).unwrap();
        assert_eq!(m.structure_revision(), before + 1);
        assert_eq!(names(&m, &a), vec!["a2", "a1"]);

        m.move_node(&a2, &a1, Relation::FollowingSibling).unwrap();
        assert_eq!(names(&m, &a), vec!["a1", "a2"]);

        m.move_node(&a1, &a, Relation::FollowingSibling).unwrap();
        assert_eq!(names(&m, m.root_id()), vec!["a", "a1", "b"]);
        assert_eq!(m.node(&a1).unwrap().depth(), 1);
    }

    #[test]
    fn test_move_into_own_subtree_rejected() {
        let (mut m, a, _, a1, _) = sample();
        let revision = m.structure_revision();
        let err = m.move_node(&a, &a1, Relation::Parent).unwrap_err();
        assert_eq!(
            err,
            StructuralError::WouldNestInSelf {
                node: a.clone(),
                target: a1.clone()
            }
        );
        assert!(m.move_node(&a, &a, Relation::FollowingSibling).is_err());
        assert_eq!(m.structure_revision(), revision);
        assert_eq!(names(&m, &a), vec!["a1", "a2"]);
    }

    #[test]
    fn test_move_beside_root_is_noop() {
        let (mut m, a, _, _, _) = sample();
        let root = m.root_id().clone();
        let revision = m.structure_revision();
        m.move_node(&a, &root, Relation::PreviousSibling).unwrap();
        assert_eq!(m.structure_revision(), revision);
        assert_eq!(m.node(&a).unwrap().parent(), Some(&root));
    }

    #[test]
    fn test_move_root_rejected() {
        let (mut m, a, _, _, _) = sample();
        let root = m.root_id().clone();
        assert!(matches!(
            m.move_node(&root, &a, Relation::Parent),
            Err(StructuralError::WouldNestInSelf { .. })
        ));
    }

    #[test]
    fn test_expand_leaf_fails() {
        let (mut m, a, b, _, _) = sample();
        assert_eq!(m.expand(&b), Err(StructuralError::NoChildNodes(b.clone())));
        assert_eq!(m.collapse(&b), Err(StructuralError::NoChildNodes(b.clone())));
        assert_eq!(m.toggle(&b), Err(StructuralError::NoChildNodes(b.clone())));

        let before = m.structure_revision();
        m.expand(&a).unwrap();
        assert!(m.node(&a).unwrap().is_expanded());
        m.toggle(&a).unwrap();
        assert!(!m.node(&a).unwrap().is_expanded());
        assert_eq!(m.structure_revision(), before + 2);
    }

    #[test]
    fn test_color_fill_reaches_every_descendant() {
        let (mut m, a, b, a1, a2) = sample();
        m.node_mut(&a).unwrap().color = "red".into();
        m.apply_color_fill(&a).unwrap();
        assert_eq!(m.node(&a1).unwrap().color, "red");
        assert_eq!(m.node(&a2).unwrap().color, "red");
        assert_ne!(m.node(&b).unwrap().color, "red");
    }

    #[test]
    fn test_delete_cascades() {
        let (mut m, a, _, a1, a2) = sample();
        m.expand(&a).unwrap();
        let revision = m.structure_revision();

        let removed = m.delete_node(&a).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed.last(), Some(&a));
        for id in [&a, &a1, &a2] {
            assert!(!m.contains_node(id));
        }
        assert_eq!(names(&m, m.root_id()), vec!["b"]);
        assert_eq!(m.structure_revision(), revision + 1);
    }

    #[test]
    fn test_deleting_last_child_collapses_parent() {
        let (mut m, a, _, a1, a2) = sample();
        m.expand(&a).unwrap();
        m.delete_node(&a1).unwrap();
        assert!(m.node(&a).unwrap().is_expanded());
        m.delete_node(&a2).unwrap();
        assert!(!m.node(&a).unwrap().is_expanded());
    }

    #[test]
    fn test_delete_root_rejected() {
        let (mut m, _, _, _, _) = sample();
        let root = m.root_id().clone();
        assert_eq!(m.delete_node(&root), Err(StructuralError::CannotDeleteRoot));
    }

    #[test]
    fn test_add_sibling_and_root_guard() {
        let (mut m, a, b, _, _) = sample();
        let between = m.add_node(&a, Relation::FollowingSibling, named("mid")).unwrap();
        assert_eq!(m.following_sibling(&between).unwrap().map(|n| n.id()), Some(&b));

        let root = m.root_id().clone();
        assert!(m.add_node(&root, Relation::PreviousSibling, named("x")).is_err());
    }

    #[test]
    fn test_add_executable_node_gets_default_action() {
        let (mut m, a, _, _, _) = sample();
        let draft = NodeDraft {
            executable: true,
            ..named("exec")
        };
        let id = m.add_node(&a, Relation::Parent, draft).unwrap();
        let node = m.node(&id).unwrap();
        assert!(node.executable());
        assert_eq!(node.actions().len(), 1);
        assert_eq!(node.actions()[0].name, m.config().default_action.name);
    }

    #[test]
    fn test_preorder_listing() {
        let (m, a, b, a1, a2) = sample();
        let root = m.root_id().clone();
        assert_eq!(m.node_ids(), vec![root.clone(), a.clone(), a1.clone(), a2.clone(), b]);
        assert_eq!(m.ancestors(&a2).unwrap(), vec![a.clone(), root.clone()]);
        assert!(m.is_ancestor_of(&root, &a2));
        assert!(!m.is_ancestor_of(&a2, &a));
    }
}
