//! End-to-end mission scenarios: build a tree, execute actions on the
//! virtual clock, and check resources, console output and tree state.
//!
//! All tests are pure logic, no timers and no rendering.

use std::cell::RefCell;
use std::rc::Rc;

use opsim_logic::{
    ActionDraft, ActionId, ConsoleKind, Error, Mission, MissionConfig, MissionEvent, NodeDraft,
    NodeId, NotReadyReason, Relation, StructuralError,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn action(cost: f64, chance: f64, time: u64) -> ActionDraft {
    ActionDraft {
        name: "Breach".to_string(),
        resource_cost: cost,
        success_chance: chance,
        process_time_ms: time,
        post_execution_success_text: "Access granted.".to_string(),
        post_execution_failure_text: "Access denied.".to_string(),
        ..ActionDraft::default()
    }
}

fn executable(action: ActionDraft) -> NodeDraft {
    NodeDraft {
        name: "Gateway".to_string(),
        executable: true,
        actions: vec![action],
        ..NodeDraft::default()
    }
}

/// A mission with one executable node under the root.
fn single_node_mission(action: ActionDraft) -> (Mission, NodeId, ActionId) {
    let mut mission = Mission::new("m-1", "Breach", 100.0, MissionConfig::default()).unwrap();
    let root = mission.root_id().clone();
    let node = mission
        .add_node(&root, Relation::Parent, executable(action))
        .unwrap();
    let action = mission.node(&node).unwrap().actions()[0].id().clone();
    (mission, node, action)
}

fn not_ready(err: Error) -> NotReadyReason {
    match err {
        Error::NotReady(e) => e.reason,
        other => panic!("expected a not-ready error, got {other:?}"),
    }
}

// ── Execution scenarios ────────────────────────────────────────────────

#[test]
fn successful_run_debits_then_completes() {
    let (mut m, node, act) = single_node_mission(action(40.0, 1.0, 10));
    assert_eq!(
        m.node(&node).unwrap().action(&act).unwrap().remaining_outcomes(),
        2
    );

    m.execute(&node, &act).unwrap();
    assert_eq!(m.resources(), 60.0);
    assert!(m.console_outputs().is_empty());

    m.advance(10);
    let n = m.node(&node).unwrap();
    assert!(n.executed());
    assert!(n.succeeded());
    assert_eq!(n.action(&act).unwrap().remaining_outcomes(), 1);

    let entry = m.console_outputs().last().unwrap();
    assert_eq!(entry.kind, ConsoleKind::Success);
    assert_eq!(entry.text, "Access granted.");
    assert_eq!(entry.at_ms, 10);
}

#[test]
fn failed_run_reports_failure_without_expanding() {
    let (mut m, node, act) = single_node_mission(action(40.0, 0.0, 10));
    m.add_node(&node, Relation::Parent, NodeDraft::default())
        .unwrap();

    m.execute(&node, &act).unwrap();
    let reports = m.run_until_idle();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].succeeded);
    assert!(!reports[0].expanded);

    let n = m.node(&node).unwrap();
    assert!(n.executed());
    assert!(!n.succeeded());
    assert!(!n.is_expanded());
    assert_eq!(m.console_outputs().last().unwrap().kind, ConsoleKind::Failure);
}

#[test]
fn succeeded_node_never_runs_again() {
    let (mut m, node, act) = single_node_mission(action(40.0, 1.0, 10));
    m.execute(&node, &act).unwrap();
    m.run_until_idle();

    let before = m.resources();
    let err = m.execute(&node, &act).unwrap_err();
    assert_eq!(not_ready(err), NotReadyReason::AlreadySucceeded);
    assert_eq!(m.resources(), before);
    assert!(!m.ready_to_execute(&node, &act));
}

#[test]
fn retries_stop_when_budget_runs_out() {
    let (mut m, node, act) = single_node_mission(action(40.0, 0.0, 10));
    for _ in 0..2 {
        m.execute(&node, &act).unwrap();
        m.run_until_idle();
    }
    assert_eq!(m.resources(), 20.0);
    let err = m.execute(&node, &act).unwrap_err();
    assert_eq!(not_ready(err), NotReadyReason::InsufficientResources);
    assert!(!m.outcomes_reachable(&node, &act).unwrap());
}

#[test]
fn success_reveals_children_and_notifies() {
    let (mut m, node, act) = single_node_mission(action(10.0, 1.0, 5));
    let child = m
        .add_node(&node, Relation::Parent, NodeDraft::default())
        .unwrap();

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    m.subscribe(move |e| sink.borrow_mut().push(e.clone()));

    m.execute(&node, &act).unwrap();
    m.run_until_idle();

    assert!(m.node(&node).unwrap().is_expanded());
    assert_eq!(m.node(&child).unwrap().depth(), 2);

    let events = events.borrow();
    assert!(matches!(events[0], MissionEvent::ResourcesChanged { remaining } if remaining == 90.0));
    assert!(matches!(events[1], MissionEvent::ExecutionStarted { due_at_ms: 5, .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e, MissionEvent::ExecutionCompleted { succeeded: true, .. })));
    assert!(matches!(
        events.last(),
        Some(MissionEvent::StructureChanged { .. })
    ));
}

#[test]
fn console_keys_increase_and_tail_reads_work() {
    let mut m = Mission::new("m-1", "Console", 100.0, MissionConfig::default()).unwrap();
    let root = m.root_id().clone();
    let briefed = m
        .add_node(
            &root,
            Relation::Parent,
            NodeDraft {
                pre_execution_text: "Guards rotate every hour.".to_string(),
                ..executable(action(10.0, 1.0, 1))
            },
        )
        .unwrap();
    let silent = m
        .add_node(&root, Relation::Parent, NodeDraft::default())
        .unwrap();

    let first = m.select_node(&briefed).unwrap().unwrap();
    assert_eq!(m.select_node(&silent).unwrap(), None);
    assert_eq!(m.selected_node(), Some(&silent));

    m.execute_selected(&briefed).unwrap();
    m.run_until_idle();

    let keys: Vec<u64> = m.console_outputs().iter().map(|e| e.key).collect();
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    let tail = m.console_since(first);
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].kind, ConsoleKind::Success);
}

// ── Structure scenarios ────────────────────────────────────────────────

#[test]
fn deleting_a_subtree_removes_every_descendant() {
    let mut m = Mission::new("m-1", "Tree", 100.0, MissionConfig::default()).unwrap();
    let root = m.root_id().clone();
    let a = m.add_node(&root, Relation::Parent, NodeDraft::default()).unwrap();
    let b = m.add_node(&a, Relation::Parent, NodeDraft::default()).unwrap();
    let c = m.add_node(&b, Relation::Parent, NodeDraft::default()).unwrap();
    let d = m.add_node(&a, Relation::FollowingSibling, NodeDraft::default()).unwrap();

    let removed = m.delete_node(&a).unwrap();
    assert_eq!(removed, vec![c.clone(), b.clone(), a.clone()]);
    for gone in [&a, &b, &c] {
        assert!(!m.contains_node(gone));
    }
    assert_eq!(m.root().child_ids(), &[d]);
    assert_eq!(m.delete_node(&root), Err(StructuralError::CannotDeleteRoot));
}

#[test]
fn executing_subtree_cannot_be_deleted() {
    let (mut m, node, act) = single_node_mission(action(10.0, 1.0, 50));
    let parent = m
        .add_node(&node, Relation::PreviousSibling, NodeDraft::default())
        .unwrap();
    m.move_node(&node, &parent, Relation::Parent).unwrap();

    m.execute(&node, &act).unwrap();
    assert_eq!(
        m.delete_node(&parent),
        Err(StructuralError::NodeExecuting(node.clone()))
    );

    m.run_until_idle();
    assert!(m.delete_node(&parent).is_ok());
}

#[test]
fn same_seed_same_outcomes() {
    let build = || {
        let config = MissionConfig {
            seed: 1234,
            ..MissionConfig::default()
        };
        let mut m = Mission::new("m-1", "Seeded", 100.0, config).unwrap();
        let root = m.root_id().clone();
        for _ in 0..5 {
            m.add_node(&root, Relation::Parent, executable(action(5.0, 0.3, 1)))
                .unwrap();
        }
        m.node_ids()
            .iter()
            .filter_map(|id| m.node(id))
            .flat_map(|n| n.actions().iter().map(|a| a.outcomes().collect::<Vec<_>>()))
            .collect::<Vec<_>>()
    };
    assert_eq!(build(), build());
}
