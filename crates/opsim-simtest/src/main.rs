//! OpSim Headless Mission Harness
//!
//! Loads a mission document and drives it through scripted checks on the
//! virtual clock. Runs entirely in-process: no timers, no rendering.
//!
//! Usage:
//!   cargo run -p opsim-simtest
//!   cargo run -p opsim-simtest -- --verbose
//!   cargo run -p opsim-simtest -- --seed 7 --config config.json path/to/mission.json
//!
//! Logging: set RUST_LOG=debug to see structural changes as they happen.

use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use opsim_logic::action::total_possible_attempts;
use opsim_logic::legacy::LegacyMissionDocument;
use opsim_logic::{
    validate_config, ConsoleKind, Error, ExecutionReport, Mission, MissionConfig,
    MissionDocument, MissionEvent, NodeDraft, NodeId, NotReadyReason, Relation, StructuralError,
};

// ── Bundled data ────────────────────────────────────────────────────────
const DEMO_MISSION_JSON: &str = include_str!("../../../data/demo_mission.json");

const LEGACY_MISSION_JSON: &str = r#"{
    "missionId": "legacy-check",
    "name": "Legacy Layout",
    "initialResources": 30,
    "nodeStructure": {
        "gateway": { "label": "END", "args": {} },
        "archive": "END"
    },
    "nodeData": [
        { "nodeId": "archive", "name": "Archive" },
        { "nodeId": "gateway", "name": "Gateway", "executable": true },
        { "nodeId": "label", "name": "Label Printer", "device": true },
        { "nodeId": "args", "name": "Args Service" }
    ]
}"#;

/// Upper bound on scripted executions, in case a document never runs dry.
const MAX_PLAYTHROUGH_STEPS: usize = 500;

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn check(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "opsim-simtest")]
#[command(about = "Replay a mission document on the virtual clock and check the results", long_about = None)]
struct Args {
    /// Print passing checks too
    #[arg(short, long)]
    verbose: bool,

    /// Override the mission seed
    #[arg(long)]
    seed: Option<u64>,

    /// Mission config file (JSON)
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<String>,

    /// Mission document to load instead of the bundled demo
    #[arg(value_name = "MISSION")]
    mission_path: Option<String>,
}

fn load_config(args: &Args) -> Result<MissionConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {path}"))?;
            MissionConfig::from_json(&json).with_context(|| format!("failed to parse config {path}"))?
        }
        None => MissionConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let errors = validate_config(&config);
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        bail!("invalid config: {}", listed.join("; "));
    }
    Ok(config)
}

fn load_document(args: &Args) -> Result<(String, MissionDocument)> {
    let (source, json) = match &args.mission_path {
        Some(path) => (
            path.clone(),
            fs::read_to_string(path).with_context(|| format!("failed to read mission {path}"))?,
        ),
        None => ("bundled demo mission".to_string(), DEMO_MISSION_JSON.to_string()),
    };
    let mut doc: MissionDocument =
        serde_json::from_str(&json).with_context(|| format!("failed to parse {source}"))?;
    // An explicit --seed beats the document's own seed.
    if args.seed.is_some() {
        doc.seed = args.seed;
    }
    Ok((source, doc))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let (source, doc) = load_document(&args)?;
    log::debug!("harness config: {:?}", config);

    println!("=== OpSim Mission Harness ===\n");
    println!("Mission: {} ({})\n", doc.name, source);

    let mut results = Vec::new();

    // 1. Document shape
    results.extend(validate_document(&doc, &config, args.verbose));

    // 2. Scripted playthrough
    results.extend(validate_playthrough(&doc, &config, args.verbose));

    // 3. Replay determinism
    results.extend(validate_determinism(&doc, &config));

    // 4. Reset and export
    results.extend(validate_reset_and_export(&doc, &config));

    // 5. Restructuring rules
    results.extend(validate_restructuring(&doc, &config));

    // 6. Legacy structure import
    results.extend(validate_legacy_import(&config));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || args.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        log::error!("{} harness checks failed", failed);
        std::process::exit(1);
    }
    Ok(())
}

fn build(doc: &MissionDocument, config: &MissionConfig) -> Result<Mission, Error> {
    Mission::from_document(doc, config.clone())
}

fn load_failure(name: &str, err: Error) -> Vec<TestResult> {
    vec![TestResult::check(name, false, format!("mission failed to load: {err}"))]
}

/// Depth recorded on every node matches its ancestor chain.
fn depths_consistent(m: &Mission) -> bool {
    m.node_ids().iter().all(|id| {
        let ancestors = m.ancestors(id).map(|a| a.len()).unwrap_or(usize::MAX);
        m.node(id).is_some_and(|n| n.depth() == ancestors)
    })
}

// ── 1. Document ─────────────────────────────────────────────────────────

fn validate_document(doc: &MissionDocument, config: &MissionConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Document ---");
    let m = match build(doc, config) {
        Ok(m) => m,
        Err(e) => return load_failure("document_loads", e),
    };
    let mut results = vec![TestResult::check(
        "document_loads",
        true,
        format!("{} nodes, {} actions", m.node_count(), m.action_ids().len()),
    )];

    if verbose {
        for id in m.node_ids() {
            if let Some(node) = m.node(&id) {
                let marker = if node.executable() { "*" } else { " " };
                println!(
                    "  {}{} {} [{} actions]",
                    "  ".repeat(node.depth()),
                    marker,
                    node.name,
                    node.actions().len()
                );
            }
        }
    }

    results.push(TestResult::check(
        "every_node_reachable",
        m.node_ids().len() == m.node_count(),
        format!("{} reachable of {}", m.node_ids().len(), m.node_count()),
    ));

    results.push(TestResult::check(
        "depths_consistent",
        depths_consistent(&m),
        "node depth equals ancestor count",
    ));

    let bare: Vec<String> = m
        .node_ids()
        .iter()
        .filter_map(|id| m.node(id))
        .filter(|n| n.executable() && n.actions().is_empty())
        .map(|n| n.id().to_string())
        .collect();
    results.push(TestResult::check(
        "executable_nodes_have_actions",
        bare.is_empty(),
        if bare.is_empty() {
            "ok".to_string()
        } else {
            format!("no actions on {}", bare.join(", "))
        },
    ));

    let mut wrong_lengths = Vec::new();
    for id in m.node_ids() {
        for action in m.node(&id).map(|n| n.actions()).unwrap_or_default() {
            let expected = total_possible_attempts(
                m.initial_resources(),
                action.resource_cost(),
                config.pre_roll_cap,
            );
            if action.total_possible_attempts() != expected
                || action.remaining_outcomes() != expected as usize
            {
                wrong_lengths.push(action.id().to_string());
            }
        }
    }
    results.push(TestResult::check(
        "pre_roll_lengths",
        wrong_lengths.is_empty(),
        if wrong_lengths.is_empty() {
            "every action pre-rolled for its full attempt count".to_string()
        } else {
            format!("wrong length: {}", wrong_lengths.join(", "))
        },
    ));

    results
}

// ── 2. Playthrough ──────────────────────────────────────────────────────

struct Playthrough {
    mission: Mission,
    reports: Vec<ExecutionReport>,
    resource_trace: Vec<f64>,
    completion_events: usize,
}

/// A node is visible once every ancestor is expanded.
fn visible(m: &Mission, id: &NodeId) -> bool {
    m.ancestors(id).is_ok_and(|ancestors| {
        ancestors
            .iter()
            .all(|a| m.node(a).is_some_and(|n| n.is_expanded()))
    })
}

/// First visible node, in pre-order, whose selected action can run.
fn next_candidate(m: &Mission) -> Option<NodeId> {
    m.node_ids().into_iter().find(|id| {
        visible(m, id)
            && m.node(id)
                .and_then(|n| n.selected_action())
                .is_some_and(|a| m.ready_to_execute(id, a.id()))
    })
}

/// Greedily run whatever is ready until nothing is.
fn play(doc: &MissionDocument, config: &MissionConfig, verbose: bool) -> Result<Playthrough, Error> {
    let mut mission = build(doc, config)?;
    let completions = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&completions);
    mission.subscribe(move |event| {
        if matches!(event, MissionEvent::ExecutionCompleted { .. }) {
            counter.set(counter.get() + 1);
        }
    });

    let mut reports = Vec::new();
    let mut resource_trace = vec![mission.resources()];
    for _ in 0..MAX_PLAYTHROUGH_STEPS {
        let Some(node) = next_candidate(&mission) else {
            break;
        };
        mission.select_node(&node)?;
        mission.execute_selected(&node)?;
        resource_trace.push(mission.resources());
        for report in mission.run_until_idle() {
            if verbose {
                println!(
                    "  t={:>6} ms  {} / {} -> {}",
                    report.completed_at_ms,
                    report.node,
                    report.action,
                    if report.succeeded { "success" } else { "failure" }
                );
            }
            reports.push(report);
        }
    }

    Ok(Playthrough {
        mission,
        reports,
        resource_trace,
        completion_events: completions.get(),
    })
}

fn validate_playthrough(doc: &MissionDocument, config: &MissionConfig, verbose: bool) -> Vec<TestResult> {
    println!("--- Playthrough ---");
    let mut run = match play(doc, config, verbose) {
        Ok(run) => run,
        Err(e) => return load_failure("playthrough_runs", e),
    };
    let m = &run.mission;
    let successes = run.reports.iter().filter(|r| r.succeeded).count();
    let mut results = vec![TestResult::check(
        "playthrough_runs",
        !run.reports.is_empty(),
        format!(
            "{} runs, {} succeeded, {:.1} of {:.1} resources left",
            run.reports.len(),
            successes,
            m.resources(),
            m.initial_resources()
        ),
    )];

    results.push(TestResult::check(
        "resources_monotonic",
        run.resource_trace.windows(2).all(|w| w[1] <= w[0]),
        format!("trace {:?}", run.resource_trace),
    ));

    results.push(TestResult::check(
        "resources_non_negative",
        m.resources() >= 0.0,
        format!("{:.1} left", m.resources()),
    ));

    let outcome_entries = m
        .console_outputs()
        .iter()
        .filter(|e| e.kind != ConsoleKind::Info)
        .count();
    results.push(TestResult::check(
        "console_matches_completions",
        outcome_entries == run.reports.len(),
        format!("{} outcome entries, {} completions", outcome_entries, run.reports.len()),
    ));

    results.push(TestResult::check(
        "completion_events_delivered",
        run.completion_events == run.reports.len(),
        format!("{} events", run.completion_events),
    ));

    let hidden: Vec<String> = m
        .node_ids()
        .iter()
        .filter_map(|id| m.node(id))
        .filter(|n| n.succeeded() && n.has_children() && !n.is_expanded())
        .map(|n| n.id().to_string())
        .collect();
    results.push(TestResult::check(
        "success_reveals_children",
        hidden.is_empty(),
        if hidden.is_empty() {
            "ok".to_string()
        } else {
            format!("still collapsed: {}", hidden.join(", "))
        },
    ));

    // Every succeeded node must refuse another run and leave resources alone.
    let succeeded: Vec<NodeId> = m
        .node_ids()
        .into_iter()
        .filter(|id| m.node(id).is_some_and(|n| n.succeeded()))
        .collect();
    let before = run.mission.resources();
    let refused = succeeded.iter().all(|id| {
        matches!(
            run.mission.execute_selected(id),
            Err(Error::NotReady(e)) if e.reason == NotReadyReason::AlreadySucceeded
        )
    });
    results.push(TestResult::check(
        "succeeded_nodes_refuse_rerun",
        refused && run.mission.resources() == before,
        format!("{} succeeded nodes checked", succeeded.len()),
    ));

    results
}

// ── 3. Determinism ──────────────────────────────────────────────────────

fn transcript(run: &Playthrough) -> Vec<String> {
    run.mission
        .console_outputs()
        .iter()
        .map(|e| format!("{}@{}:{:?}:{}", e.node, e.at_ms, e.kind, e.text))
        .collect()
}

fn validate_determinism(doc: &MissionDocument, config: &MissionConfig) -> Vec<TestResult> {
    println!("--- Determinism ---");
    let (first, second) = match (play(doc, config, false), play(doc, config, false)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return load_failure("replay_identical", e),
    };
    vec![TestResult::check(
        "replay_identical",
        transcript(&first) == transcript(&second),
        format!("{} console entries compared", transcript(&first).len()),
    )]
}

// ── 4. Reset & export ───────────────────────────────────────────────────

fn outcome_table(m: &Mission) -> Vec<(String, Vec<bool>)> {
    m.node_ids()
        .iter()
        .filter_map(|id| m.node(id))
        .flat_map(|n| n.actions())
        .map(|a| (a.id().to_string(), a.outcomes().collect()))
        .collect()
}

fn validate_reset_and_export(doc: &MissionDocument, config: &MissionConfig) -> Vec<TestResult> {
    println!("--- Reset & Export ---");
    let (run, fresh) = match (play(doc, config, false), build(doc, config)) {
        (Ok(run), Ok(fresh)) => (run, fresh),
        (Err(e), _) | (_, Err(e)) => return load_failure("reset_restores_budget", e),
    };
    let mut results = Vec::new();

    match run.mission.reset() {
        Ok(reset) => {
            let untouched = reset
                .node_ids()
                .iter()
                .filter_map(|id| reset.node(id))
                .all(|n| !n.executed() && !n.executing());
            results.push(TestResult::check(
                "reset_restores_budget",
                reset.resources() == reset.initial_resources() && untouched,
                format!("{:.1} resources after reset", reset.resources()),
            ));
            results.push(TestResult::check(
                "reset_rerolls_same_outcomes",
                outcome_table(&reset) == outcome_table(&fresh),
                format!("{} actions compared", outcome_table(&fresh).len()),
            ));
        }
        Err(e) => results.push(TestResult::check(
            "reset_restores_budget",
            false,
            format!("reset failed: {e}"),
        )),
    }

    let exported = run.mission.to_document();
    let reimported = serde_json::to_string(&exported)
        .map_err(|e| e.to_string())
        .and_then(|json| Mission::from_json(&json, config.clone()).map_err(|e| e.to_string()));
    match reimported {
        Ok(again) => {
            let same_expansion = again.node_ids().iter().all(|id| {
                again.node(id).map(|n| n.is_expanded())
                    == run.mission.node(id).map(|n| n.is_expanded())
            });
            results.push(TestResult::check(
                "export_round_trip",
                again.node_ids() == run.mission.node_ids()
                    && again.action_ids() == run.mission.action_ids()
                    && again.resources() == run.mission.resources()
                    && same_expansion,
                format!("{} nodes re-imported", again.node_count()),
            ));
        }
        Err(e) => results.push(TestResult::check(
            "export_round_trip",
            false,
            format!("re-import failed: {e}"),
        )),
    }

    results
}

// ── 5. Restructuring ────────────────────────────────────────────────────

fn validate_restructuring(doc: &MissionDocument, config: &MissionConfig) -> Vec<TestResult> {
    println!("--- Restructuring ---");
    let mut m = match build(doc, config) {
        Ok(m) => m,
        Err(e) => return load_failure("nesting_in_self_rejected", e),
    };
    let mut results = Vec::new();
    let root = m.root_id().clone();
    let ids = m.node_ids();

    // The root is an ancestor of everything, so nesting it anywhere must fail.
    if let Some(deepest) = ids.last().filter(|id| **id != root) {
        let revision = m.structure_revision();
        let rejected = matches!(
            m.move_node(&root, deepest, Relation::Parent),
            Err(StructuralError::WouldNestInSelf { .. })
        );
        results.push(TestResult::check(
            "nesting_in_self_rejected",
            rejected && m.structure_revision() == revision,
            format!("root under {deepest}"),
        ));
    }

    // Hoist the last node in pre-order (always a leaf) to the front of the root.
    let first_child = m.root().child_ids().first().cloned();
    if let (Some(leaf), Some(first)) = (ids.last().cloned(), first_child) {
        if leaf != first && leaf != root {
            let moved = m.move_node(&leaf, &first, Relation::PreviousSibling).is_ok();
            let placed = m.root().child_ids().first() == Some(&leaf)
                && m.node(&leaf).is_some_and(|n| n.depth() == 1);
            results.push(TestResult::check(
                "hoist_leaf_to_root",
                moved && placed && depths_consistent(&m),
                format!("{leaf} before {first}"),
            ));
        }
    }

    let count = m.node_count();
    let added = m.add_node(
        &root,
        Relation::Parent,
        NodeDraft {
            name: "Scratch".to_string(),
            executable: true,
            ..NodeDraft::default()
        },
    );
    let cycle_ok = match added {
        Ok(scratch) => {
            let has_default = m.node(&scratch).is_some_and(|n| n.actions().len() == 1);
            let deleted = m.delete_node(&scratch).is_ok();
            has_default && deleted && m.node_count() == count
        }
        Err(_) => false,
    };
    results.push(TestResult::check(
        "add_then_delete",
        cycle_ok,
        format!("{} nodes after cleanup", m.node_count()),
    ));

    let leaf = m
        .node_ids()
        .into_iter()
        .find(|id| m.node(id).is_some_and(|n| !n.has_children()));
    if let Some(leaf) = leaf {
        results.push(TestResult::check(
            "leaf_cannot_expand",
            m.expand(&leaf) == Err(StructuralError::NoChildNodes(leaf.clone())),
            format!("expand {leaf}"),
        ));
    }

    results
}

// ── 6. Legacy import ────────────────────────────────────────────────────

fn validate_legacy_import(config: &MissionConfig) -> Vec<TestResult> {
    println!("--- Legacy Import ---");
    let converted = serde_json::from_str::<LegacyMissionDocument>(LEGACY_MISSION_JSON)
        .map_err(|e| e.to_string())
        .and_then(|legacy| legacy.into_document().map_err(|e| e.to_string()))
        .and_then(|doc| Mission::from_document(&doc, config.clone()).map_err(|e| e.to_string()));

    match converted {
        Ok(m) => {
            let gateway = NodeId::from("gateway");
            let children: Vec<String> = m
                .node(&gateway)
                .map(|n| n.child_ids().iter().map(|c| c.to_string()).collect())
                .unwrap_or_default();
            vec![
                TestResult::check(
                    "legacy_shape",
                    children == ["label", "args"] && m.node_count() == 5,
                    format!("gateway children {children:?}"),
                ),
                TestResult::check(
                    "legacy_default_action",
                    m.node(&gateway).is_some_and(|n| n.actions().len() == 1),
                    "executable legacy node received the default action",
                ),
            ]
        }
        Err(e) => vec![TestResult::check("legacy_shape", false, e)],
    }
}
