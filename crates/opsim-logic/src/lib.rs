//! Pure mission model for OpSim.
//!
//! A mission is a tree of nodes (systems a trainee can inspect or act on),
//! each holding actions with a cost, a processing time and a pre-rolled
//! sequence of outcomes. The crate has no I/O and no rendering: callers drive
//! it through methods on [`Mission`], advance its virtual clock, and listen for
//! [`MissionEvent`]s to redraw.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`action`] | Actions, attempt counts and outcome pre-rolls |
//! | [`config`] | Mission configuration and validation |
//! | [`console`] | Append-only console log with incremental reads |
//! | [`document`] | Nested JSON import/export, reset |
//! | [`error`] | Structural, readiness, document and config errors |
//! | [`events`] | Change notifications for subscribers |
//! | [`execution`] | Execution state machine on a virtual clock |
//! | [`legacy`] | Flat node list + `nodeStructure` import |
//! | [`mission`] | The aggregate: tree, resources, RNG, console |
//! | [`node`] | Node ids, drafts and per-node state |
//! | [`tree`] | Move, add, delete, expand and traversal |

pub mod action;
pub mod config;
pub mod console;
pub mod document;
pub mod error;
pub mod events;
pub mod execution;
pub mod legacy;
pub mod mission;
pub mod node;
pub mod tree;

pub use action::{Action, ActionDraft, ActionId};
pub use config::{validate_config, ConfigError, MissionConfig};
pub use console::{ConsoleEntry, ConsoleKind};
pub use document::{ActionDocument, MissionDocument, NodeDocument};
pub use error::{Error, NotReadyReason, Result, StructuralError};
pub use events::{MissionEvent, SubscriptionId};
pub use execution::ExecutionReport;
pub use mission::{Mission, ROOT_NODE_ID};
pub use node::{ExecutionState, Node, NodeDraft, NodeId, Relation};
