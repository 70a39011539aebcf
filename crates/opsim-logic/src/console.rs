//! Append-only console log rendered by the output panel.

use serde::{Deserialize, Serialize};

use crate::action::ActionId;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleKind {
    Info,
    Success,
    Failure,
}

/// One console line. `key` is unique and strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub key: u64,
    pub kind: ConsoleKind,
    /// Virtual time of the entry in milliseconds.
    pub at_ms: u64,
    pub node: NodeId,
    pub action: Option<ActionId>,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: Vec<ConsoleEntry>,
    next_key: u64,
}

impl ConsoleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its key.
    pub fn push(
        &mut self,
        kind: ConsoleKind,
        at_ms: u64,
        node: NodeId,
        action: Option<ActionId>,
        text: String,
    ) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.push(ConsoleEntry {
            key,
            kind,
            at_ms,
            node,
            action,
            text,
        });
        key
    }

    pub fn entries(&self) -> &[ConsoleEntry] {
        &self.entries
    }

    /// Entries appended after `key`, oldest first.
    pub fn since(&self, key: u64) -> &[ConsoleEntry] {
        let start = self.entries.partition_point(|e| e.key <= key);
        &self.entries[start..]
    }
}
