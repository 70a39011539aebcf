//! Mission events and the listeners subscribed to them.
//!
//! Presentation layers subscribe a callback and resynchronize whatever they
//! render when an event arrives. The model never depends on how they store state.

use std::fmt;

use crate::action::ActionId;
use crate::node::NodeId;

/// Something observable happened to a mission.
#[derive(Debug, Clone, PartialEq)]
pub enum MissionEvent {
    /// The tree changed shape or expansion. Carries no payload beyond a counter.
    StructureChanged { revision: u64 },
    ExecutionStarted {
        node: NodeId,
        action: ActionId,
        due_at_ms: u64,
    },
    ExecutionCompleted {
        node: NodeId,
        action: ActionId,
        succeeded: bool,
    },
    ConsoleOutput { key: u64 },
    ResourcesChanged { remaining: f64 },
}

/// Handle returned by [`Mission::subscribe`](crate::mission::Mission::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&MissionEvent)>;

#[derive(Default)]
pub(crate) struct Observers {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub(crate) fn emit(&mut self, event: &MissionEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
