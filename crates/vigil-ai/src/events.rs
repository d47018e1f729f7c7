//! Behavior events and the pending-event queue.
//!
//! Events are the only stimuli the FSM reacts to. Perception callbacks,
//! damage callbacks, and state timers all funnel into [`AgentEvent`] values;
//! the engine consults its transition table to decide what, if anything,
//! each event means in the current state.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use vigil_common::AgentId;

/// A stimulus the behavior engine can react to.
///
/// The mapping from event to next state is data (see
/// [`crate::behavior::Transition`]); this enum only names the triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentEvent {
    /// The idle wait expired.
    IdleTimeout,
    /// The current patrol route finished.
    PatrolComplete,
    /// A hostile target entered perception.
    PlayerSeen,
    /// The current target was lost (out of sight long enough).
    PlayerLost,
    /// The agent took damage.
    TookDamage,
    /// The agent closed to engagement range of its target.
    ReachedTarget,
    /// The target moved out of engagement range.
    TargetOutOfRange,
    /// The agent arrived back at its home anchor.
    ReturnComplete,
    /// The agent died.
    Dead,
}

impl AgentEvent {
    /// Short stable name, used in logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdleTimeout => "IdleTimeout",
            Self::PatrolComplete => "PatrolComplete",
            Self::PlayerSeen => "PlayerSeen",
            Self::PlayerLost => "PlayerLost",
            Self::TookDamage => "TookDamage",
            Self::ReachedTarget => "ReachedTarget",
            Self::TargetOutOfRange => "TargetOutOfRange",
            Self::ReturnComplete => "ReturnComplete",
            Self::Dead => "Dead",
        }
    }
}

impl std::fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event waiting to be processed, paired with whoever caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEvent {
    /// The event kind.
    pub event: AgentEvent,
    /// The actor that caused the event ([`AgentId::NULL`] when none).
    pub instigator: AgentId,
}

/// FIFO queue of pending events for one engine instance.
///
/// Events land here when the engine cannot process them synchronously
/// (re-entrant `process_event` calls, raises issued from state hooks).
/// Ordering is strict enqueue order; there is no priority lane.
#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<PendingEvent>,
    receiver: Receiver<PendingEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Appends an event. Never fails; the queue is unbounded and in
    /// practice bounded by gameplay event rate.
    pub fn enqueue(&self, event: AgentEvent, instigator: AgentId) {
        // Both ends live in this struct, so send cannot be disconnected.
        let _ = self.sender.send(PendingEvent { event, instigator });
    }

    /// Removes and returns the oldest pending event, if any.
    pub fn drain_one(&self) -> Option<PendingEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Discards all pending events (engine re-initialization).
    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}
