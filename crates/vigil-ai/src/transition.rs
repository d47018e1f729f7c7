//! Transition table: the derived O(1) lookup structure.
//!
//! Built once per [`BehaviorDefinition`] and rebuilt on hot-swap. Read-only
//! after construction, so multiple engines sharing one definition can share
//! one table.
//!
//! Construction also applies the critical-transition checks: a short fixed
//! list of (state, event) pairs the behavior model guarantees exist.
//! Hand-authored definitions have shipped with these links missing, and a
//! visibly stuck agent costs more than a silently defaulted transition, so
//! the builder synthesizes the default and reports it instead of failing.

use ahash::AHashMap;
use std::fmt;
use tracing::{trace, warn};

use crate::behavior::BehaviorDefinition;
use crate::events::AgentEvent;

/// Where a transition leads and how long it waits.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTarget {
    /// Target state name.
    pub target: String,
    /// Seconds before the change is performed (zero = immediate).
    pub delay: f64,
}

/// The (state, event) pairs the behavior model requires, with the default
/// target synthesized when a definition omits them. A forced delay of zero
/// on the idle timeout is part of the same rule: the timeout has already
/// waited, delaying the escape again is how agents got stuck.
const CRITICAL_TRANSITIONS: &[(&str, AgentEvent, &str, bool)] = &[
    ("Idle", AgentEvent::IdleTimeout, "Patrol", true),
    ("Return", AgentEvent::ReturnComplete, "Idle", false),
];

/// One repair or complaint produced while building a table.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildDiagnostic {
    /// A critical (state, event) mapping was missing; a default was added.
    MissingCritical {
        /// Source state.
        state: String,
        /// Trigger event.
        event: AgentEvent,
        /// The synthesized target.
        default_target: String,
    },
    /// A critical mapping carried a delay; it was forced to zero.
    ForcedZeroDelay {
        /// Source state.
        state: String,
        /// Trigger event.
        event: AgentEvent,
    },
    /// An authored duplicate (state, event) pair was overwritten
    /// (last write wins).
    DuplicateTrigger {
        /// Source state.
        state: String,
        /// Trigger event.
        event: AgentEvent,
    },
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCritical {
                state,
                event,
                default_target,
            } => write!(
                f,
                "critical transition {state} --{event}--> missing, defaulted to '{default_target}'"
            ),
            Self::ForcedZeroDelay { state, event } => {
                write!(f, "critical transition {state} --{event}--> delay forced to zero")
            }
            Self::DuplicateTrigger { state, event } => {
                write!(f, "duplicate trigger {event} in state {state}, last definition wins")
            }
        }
    }
}

/// Per-state event → target mapping with O(1) lookup on both keys.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    rows: AHashMap<String, AHashMap<AgentEvent, TransitionTarget>>,
}

impl TransitionTable {
    /// Builds a table from a definition.
    ///
    /// For each state the transitions are inserted in authored order, so the
    /// last transition for a duplicate trigger wins. Afterwards the critical
    /// checks run; every repair is returned as a diagnostic and logged.
    #[must_use]
    pub fn build(definition: &BehaviorDefinition) -> (Self, Vec<BuildDiagnostic>) {
        let mut diagnostics = Vec::new();
        let mut rows: AHashMap<String, AHashMap<AgentEvent, TransitionTarget>> =
            AHashMap::with_capacity(definition.states.len());

        for desc in &definition.states {
            let row = rows.entry(desc.name.clone()).or_default();
            for tr in &desc.transitions {
                let replaced = row.insert(
                    tr.trigger,
                    TransitionTarget {
                        target: tr.target.clone(),
                        delay: tr.delay.max(0.0),
                    },
                );
                if replaced.is_some() {
                    diagnostics.push(BuildDiagnostic::DuplicateTrigger {
                        state: desc.name.clone(),
                        event: tr.trigger,
                    });
                }
            }
        }

        for &(state, event, default_target, force_zero_delay) in CRITICAL_TRANSITIONS {
            // Only repair rows for states the definition actually has; a
            // definition without an Idle state owes no idle escape route.
            let Some(row) = rows.get_mut(state) else {
                continue;
            };
            match row.get_mut(&event) {
                None => {
                    warn!(
                        state,
                        event = %event,
                        target = default_target,
                        "critical transition missing, inserting default"
                    );
                    row.insert(
                        event,
                        TransitionTarget {
                            target: default_target.to_owned(),
                            delay: 0.0,
                        },
                    );
                    diagnostics.push(BuildDiagnostic::MissingCritical {
                        state: state.to_owned(),
                        event,
                        default_target: default_target.to_owned(),
                    });
                }
                Some(existing) if existing.target.is_empty() => {
                    warn!(
                        state,
                        event = %event,
                        target = default_target,
                        "critical transition has empty target, inserting default"
                    );
                    existing.target = default_target.to_owned();
                    existing.delay = 0.0;
                    diagnostics.push(BuildDiagnostic::MissingCritical {
                        state: state.to_owned(),
                        event,
                        default_target: default_target.to_owned(),
                    });
                }
                Some(existing) => {
                    if force_zero_delay && existing.delay > 0.0 {
                        warn!(state, event = %event, "forcing zero delay on critical transition");
                        existing.delay = 0.0;
                        diagnostics.push(BuildDiagnostic::ForcedZeroDelay {
                            state: state.to_owned(),
                            event,
                        });
                    }
                }
            }
        }

        for d in &diagnostics {
            trace!("transition table: {d}");
        }

        (Self { rows }, diagnostics)
    }

    /// Looks up what an event means in a state. `None` simply means the
    /// state does not react to that event.
    #[must_use]
    pub fn lookup(&self, state: &str, event: AgentEvent) -> Option<&TransitionTarget> {
        self.rows.get(state)?.get(&event)
    }

    /// Returns every (event, target) edge leaving a state.
    pub fn edges(&self, state: &str) -> impl Iterator<Item = (AgentEvent, &TransitionTarget)> {
        self.rows
            .get(state)
            .into_iter()
            .flat_map(|row| row.iter().map(|(e, t)| (*e, t)))
    }

    /// True iff some event in the state's row leads to `target`.
    #[must_use]
    pub fn leads_to(&self, state: &str, target: &str) -> bool {
        self.edges(state).any(|(_, t)| t.target == target)
    }

    /// Number of states with at least one row entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
