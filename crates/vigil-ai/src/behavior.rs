//! Behavior definitions: the authored configuration a FSM runs on.
//!
//! A [`BehaviorDefinition`] is an ordered list of state descriptors plus a
//! designated initial state. It is authored offline (see [`crate::loader`]),
//! validated and normalized at load time, and immutable at runtime. Several
//! engines may share one definition read-only.
//!
//! Validation never fails hard: every problem is reported as a
//! [`ValidationFinding`] so editor tooling can surface it, and the runtime
//! degrades gracefully instead (missing transitions simply never fire,
//! dangling targets are logged when looked up).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::events::AgentEvent;
use crate::params::ParamBag;

/// A single outgoing edge of a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// The event that triggers this transition.
    pub trigger: AgentEvent,
    /// Name of the state to move to.
    pub target: String,
    /// Seconds to wait before performing the transition. Zero means
    /// immediate; the wait is cancelled if the state is left first.
    #[serde(default)]
    pub delay: f64,
}

impl Transition {
    /// Creates an immediate transition.
    #[must_use]
    pub fn new(trigger: AgentEvent, target: &str) -> Self {
        Self {
            trigger,
            target: target.to_owned(),
            delay: 0.0,
        }
    }

    /// Creates a delayed transition.
    #[must_use]
    pub fn delayed(trigger: AgentEvent, target: &str, delay: f64) -> Self {
        Self {
            trigger,
            target: target.to_owned(),
            delay,
        }
    }
}

/// Static description of one state: identity, implementation selector,
/// outgoing transitions, and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDescriptor {
    /// Unique name within the definition.
    pub name: String,
    /// Which registered state implementation to construct (see
    /// [`crate::state::StateRegistry`]).
    pub kind: String,
    /// Outgoing transitions, in authored order. For a duplicate trigger the
    /// last one wins when the transition table is built.
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Parameters copied into the state instance at construction.
    #[serde(default)]
    pub params: ParamBag,
}

impl StateDescriptor {
    /// Creates a descriptor with no transitions or parameters.
    #[must_use]
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
            transitions: Vec::new(),
            params: ParamBag::new(),
        }
    }

    /// Builder-style transition append.
    #[must_use]
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Builder-style parameter bag replacement.
    #[must_use]
    pub fn with_params(mut self, params: ParamBag) -> Self {
        self.params = params;
        self
    }
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Survivable; the runtime degrades or a default was substituted.
    Warning,
    /// The definition is unusable as-is (e.g. no states at all).
    Error,
}

/// One problem found (or fixed) in a definition.
///
/// Findings are plain data so callers (editor tooling, load logs) decide
/// how to surface them; producing a finding never aborts anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    /// How bad it is.
    pub severity: Severity,
    /// The state the finding concerns, when applicable.
    pub state: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ValidationFinding {
    fn warning(state: Option<&str>, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            state: state.map(str::to_owned),
            message,
        }
    }

    fn error(state: Option<&str>, message: String) -> Self {
        Self {
            severity: Severity::Error,
            state: state.map(str::to_owned),
            message,
        }
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.severity, &self.state) {
            (Severity::Error, Some(s)) => write!(f, "error [{s}]: {}", self.message),
            (Severity::Error, None) => write!(f, "error: {}", self.message),
            (Severity::Warning, Some(s)) => write!(f, "warning [{s}]: {}", self.message),
            (Severity::Warning, None) => write!(f, "warning: {}", self.message),
        }
    }
}

/// A complete authored behavior: states plus the initial state name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDefinition {
    /// Name of the state entered on initialization. If empty, `normalize`
    /// points it at the first state.
    #[serde(default)]
    pub initial_state: String,
    /// Ordered state descriptors.
    pub states: Vec<StateDescriptor>,
}

impl BehaviorDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a state descriptor by name.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<&StateDescriptor> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Whether a state with the given name exists.
    #[must_use]
    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    /// Checks the definition without mutating it.
    ///
    /// Reported problems: empty state list, empty or duplicate state names,
    /// empty state kinds, an initial state that names nothing, dangling
    /// transition targets, and negative delays. None of these block
    /// construction; see [`Self::normalize`] for the self-repairs.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();

        if self.states.is_empty() {
            findings.push(ValidationFinding::error(
                None,
                "definition has no states".to_owned(),
            ));
            return findings;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for desc in &self.states {
            if desc.name.is_empty() {
                findings.push(ValidationFinding::warning(
                    None,
                    "state with empty name".to_owned(),
                ));
            } else if !seen.insert(desc.name.as_str()) {
                findings.push(ValidationFinding::warning(
                    Some(&desc.name),
                    format!("duplicate state name '{}'", desc.name),
                ));
            }
            if desc.kind.is_empty() {
                findings.push(ValidationFinding::warning(
                    Some(&desc.name),
                    "state has no kind; instance construction will fail".to_owned(),
                ));
            }
            for tr in &desc.transitions {
                if !tr.target.is_empty() && !self.has_state(&tr.target) {
                    findings.push(ValidationFinding::warning(
                        Some(&desc.name),
                        format!(
                            "transition on {} targets unknown state '{}'",
                            tr.trigger, tr.target
                        ),
                    ));
                }
                if tr.delay < 0.0 {
                    findings.push(ValidationFinding::warning(
                        Some(&desc.name),
                        format!("transition on {} has negative delay", tr.trigger),
                    ));
                }
            }
        }

        if !self.initial_state.is_empty() && !self.has_state(&self.initial_state) {
            findings.push(ValidationFinding::warning(
                None,
                format!("initial state '{}' does not exist", self.initial_state),
            ));
        }

        findings
    }

    /// Repairs the definition in place and reports what was changed.
    ///
    /// - Empty or duplicate state names are renamed by suffixing their
    ///   position in the duplicate group (`Guard` twice becomes `Guard_0`,
    ///   `Guard_1`), and every transition target and the initial-state
    ///   pointer that referenced the old name are rewritten to the first
    ///   renamed occurrence.
    /// - An empty initial state is pointed at the first state.
    /// - Negative delays are clamped to zero.
    ///
    /// Dangling targets that name no state even after renaming are reported
    /// but left alone; the transition table logs them at lookup time.
    pub fn normalize(&mut self) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        if self.states.is_empty() {
            findings.push(ValidationFinding::error(
                None,
                "definition has no states".to_owned(),
            ));
            return findings;
        }

        // Group states by name to find duplicates and empties.
        let mut counts: ahash::AHashMap<String, usize> = ahash::AHashMap::new();
        for desc in &self.states {
            *counts.entry(desc.name.clone()).or_default() += 1;
        }

        // (old name -> new name of the first occurrence) for reference rewrite.
        let mut rewrites: ahash::AHashMap<String, String> = ahash::AHashMap::new();
        let mut group_index: ahash::AHashMap<String, usize> = ahash::AHashMap::new();

        for (position, desc) in self.states.iter_mut().enumerate() {
            let needs_rename =
                desc.name.is_empty() || counts.get(&desc.name).copied().unwrap_or(0) > 1;
            if !needs_rename {
                continue;
            }
            let old = desc.name.clone();
            let new = if old.is_empty() {
                format!("State_{position}")
            } else {
                let idx = group_index.entry(old.clone()).or_insert(0);
                let name = format!("{old}_{idx}");
                *idx += 1;
                name
            };
            findings.push(ValidationFinding::warning(
                Some(&new),
                if old.is_empty() {
                    format!("unnamed state renamed to '{new}'")
                } else {
                    format!("duplicate state '{old}' renamed to '{new}'")
                },
            ));
            // References follow the first occurrence of the old name.
            rewrites.entry(old).or_insert_with(|| new.clone());
            desc.name = new;
        }

        for desc in &mut self.states {
            for tr in &mut desc.transitions {
                if let Some(new) = rewrites.get(&tr.target) {
                    tr.target = new.clone();
                }
                if tr.delay < 0.0 {
                    findings.push(ValidationFinding::warning(
                        Some(&desc.name),
                        format!("negative delay on {} clamped to zero", tr.trigger),
                    ));
                    tr.delay = 0.0;
                }
            }
        }

        if let Some(new) = rewrites.get(&self.initial_state) {
            self.initial_state = new.clone();
        }
        if self.initial_state.is_empty() {
            self.initial_state = self.states[0].name.clone();
            findings.push(ValidationFinding::warning(
                None,
                format!("empty initial state defaulted to '{}'", self.initial_state),
            ));
        }

        // Anything still dangling is survivable but worth a log line now.
        for desc in &self.states {
            for tr in &desc.transitions {
                if !tr.target.is_empty() && !self.has_state(&tr.target) {
                    warn!(
                        state = %desc.name,
                        event = %tr.trigger,
                        target = %tr.target,
                        "transition targets unknown state"
                    );
                }
            }
        }
        for f in &findings {
            warn!("normalize: {f}");
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_guards() -> BehaviorDefinition {
        BehaviorDefinition {
            initial_state: "Guard".to_owned(),
            states: vec![
                StateDescriptor::new("Guard", "idle"),
                StateDescriptor::new("Guard", "patrol"),
                StateDescriptor::new("Gate", "idle").with_transition(Transition::new(
                    AgentEvent::PlayerSeen,
                    "Guard",
                )),
            ],
        }
    }

    #[test]
    fn test_validate_reports_duplicates_and_dangling() {
        let def = BehaviorDefinition {
            initial_state: "Nowhere".to_owned(),
            states: vec![
                StateDescriptor::new("A", "idle").with_transition(Transition::new(
                    AgentEvent::Dead,
                    "Missing",
                )),
                StateDescriptor::new("A", "idle"),
            ],
        };
        let findings = def.validate();
        assert!(findings
            .iter()
            .any(|f| f.message.contains("duplicate state name 'A'")));
        assert!(findings
            .iter()
            .any(|f| f.message.contains("unknown state 'Missing'")));
        assert!(findings
            .iter()
            .any(|f| f.message.contains("initial state 'Nowhere'")));
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
    }

    #[test]
    fn test_validate_empty_definition_is_error() {
        let def = BehaviorDefinition::new();
        let findings = def.validate();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn test_normalize_renames_duplicates_and_rewrites_references() {
        let mut def = two_guards();
        def.normalize();

        let names: Vec<&str> = def.states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Guard_0", "Guard_1", "Gate"]);

        // The transition that pointed at "Guard" follows the renamed first
        // occurrence, as does the initial-state pointer.
        assert_eq!(def.states[2].transitions[0].target, "Guard_0");
        assert_eq!(def.initial_state, "Guard_0");
        assert!(def.validate().is_empty());
    }

    #[test]
    fn test_normalize_defaults_initial_state() {
        let mut def = BehaviorDefinition {
            initial_state: String::new(),
            states: vec![
                StateDescriptor::new("First", "idle"),
                StateDescriptor::new("Second", "patrol"),
            ],
        };
        def.normalize();
        assert_eq!(def.initial_state, "First");
    }

    #[test]
    fn test_normalize_clamps_negative_delay() {
        let mut def = BehaviorDefinition {
            initial_state: "A".to_owned(),
            states: vec![StateDescriptor::new("A", "idle").with_transition(
                Transition::delayed(AgentEvent::PlayerLost, "A", -2.0),
            )],
        };
        def.normalize();
        assert!((def.states[0].transitions[0].delay - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_names_empty_states() {
        let mut def = BehaviorDefinition {
            initial_state: String::new(),
            states: vec![StateDescriptor::new("", "idle")],
        };
        def.normalize();
        assert_eq!(def.states[0].name, "State_0");
        assert_eq!(def.initial_state, "State_0");
    }
}
