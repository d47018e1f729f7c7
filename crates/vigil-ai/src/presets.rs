//! The shipped default behavior definition.
//!
//! Used when an agent has no authored behavior asset, and as the reference
//! topology for tests. Every field here is plain data; authored assets can
//! replace any of it.

use crate::behavior::{BehaviorDefinition, StateDescriptor, Transition};
use crate::events::AgentEvent;
use crate::params::ParamBag;
use crate::states::kind;

/// How long a chasing agent keeps pursuing after losing sight.
const LOSE_TARGET_TIME: f64 = 3.0;

/// Builds the default idle/patrol/chase/attack/return/death behavior.
#[must_use]
pub fn default_definition() -> BehaviorDefinition {
    BehaviorDefinition {
        initial_state: kind::IDLE.into(),
        states: vec![
            StateDescriptor::new("Idle", kind::IDLE)
                .with_transition(Transition::new(AgentEvent::IdleTimeout, "Patrol"))
                .with_transition(Transition::delayed(AgentEvent::PlayerSeen, "Chase", 0.2))
                .with_transition(Transition::new(AgentEvent::TookDamage, "Chase"))
                .with_transition(Transition::new(AgentEvent::Dead, "Death"))
                .with_params(
                    ParamBag::default()
                        .with("IdleTime", 5.0)
                        .with("LookInterval", 2.0),
                ),
            StateDescriptor::new("Patrol", kind::PATROL)
                .with_transition(Transition::new(AgentEvent::PatrolComplete, "Idle"))
                .with_transition(Transition::delayed(AgentEvent::PlayerSeen, "Chase", 0.1))
                .with_transition(Transition::new(AgentEvent::TookDamage, "Chase"))
                .with_transition(Transition::new(AgentEvent::Dead, "Death"))
                .with_params(
                    ParamBag::default()
                        .with("PatrolSpeed", 300.0)
                        .with("AcceptanceRadius", 100.0)
                        .with("MaxPatrolDistance", 1000.0)
                        .with("NumPatrolPoints", 4.0),
                ),
            StateDescriptor::new("Chase", kind::CHASE)
                .with_transition(Transition::delayed(
                    AgentEvent::PlayerLost,
                    "Return",
                    LOSE_TARGET_TIME,
                ))
                .with_transition(Transition::new(AgentEvent::ReachedTarget, "Attack"))
                .with_transition(Transition::new(AgentEvent::Dead, "Death"))
                .with_params(
                    ParamBag::default()
                        .with("ChaseSpeed", 600.0)
                        .with("AttackRange", 200.0)
                        .with("RepathInterval", 0.3),
                ),
            StateDescriptor::new("Attack", kind::ATTACK)
                .with_transition(Transition::new(AgentEvent::TargetOutOfRange, "Chase"))
                .with_transition(Transition::new(AgentEvent::PlayerLost, "Return"))
                .with_transition(Transition::new(AgentEvent::Dead, "Death"))
                .with_params(
                    ParamBag::default()
                        .with("AttackRange", 200.0)
                        .with("AttackAbility", "MeleeAttack"),
                ),
            StateDescriptor::new("Return", kind::RETURN)
                .with_transition(Transition::new(AgentEvent::ReturnComplete, "Idle"))
                .with_transition(Transition::delayed(AgentEvent::PlayerSeen, "Chase", 0.1))
                .with_transition(Transition::new(AgentEvent::TookDamage, "Chase"))
                .with_transition(Transition::new(AgentEvent::Dead, "Death"))
                .with_params(
                    ParamBag::default()
                        .with("ReturnSpeed", 450.0)
                        .with("AcceptanceRadius", 100.0)
                        .with("SettleTime", 1.0),
                ),
            // Terminal: no outgoing transitions.
            StateDescriptor::new("Death", kind::DEATH),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::Severity;
    use crate::transition::TransitionTable;

    #[test]
    fn test_default_definition_validates_clean() {
        let definition = default_definition();
        let errors: Vec<_> = definition
            .validate()
            .into_iter()
            .filter(|f| f.severity == Severity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn test_default_definition_needs_no_repair() {
        let definition = default_definition();
        let (table, diagnostics) = TransitionTable::build(&definition);
        assert!(diagnostics.is_empty(), "unexpected repairs: {diagnostics:?}");
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_every_state_reaches_death() {
        let definition = default_definition();
        let (table, _) = TransitionTable::build(&definition);
        for descriptor in &definition.states {
            if descriptor.name == "Death" {
                continue;
            }
            assert!(
                table.leads_to(&descriptor.name, "Death"),
                "{} cannot die",
                descriptor.name
            );
        }
    }

    #[test]
    fn test_death_is_terminal() {
        let definition = default_definition();
        let (table, _) = TransitionTable::build(&definition);
        assert_eq!(table.edges("Death").count(), 0);
    }
}
