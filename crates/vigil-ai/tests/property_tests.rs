//! Property-based tests for definitions, tables, and timers.
//!
//! These use proptest to verify the self-repair and replacement
//! guarantees hold across many randomly generated inputs.

use proptest::prelude::*;
use vigil_ai::behavior::{BehaviorDefinition, StateDescriptor, Transition};
use vigil_ai::events::AgentEvent;
use vigil_ai::scheduler::TimerScheduler;
use vigil_ai::transition::TransitionTable;

prop_compose! {
    fn any_event()(variant in 0..9u8) -> AgentEvent {
        match variant {
            0 => AgentEvent::IdleTimeout,
            1 => AgentEvent::PatrolComplete,
            2 => AgentEvent::PlayerSeen,
            3 => AgentEvent::PlayerLost,
            4 => AgentEvent::TookDamage,
            5 => AgentEvent::ReachedTarget,
            6 => AgentEvent::TargetOutOfRange,
            7 => AgentEvent::ReturnComplete,
            _ => AgentEvent::Dead,
        }
    }
}

prop_compose! {
    fn any_definition()(
        names in prop::collection::vec("[A-D]", 1..6),
        edges in prop::collection::vec((any_event(), "[A-D]", 0.0..3.0f64), 0..8),
    ) -> BehaviorDefinition {
        let mut states: Vec<StateDescriptor> = names
            .iter()
            .map(|n| StateDescriptor::new(n, "Idle"))
            .collect();
        for (i, (event, target, delay)) in edges.into_iter().enumerate() {
            let slot = i % states.len();
            states[slot]
                .transitions
                .push(Transition::delayed(event, &target, delay));
        }
        BehaviorDefinition {
            initial_state: String::new(),
            states,
        }
    }
}

proptest! {
    #[test]
    fn normalize_yields_unique_nonempty_names(mut def in any_definition()) {
        def.normalize();

        let mut seen = std::collections::HashSet::new();
        for state in &def.states {
            prop_assert!(!state.name.is_empty());
            prop_assert!(seen.insert(state.name.clone()));
        }
        prop_assert!(def.has_state(&def.initial_state));
    }

    #[test]
    fn normalize_is_idempotent(mut def in any_definition()) {
        def.normalize();
        let once = def.clone();
        let findings = def.normalize();
        prop_assert!(findings.is_empty());
        prop_assert_eq!(once, def);
    }

    #[test]
    fn table_lookup_matches_last_authored_edge(mut def in any_definition()) {
        def.normalize();
        let (table, _) = TransitionTable::build(&def);

        for state in &def.states {
            for tr in &state.transitions {
                // Whatever won, it is the last authored edge for that trigger.
                let last = state
                    .transitions
                    .iter()
                    .rev()
                    .find(|t| t.trigger == tr.trigger)
                    .unwrap();
                let hit = table.lookup(&state.name, tr.trigger).unwrap();
                prop_assert_eq!(&hit.target, &last.target);
            }
        }
    }

    #[test]
    fn restarting_a_timer_never_double_fires(
        durations in prop::collection::vec(0.1..5.0f64, 1..6),
    ) {
        let mut sched = TimerScheduler::new();
        for d in &durations {
            sched.start("T", *d, false);
        }

        // Step well past every requested deadline and count firings.
        let mut fired = 0;
        for _ in 0..60 {
            fired += sched.advance(0.1).len();
        }
        prop_assert_eq!(fired, 1);
    }
}
