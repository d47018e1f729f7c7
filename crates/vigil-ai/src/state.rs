//! State lifecycle contract and host-world interfaces.
//!
//! Concrete behaviors implement [`AgentState`] and interact with the engine
//! through a [`StateContext`] command buffer: hooks record timer and event
//! requests, the engine applies them after the hook returns. This keeps
//! every hook free of back-references into the engine and makes it
//! impossible for a hook to transition the machine out from under itself.

use crate::events::AgentEvent;
use crate::params::ParamBag;
use ahash::AHashMap;
use glam::Vec3;
use tracing::warn;
use vigil_common::AgentId;

// ============================================================================
// Host-world collaborators
// ============================================================================

/// Movement and perception surface the host world supplies per agent.
///
/// The engine treats this as an opaque collaborator: states steer through
/// it, the engine itself never calls it.
pub trait AgentWorld {
    /// Current world position of the agent.
    fn position(&self) -> Vec3;

    /// The anchor the agent patrols around and returns to.
    fn home(&self) -> Vec3;

    /// Position of the current target, if one is tracked.
    fn target_position(&self) -> Option<Vec3>;

    /// Whether the tracked target is currently visible.
    fn can_see_target(&self) -> bool;

    /// Begins tracking `instigator` as the target.
    fn set_target(&mut self, instigator: AgentId);

    /// Drops the tracked target.
    fn clear_target(&mut self);

    /// Requests a move toward `destination`, completing within
    /// `acceptance_radius`. Returns false if no path exists.
    fn move_to(&mut self, destination: Vec3, acceptance_radius: f32) -> bool;

    /// Stops any in-flight movement request.
    fn stop_movement(&mut self);

    /// Sets the maximum movement speed for subsequent requests.
    fn set_move_speed(&mut self, speed: f32);

    /// Turns the agent to face `point` without moving.
    fn face_toward(&mut self, point: Vec3);

    /// Picks a reachable point within `radius` of `origin`, if any.
    fn random_reachable_point(&mut self, origin: Vec3, radius: f32) -> Option<Vec3>;
}

/// Ability activation side channel.
///
/// States that are configured for ability-backed behavior activate by name
/// on enter and deactivate on exit. Activation is best-effort.
pub trait AbilityHost {
    /// Attempts to activate the named ability. Returns whether it started.
    fn try_activate(&mut self, ability: &str) -> bool;

    /// Attempts to deactivate the named ability. Returns whether it was live.
    fn try_deactivate(&mut self, ability: &str) -> bool;
}

/// The world and ability collaborators bundled per engine call.
pub struct Host<'a> {
    /// Movement and perception.
    pub world: &'a mut dyn AgentWorld,
    /// Ability activation.
    pub abilities: &'a mut dyn AbilityHost,
}

// ============================================================================
// Command buffer
// ============================================================================

/// A request recorded by a state hook, applied by the engine afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Start (or replace) a named timer.
    StartTimer {
        /// Timer name, unique within the live state.
        name: String,
        /// Seconds until it fires.
        duration: f64,
        /// Whether it re-arms after firing.
        repeating: bool,
    },
    /// Cancel a named timer.
    StopTimer {
        /// Timer name.
        name: String,
    },
    /// Raise an event through the engine's normal event path.
    Raise {
        /// The event.
        event: AgentEvent,
        /// Who caused it.
        instigator: AgentId,
    },
}

/// Mutable view a state hook receives for one invocation.
///
/// Reads go straight through (params, world queries); writes that touch the
/// engine (timers, events, the idle hint) are buffered as [`StateCommand`]s
/// and applied once the hook has returned.
pub struct StateContext<'a> {
    /// The agent this machine drives.
    pub agent: AgentId,
    /// Movement and perception.
    pub world: &'a mut dyn AgentWorld,
    /// Ability activation.
    pub abilities: &'a mut dyn AbilityHost,
    params: &'a ParamBag,
    idle_override: &'a mut Option<f64>,
    commands: &'a mut Vec<StateCommand>,
}

impl<'a> StateContext<'a> {
    pub(crate) fn new(
        agent: AgentId,
        host: &'a mut Host<'_>,
        params: &'a ParamBag,
        idle_override: &'a mut Option<f64>,
        commands: &'a mut Vec<StateCommand>,
    ) -> Self {
        Self {
            agent,
            world: &mut *host.world,
            abilities: &mut *host.abilities,
            params,
            idle_override,
            commands,
        }
    }

    /// The parameter bag of the current state's descriptor.
    #[must_use]
    pub fn params(&self) -> &ParamBag {
        self.params
    }

    /// Float parameter, or `default` if absent or the wrong type.
    #[must_use]
    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        self.params.float_or(name, default)
    }

    /// Bool parameter, or `default` if absent.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.params.bool_or(name, default)
    }

    /// Text parameter, if present.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.params.text(name)
    }

    /// Requests a named timer; replaces any live timer under that name.
    pub fn start_timer(&mut self, name: &str, duration: f64, repeating: bool) {
        self.commands.push(StateCommand::StartTimer {
            name: name.to_owned(),
            duration,
            repeating,
        });
    }

    /// Requests cancellation of a named timer.
    pub fn stop_timer(&mut self, name: &str) {
        self.commands.push(StateCommand::StopTimer {
            name: name.to_owned(),
        });
    }

    /// Raises an event through the engine after this hook returns.
    pub fn raise(&mut self, event: AgentEvent) {
        let instigator = self.agent;
        self.commands.push(StateCommand::Raise { event, instigator });
    }

    /// Raises an event attributed to another agent.
    pub fn raise_from(&mut self, event: AgentEvent, instigator: AgentId) {
        self.commands.push(StateCommand::Raise { event, instigator });
    }

    /// Sets the one-shot idle duration hint for the next idle entry.
    ///
    /// Producer side of the hand-off from a returning state to the rest
    /// state; consumed once by [`take_idle_override`].
    ///
    /// [`take_idle_override`]: Self::take_idle_override
    pub fn set_idle_override(&mut self, seconds: f64) {
        *self.idle_override = Some(seconds);
    }

    /// Consumes the idle duration hint, if one is pending.
    pub fn take_idle_override(&mut self) -> Option<f64> {
        self.idle_override.take()
    }
}

// ============================================================================
// State contract
// ============================================================================

/// Lifecycle contract every concrete behavior implements.
///
/// `on_enter` and `on_exit` are each called exactly once per activation,
/// exit before the next state's enter. `on_event` runs before the engine
/// consults its transition table and must not transition itself; it can
/// only record commands, which the engine applies through its guarded
/// paths. `on_timer` fires for timers the state started, `on_tick` once
/// per frame while current.
pub trait AgentState {
    /// The state-kind tag this instance was built from.
    fn kind(&self) -> &'static str;

    /// Called once when the state becomes current.
    fn on_enter(&mut self, ctx: &mut StateContext<'_>);

    /// Called once when the state stops being current.
    ///
    /// Must release everything acquired in `on_enter`: owned timers,
    /// abilities, movement requests.
    fn on_exit(&mut self, ctx: &mut StateContext<'_>);

    /// Pre-table reaction to an event. Default: ignore.
    fn on_event(&mut self, _ctx: &mut StateContext<'_>, _event: AgentEvent, _instigator: AgentId) {}

    /// One of this state's timers elapsed. Default: ignore.
    fn on_timer(&mut self, _ctx: &mut StateContext<'_>, _timer: &str) {}

    /// Per-frame work while current. Default: none.
    fn on_tick(&mut self, _ctx: &mut StateContext<'_>, _delta_time: f64) {}
}

/// Factory for constructing a state from its descriptor params.
pub type StateFactory = Box<dyn Fn(&ParamBag) -> Box<dyn AgentState> + Send + Sync>;

/// Maps state-kind tags to constructors.
///
/// The engine resolves every `StateDescriptor::kind` through this registry,
/// so behavior assets can name implementations without the engine knowing
/// any concrete type.
#[derive(Default)]
pub struct StateRegistry {
    factories: AHashMap<String, StateFactory>,
}

impl StateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ParamBag) -> Box<dyn AgentState> + Send + Sync + 'static,
    {
        if self
            .factories
            .insert(kind.to_owned(), Box::new(factory))
            .is_some()
        {
            warn!(kind, "state kind re-registered");
        }
    }

    /// Whether `kind` has a registered factory.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Constructs an instance of `kind`, or `None` if unregistered.
    #[must_use]
    pub fn construct(&self, kind: &str, params: &ParamBag) -> Option<Box<dyn AgentState>> {
        self.factories.get(kind).map(|factory| factory(params))
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("StateRegistry").field("kinds", &kinds).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{StubAbilities, StubWorld};
    use super::*;
    use crate::params::ParamBag;

    struct Noop;

    impl AgentState for Noop {
        fn kind(&self) -> &'static str {
            "Noop"
        }
        fn on_enter(&mut self, _ctx: &mut StateContext<'_>) {}
        fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {}
    }

    fn noop_factory(_params: &ParamBag) -> Box<dyn AgentState> {
        Box::new(Noop)
    }

    #[test]
    fn test_registry_construct() {
        let mut registry = StateRegistry::new();
        registry.register("Noop", noop_factory);

        assert!(registry.contains("Noop"));
        let instance = registry.construct("Noop", &ParamBag::default());
        assert_eq!(instance.map(|s| s.kind()), Some("Noop"));
        assert!(registry.construct("Ghost", &ParamBag::default()).is_none());
    }

    #[test]
    fn test_context_buffers_commands() {
        let mut world = StubWorld::default();
        let mut abilities = StubAbilities::default();
        let mut host = Host {
            world: &mut world,
            abilities: &mut abilities,
        };
        let params = ParamBag::default();
        let mut idle_override = None;
        let mut commands = Vec::new();

        let mut ctx = StateContext::new(
            AgentId::from_raw(7),
            &mut host,
            &params,
            &mut idle_override,
            &mut commands,
        );
        ctx.start_timer("look", 3.0, true);
        ctx.stop_timer("idle");
        ctx.raise(AgentEvent::ReturnComplete);
        ctx.set_idle_override(1.0);

        assert_eq!(commands.len(), 3);
        assert_eq!(
            commands[0],
            StateCommand::StartTimer {
                name: "look".into(),
                duration: 3.0,
                repeating: true,
            }
        );
        assert_eq!(
            commands[2],
            StateCommand::Raise {
                event: AgentEvent::ReturnComplete,
                instigator: AgentId::from_raw(7),
            }
        );
        assert_eq!(idle_override, Some(1.0));
    }

    #[test]
    fn test_idle_override_consumed_once() {
        let mut world = StubWorld::default();
        let mut abilities = StubAbilities::default();
        let mut host = Host {
            world: &mut world,
            abilities: &mut abilities,
        };
        let params = ParamBag::default();
        let mut idle_override = Some(2.5);
        let mut commands = Vec::new();

        let mut ctx = StateContext::new(
            AgentId::from_raw(1),
            &mut host,
            &params,
            &mut idle_override,
            &mut commands,
        );
        assert_eq!(ctx.take_idle_override(), Some(2.5));
        assert_eq!(ctx.take_idle_override(), None);
    }
}
