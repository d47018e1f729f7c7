//! Shipped state implementations.
//!
//! These are the default behaviors the preset topology names: idle looking
//! around, patrolling near home, chasing and attacking a target, returning
//! home, and a terminal death state. Each reads its tuning from the
//! descriptor's parameter bag on enter, with the defaults below.

use crate::events::AgentEvent;
use crate::params::ParamBag;
use crate::state::{AgentState, StateContext, StateRegistry};
use glam::Vec3;
use tracing::debug;
use vigil_common::AgentId;

/// State-kind tags for the shipped behaviors.
pub mod kind {
    /// Stand at the current spot, glance around, time out into patrol.
    pub const IDLE: &str = "Idle";
    /// Walk a loop of random points near home.
    pub const PATROL: &str = "Patrol";
    /// Pursue the tracked target.
    pub const CHASE: &str = "Chase";
    /// Hold range and fire an ability at the target.
    pub const ATTACK: &str = "Attack";
    /// Walk back to the home anchor.
    pub const RETURN: &str = "Return";
    /// Terminal.
    pub const DEATH: &str = "Death";
}

/// Registry pre-loaded with every shipped state kind.
#[must_use]
pub fn default_registry() -> StateRegistry {
    let mut registry = StateRegistry::new();
    registry.register(kind::IDLE, |p| Box::new(IdleState::new(p)));
    registry.register(kind::PATROL, |p| Box::new(PatrolState::new(p)));
    registry.register(kind::CHASE, |p| Box::new(ChaseState::new(p)));
    registry.register(kind::ATTACK, |p| Box::new(AttackState::new(p)));
    registry.register(kind::RETURN, |p| Box::new(ReturnState::new(p)));
    registry.register(kind::DEATH, |_| Box::new(DeathState));
    registry
}

// ============================================================================
// Idle
// ============================================================================

const IDLE_TIMER: &str = "IdleTimer";
const LOOK_TIMER: &str = "LookTimer";

/// Stands still, glances around on an interval, raises [`AgentEvent::IdleTimeout`]
/// when the configured idle duration elapses.
#[derive(Debug)]
pub struct IdleState {
    idle_time: f64,
    look_interval: f64,
}

impl IdleState {
    /// Builds from descriptor params (`IdleTime`, `LookInterval`).
    #[must_use]
    pub fn new(params: &ParamBag) -> Self {
        Self {
            idle_time: params.float_or("IdleTime", 5.0),
            look_interval: params.float_or("LookInterval", 2.0),
        }
    }
}

impl AgentState for IdleState {
    fn kind(&self) -> &'static str {
        kind::IDLE
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.world.stop_movement();
        // A returning agent asks for a short settle before patrolling again.
        let idle_time = ctx.take_idle_override().unwrap_or(self.idle_time);
        debug!(agent = %ctx.agent, idle_time, "idle: settling");
        ctx.start_timer(IDLE_TIMER, idle_time, false);
        if self.look_interval > 0.0 {
            ctx.start_timer(LOOK_TIMER, self.look_interval, true);
        }
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        ctx.stop_timer(IDLE_TIMER);
        ctx.stop_timer(LOOK_TIMER);
    }

    fn on_event(&mut self, ctx: &mut StateContext<'_>, event: AgentEvent, instigator: AgentId) {
        if matches!(event, AgentEvent::PlayerSeen | AgentEvent::TookDamage) {
            ctx.world.set_target(instigator);
        }
    }

    fn on_timer(&mut self, ctx: &mut StateContext<'_>, timer: &str) {
        match timer {
            IDLE_TIMER => ctx.raise(AgentEvent::IdleTimeout),
            LOOK_TIMER => {
                let here = ctx.world.position();
                let angle = fastrand::f32() * std::f32::consts::TAU;
                ctx.world
                    .face_toward(here + Vec3::new(angle.cos(), 0.0, angle.sin()));
            }
            _ => {}
        }
    }
}

// ============================================================================
// Patrol
// ============================================================================

/// Walks to random reachable points around home, raising
/// [`AgentEvent::PatrolComplete`] after the configured number of points.
#[derive(Debug)]
pub struct PatrolState {
    speed: f64,
    acceptance_radius: f64,
    max_distance: f64,
    num_points: u32,
    points_visited: u32,
    // Per-instance so concurrent agents never share a goal.
    current_goal: Option<Vec3>,
}

impl PatrolState {
    /// Builds from descriptor params (`PatrolSpeed`, `AcceptanceRadius`,
    /// `MaxPatrolDistance`, `NumPatrolPoints`).
    #[must_use]
    pub fn new(params: &ParamBag) -> Self {
        Self {
            speed: params.float_or("PatrolSpeed", 300.0),
            acceptance_radius: params.float_or("AcceptanceRadius", 100.0),
            max_distance: params.float_or("MaxPatrolDistance", 1000.0),
            num_points: params.float_or("NumPatrolPoints", 4.0).max(1.0) as u32,
            points_visited: 0,
            current_goal: None,
        }
    }

    fn next_goal(&mut self, ctx: &mut StateContext<'_>) {
        let home = ctx.world.home();
        match ctx
            .world
            .random_reachable_point(home, self.max_distance as f32)
        {
            Some(goal) => {
                self.current_goal = Some(goal);
                ctx.world.move_to(goal, self.acceptance_radius as f32);
            }
            None => {
                debug!(agent = %ctx.agent, "patrol: no reachable point, completing");
                self.current_goal = None;
                ctx.raise(AgentEvent::PatrolComplete);
            }
        }
    }
}

impl AgentState for PatrolState {
    fn kind(&self) -> &'static str {
        kind::PATROL
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        self.points_visited = 0;
        ctx.world.set_move_speed(self.speed as f32);
        self.next_goal(ctx);
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        self.current_goal = None;
        ctx.world.stop_movement();
    }

    fn on_event(&mut self, ctx: &mut StateContext<'_>, event: AgentEvent, instigator: AgentId) {
        if matches!(event, AgentEvent::PlayerSeen | AgentEvent::TookDamage) {
            ctx.world.set_target(instigator);
        }
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>, _delta_time: f64) {
        let Some(goal) = self.current_goal else {
            return;
        };
        let distance = f64::from(ctx.world.position().distance(goal));
        if distance <= self.acceptance_radius {
            self.points_visited += 1;
            if self.points_visited >= self.num_points {
                ctx.raise(AgentEvent::PatrolComplete);
                self.current_goal = None;
            } else {
                self.next_goal(ctx);
            }
        }
    }
}

// ============================================================================
// Chase
// ============================================================================

const REPATH_TIMER: &str = "RepathTimer";

/// Pursues the tracked target, repathing on an interval, raising
/// [`AgentEvent::ReachedTarget`] once inside attack range.
#[derive(Debug)]
pub struct ChaseState {
    speed: f64,
    attack_range: f64,
    repath_interval: f64,
}

impl ChaseState {
    /// Builds from descriptor params (`ChaseSpeed`, `AttackRange`,
    /// `RepathInterval`).
    #[must_use]
    pub fn new(params: &ParamBag) -> Self {
        Self {
            speed: params.float_or("ChaseSpeed", 600.0),
            attack_range: params.float_or("AttackRange", 200.0),
            repath_interval: params.float_or("RepathInterval", 0.3),
        }
    }

    fn pursue(&self, ctx: &mut StateContext<'_>) {
        let Some(target) = ctx.world.target_position() else {
            return;
        };
        let distance = f64::from(ctx.world.position().distance(target));
        if distance <= self.attack_range {
            ctx.raise(AgentEvent::ReachedTarget);
        } else {
            ctx.world.move_to(target, self.attack_range as f32);
        }
    }
}

impl AgentState for ChaseState {
    fn kind(&self) -> &'static str {
        kind::CHASE
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.world.set_move_speed(self.speed as f32);
        ctx.start_timer(REPATH_TIMER, self.repath_interval.max(0.05), true);
        self.pursue(ctx);
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        ctx.stop_timer(REPATH_TIMER);
        ctx.world.stop_movement();
    }

    fn on_event(&mut self, ctx: &mut StateContext<'_>, event: AgentEvent, instigator: AgentId) {
        match event {
            // Refresh the target; damage from a second attacker redirects.
            AgentEvent::PlayerSeen | AgentEvent::TookDamage => ctx.world.set_target(instigator),
            AgentEvent::PlayerLost => debug!(agent = %ctx.agent, "chase: target lost"),
            _ => {}
        }
    }

    fn on_timer(&mut self, ctx: &mut StateContext<'_>, timer: &str) {
        if timer == REPATH_TIMER {
            self.pursue(ctx);
        }
    }
}

// ============================================================================
// Attack
// ============================================================================

/// Holds position in range and runs the configured attack ability,
/// raising [`AgentEvent::TargetOutOfRange`] when the target escapes.
#[derive(Debug)]
pub struct AttackState {
    attack_range: f64,
    ability: Option<String>,
    ability_live: bool,
}

impl AttackState {
    /// Builds from descriptor params (`AttackRange`, `AttackAbility`).
    #[must_use]
    pub fn new(params: &ParamBag) -> Self {
        Self {
            attack_range: params.float_or("AttackRange", 200.0),
            ability: params.text("AttackAbility").map(str::to_owned),
            ability_live: false,
        }
    }
}

impl AgentState for AttackState {
    fn kind(&self) -> &'static str {
        kind::ATTACK
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.world.stop_movement();
        if let Some(target) = ctx.world.target_position() {
            ctx.world.face_toward(target);
        }
        if let Some(ability) = self.ability.clone() {
            self.ability_live = ctx.abilities.try_activate(&ability);
            if !self.ability_live {
                debug!(agent = %ctx.agent, ability, "attack: ability failed to activate");
            }
        }
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        if self.ability_live {
            if let Some(ability) = self.ability.clone() {
                ctx.abilities.try_deactivate(&ability);
            }
            self.ability_live = false;
        }
    }

    fn on_event(&mut self, ctx: &mut StateContext<'_>, event: AgentEvent, instigator: AgentId) {
        if matches!(event, AgentEvent::TookDamage) {
            ctx.world.set_target(instigator);
        }
    }

    fn on_tick(&mut self, ctx: &mut StateContext<'_>, _delta_time: f64) {
        let Some(target) = ctx.world.target_position() else {
            ctx.raise(AgentEvent::PlayerLost);
            return;
        };
        ctx.world.face_toward(target);
        let distance = f64::from(ctx.world.position().distance(target));
        if distance > self.attack_range {
            ctx.raise(AgentEvent::TargetOutOfRange);
        }
    }
}

// ============================================================================
// Return
// ============================================================================

const RETURN_CHECK_TIMER: &str = "ReturnCheckTimer";

/// Walks back to the home anchor, raising [`AgentEvent::ReturnComplete`]
/// on arrival with a short idle-settle hint for the rest state.
#[derive(Debug)]
pub struct ReturnState {
    speed: f64,
    acceptance_radius: f64,
    check_interval: f64,
    settle_time: f64,
}

impl ReturnState {
    /// Builds from descriptor params (`ReturnSpeed`, `AcceptanceRadius`,
    /// `PathUpdateInterval`, `SettleTime`).
    #[must_use]
    pub fn new(params: &ParamBag) -> Self {
        Self {
            speed: params.float_or("ReturnSpeed", 450.0),
            acceptance_radius: params.float_or("AcceptanceRadius", 100.0),
            check_interval: params.float_or("PathUpdateInterval", 0.5),
            settle_time: params.float_or("SettleTime", 1.0),
        }
    }

    fn arrived(&self, ctx: &mut StateContext<'_>) -> bool {
        let home = ctx.world.home();
        f64::from(ctx.world.position().distance(home)) <= self.acceptance_radius
    }
}

impl AgentState for ReturnState {
    fn kind(&self) -> &'static str {
        kind::RETURN
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.world.clear_target();
        ctx.world.set_move_speed(self.speed as f32);
        let home = ctx.world.home();
        ctx.world.move_to(home, self.acceptance_radius as f32);
        ctx.start_timer(RETURN_CHECK_TIMER, self.check_interval.max(0.05), true);
    }

    fn on_exit(&mut self, ctx: &mut StateContext<'_>) {
        ctx.stop_timer(RETURN_CHECK_TIMER);
        ctx.world.stop_movement();
    }

    fn on_event(&mut self, ctx: &mut StateContext<'_>, event: AgentEvent, instigator: AgentId) {
        if matches!(event, AgentEvent::PlayerSeen | AgentEvent::TookDamage) {
            ctx.world.set_target(instigator);
        }
    }

    fn on_timer(&mut self, ctx: &mut StateContext<'_>, timer: &str) {
        if timer != RETURN_CHECK_TIMER {
            return;
        }
        if self.arrived(ctx) {
            debug!(agent = %ctx.agent, "return: home reached");
            ctx.set_idle_override(self.settle_time);
            ctx.raise(AgentEvent::ReturnComplete);
        } else {
            // Re-issue in case the path request failed or the world shifted.
            let home = ctx.world.home();
            ctx.world.move_to(home, self.acceptance_radius as f32);
        }
    }
}

// ============================================================================
// Death
// ============================================================================

/// Terminal state. Halts the agent and ignores everything thereafter.
#[derive(Debug)]
pub struct DeathState;

impl AgentState for DeathState {
    fn kind(&self) -> &'static str {
        kind::DEATH
    }

    fn on_enter(&mut self, ctx: &mut StateContext<'_>) {
        ctx.world.stop_movement();
        ctx.world.clear_target();
    }

    fn on_exit(&mut self, _ctx: &mut StateContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{StubAbilities, StubWorld};
    use crate::state::{Host, StateCommand};

    fn run<F>(world: &mut StubWorld, params: &ParamBag, f: F) -> (Vec<StateCommand>, Option<f64>)
    where
        F: FnOnce(&mut StateContext<'_>),
    {
        let mut abilities = StubAbilities::default();
        let mut host = Host {
            world,
            abilities: &mut abilities,
        };
        let mut idle_override = None;
        let mut commands = Vec::new();
        let mut ctx = StateContext::new(
            AgentId::from_raw(1),
            &mut host,
            params,
            &mut idle_override,
            &mut commands,
        );
        f(&mut ctx);
        (commands, idle_override)
    }

    fn raised(commands: &[StateCommand]) -> Vec<AgentEvent> {
        commands
            .iter()
            .filter_map(|c| match c {
                StateCommand::Raise { event, .. } => Some(*event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_idle_starts_both_timers() {
        let params = ParamBag::default().with("IdleTime", 7.0);
        let mut state = IdleState::new(&params);
        let mut world = StubWorld::default();

        let (commands, _) = run(&mut world, &params, |ctx| state.on_enter(ctx));
        assert_eq!(
            commands[0],
            StateCommand::StartTimer {
                name: IDLE_TIMER.into(),
                duration: 7.0,
                repeating: false,
            }
        );
        assert!(matches!(
            &commands[1],
            StateCommand::StartTimer { name, repeating: true, .. } if name == LOOK_TIMER
        ));
    }

    #[test]
    fn test_idle_timer_raises_timeout() {
        let params = ParamBag::default();
        let mut state = IdleState::new(&params);
        let mut world = StubWorld::default();

        let (commands, _) = run(&mut world, &params, |ctx| state.on_timer(ctx, IDLE_TIMER));
        assert_eq!(raised(&commands), vec![AgentEvent::IdleTimeout]);
    }

    #[test]
    fn test_patrol_completes_after_configured_points() {
        let params = ParamBag::default()
            .with("NumPatrolPoints", 2.0)
            .with("AcceptanceRadius", 1.0);
        let mut state = PatrolState::new(&params);
        let mut world = StubWorld::default();

        let (_, _) = run(&mut world, &params, |ctx| state.on_enter(ctx));
        assert_eq!(world.move_requests.len(), 1);

        // Teleport onto the goal twice; second arrival completes the loop.
        world.position = world.move_requests[0];
        let (commands, _) = run(&mut world, &params, |ctx| state.on_tick(ctx, 0.1));
        assert!(raised(&commands).is_empty());

        world.position = world.move_requests[1];
        let (commands, _) = run(&mut world, &params, |ctx| state.on_tick(ctx, 0.1));
        assert_eq!(raised(&commands), vec![AgentEvent::PatrolComplete]);
    }

    #[test]
    fn test_chase_raises_reached_target_in_range() {
        let params = ParamBag::default().with("AttackRange", 50.0);
        let mut state = ChaseState::new(&params);
        let mut world = StubWorld {
            target: Some((AgentId::from_raw(9), Vec3::new(10.0, 0.0, 0.0))),
            ..StubWorld::default()
        };

        let (commands, _) = run(&mut world, &params, |ctx| state.on_timer(ctx, REPATH_TIMER));
        assert_eq!(raised(&commands), vec![AgentEvent::ReachedTarget]);
    }

    #[test]
    fn test_attack_activates_and_releases_ability() {
        let params = ParamBag::default().with("AttackAbility", "Bite");
        let mut state = AttackState::new(&params);
        let mut world = StubWorld::default();
        let mut abilities = StubAbilities::default();
        let mut host = Host {
            world: &mut world,
            abilities: &mut abilities,
        };
        let mut idle_override = None;
        let mut commands = Vec::new();
        let mut ctx = StateContext::new(
            AgentId::from_raw(1),
            &mut host,
            &params,
            &mut idle_override,
            &mut commands,
        );
        state.on_enter(&mut ctx);
        state.on_exit(&mut ctx);

        assert_eq!(abilities.activated, vec!["Bite"]);
        assert_eq!(abilities.deactivated, vec!["Bite"]);
    }

    #[test]
    fn test_attack_reports_escape() {
        let params = ParamBag::default().with("AttackRange", 50.0);
        let mut state = AttackState::new(&params);
        let mut world = StubWorld {
            target: Some((AgentId::from_raw(9), Vec3::new(500.0, 0.0, 0.0))),
            ..StubWorld::default()
        };

        let (commands, _) = run(&mut world, &params, |ctx| state.on_tick(ctx, 0.1));
        assert_eq!(raised(&commands), vec![AgentEvent::TargetOutOfRange]);
    }

    #[test]
    fn test_return_sets_settle_hint_on_arrival() {
        let params = ParamBag::default().with("SettleTime", 1.0);
        let mut state = ReturnState::new(&params);
        let mut world = StubWorld::default(); // position == home

        let (commands, hint) =
            run(&mut world, &params, |ctx| state.on_timer(ctx, RETURN_CHECK_TIMER));
        assert_eq!(raised(&commands), vec![AgentEvent::ReturnComplete]);
        assert_eq!(hint, Some(1.0));
    }

    #[test]
    fn test_default_registry_covers_all_kinds() {
        let registry = default_registry();
        for k in [
            kind::IDLE,
            kind::PATROL,
            kind::CHASE,
            kind::ATTACK,
            kind::RETURN,
            kind::DEATH,
        ] {
            assert!(registry.contains(k), "missing kind {k}");
        }
    }
}
