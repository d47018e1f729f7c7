//! The FSM engine.
//!
//! One [`FsmEngine`] drives one agent. It owns the live state instance,
//! the timer scheduler, and the event queue, and shares a read-only
//! [`BehaviorDefinition`] (and its derived [`TransitionTable`]) with any
//! other agents running the same behavior.
//!
//! Everything runs on the host's frame thread. Concurrency here is
//! concurrency of stimuli, not of threads: perception callbacks, damage
//! callbacks, and timer firings can all re-enter the engine within one
//! call stack. Two guards make that deterministic: an event arriving
//! while another is mid-flight is queued and drained one per pass, and a
//! state change requested while another is mid-flight is rejected and
//! logged.

use crate::behavior::BehaviorDefinition;
use crate::events::{AgentEvent, EventQueue, PendingEvent};
use crate::params::ParamBag;
use crate::scheduler::TimerScheduler;
use crate::state::{AgentState, Host, StateCommand, StateContext, StateRegistry};
use crate::transition::TransitionTable;
use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};
use vigil_common::{AgentId, CoreError};

/// Prefix for the one-shot timers that carry delayed transitions.
///
/// The full name is the prefix plus the target state, so a repeat of the
/// same pending transition replaces the in-flight timer instead of
/// stacking a second one.
const DELAYED_TRANSITION_PREFIX: &str = "DelayedTransition:";

/// Preferred fallback state for tick-time recovery.
const REST_STATE: &str = "Idle";

/// Event-scheduled state machine for a single agent.
pub struct FsmEngine {
    agent: AgentId,
    registry: Arc<StateRegistry>,
    definition: Option<Arc<BehaviorDefinition>>,
    table: TransitionTable,
    scheduler: TimerScheduler,
    queue: EventQueue,
    instances: AHashMap<String, Box<dyn AgentState>>,
    current: Option<String>,
    // Bumped on every committed transition; timer dispatch uses it to
    // detect that the fired batch belongs to an exited state, even when
    // a transition chain cycles back to the same state name.
    transition_epoch: u64,
    is_processing_event: bool,
    is_changing_state: bool,
    idle_override: Option<f64>,
    empty_params: ParamBag,
}

impl FsmEngine {
    /// Creates an uninitialized engine for `agent`.
    ///
    /// Every operation is a logged no-op until [`initialize`] succeeds.
    ///
    /// [`initialize`]: Self::initialize
    #[must_use]
    pub fn new(agent: AgentId, registry: Arc<StateRegistry>) -> Self {
        Self {
            agent,
            registry,
            definition: None,
            table: TransitionTable::default(),
            scheduler: TimerScheduler::new(),
            queue: EventQueue::new(),
            instances: AHashMap::new(),
            current: None,
            transition_epoch: 0,
            is_processing_event: false,
            is_changing_state: false,
            idle_override: None,
            empty_params: ParamBag::default(),
        }
    }

    /// Name of the active state, if initialized.
    #[must_use]
    pub fn current_state_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Whether some event in the active state's table row leads to `target`.
    #[must_use]
    pub fn is_transition_valid(&self, target: &str) -> bool {
        self.current
            .as_deref()
            .is_some_and(|state| self.table.leads_to(state, target))
    }

    /// Starts a named timer scoped to the active state. Host-side helper
    /// mirroring [`StateContext::start_timer`].
    pub fn start_state_timer(&mut self, name: &str, duration: f64, repeating: bool) {
        self.scheduler.start(name, duration, repeating);
    }

    /// Cancels a named timer. Idempotent.
    pub fn stop_state_timer(&mut self, name: &str) {
        self.scheduler.stop(name);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// (Re-)initializes the engine from a definition and enters its
    /// initial state.
    ///
    /// A definition with zero states, or an initial state that cannot be
    /// constructed, leaves the engine uninitialized.
    pub fn initialize(
        &mut self,
        definition: Arc<BehaviorDefinition>,
        host: &mut Host<'_>,
    ) -> Result<(), CoreError> {
        if definition.states.is_empty() {
            self.definition = None;
            self.current = None;
            return Err(CoreError::InvalidDefinition(
                "behavior definition has no states".into(),
            ));
        }

        let (table, diagnostics) = TransitionTable::build(&definition);
        for diagnostic in &diagnostics {
            warn!(agent = %self.agent, %diagnostic, "transition table repair");
        }

        self.scheduler.stop_all();
        self.queue.clear();
        self.instances.clear();
        self.idle_override = None;
        self.current = None;
        self.table = table;

        let initial = definition.initial_state.clone();
        self.definition = Some(definition);

        if self.change_state_by_name(host, &initial) {
            debug!(agent = %self.agent, state = initial, "engine initialized");
            Ok(())
        } else {
            self.definition = None;
            Err(CoreError::InvalidDefinition(format!(
                "initial state `{initial}` could not be entered"
            )))
        }
    }

    /// Hot-swaps the definition: rebuilds the transition table and drops
    /// cached instances, keeping the current state name.
    ///
    /// If the current state no longer exists or can no longer be built,
    /// the next [`tick`] recovers it (§ tick-time recovery).
    ///
    /// [`tick`]: Self::tick
    pub fn reload(&mut self, definition: Arc<BehaviorDefinition>) -> Result<(), CoreError> {
        if definition.states.is_empty() {
            return Err(CoreError::InvalidDefinition(
                "behavior definition has no states".into(),
            ));
        }
        let (table, diagnostics) = TransitionTable::build(&definition);
        for diagnostic in &diagnostics {
            warn!(agent = %self.agent, %diagnostic, "transition table repair");
        }
        self.table = table;
        self.instances.clear();
        self.definition = Some(definition);
        debug!(agent = %self.agent, "behavior definition reloaded");
        Ok(())
    }

    /// Shuts the engine down: exits the current state, cancels every
    /// timer, drops every queued event.
    pub fn shutdown(&mut self, host: &mut Host<'_>) {
        if let Some(current) = self.current.take() {
            if let Some(commands) = self.run_hook(&current, host, |state, ctx| state.on_exit(ctx)) {
                self.apply_commands(host, commands);
            }
        }
        self.scheduler.stop_all();
        self.queue.clear();
        self.instances.clear();
        self.definition = None;
    }

    // ------------------------------------------------------------------
    // Event processing
    // ------------------------------------------------------------------

    /// Feeds an event into the machine.
    ///
    /// If another event is already mid-flight the call queues the event
    /// and returns; queued events are drained one per pass, so a storm of
    /// reentrant raises can neither recurse unboundedly nor starve the
    /// engine. Returns false only when the engine is uninitialized.
    pub fn process_event(
        &mut self,
        host: &mut Host<'_>,
        event: AgentEvent,
        instigator: AgentId,
    ) -> bool {
        let Some(current) = self.current.clone() else {
            warn!(agent = %self.agent, %event, "event dropped: engine not initialized");
            return false;
        };

        if self.is_processing_event {
            trace!(agent = %self.agent, %event, "reentrant event queued");
            self.queue.enqueue(event, instigator);
            return true;
        }

        self.is_processing_event = true;

        // Local reaction first; any raise it records lands in the queue.
        if let Some(commands) =
            self.run_hook(&current, host, |state, ctx| state.on_event(ctx, event, instigator))
        {
            self.apply_commands(host, commands);
        }

        match self.table.lookup(&current, event).cloned() {
            Some(found) => {
                if found.delay > 0.0 {
                    trace!(
                        agent = %self.agent,
                        %event,
                        target = found.target,
                        delay = found.delay,
                        "transition delayed"
                    );
                    let name = format!("{DELAYED_TRANSITION_PREFIX}{}", found.target);
                    self.scheduler.start(&name, found.delay, false);
                } else {
                    self.change_state_by_name(host, &found.target);
                }
            }
            None => {
                trace!(agent = %self.agent, state = current, %event, "no transition for event");
            }
        }

        self.is_processing_event = false;

        // Bounded re-entry: one queued event per pass, each taking the
        // full path again.
        if let Some(PendingEvent { event, instigator }) = self.queue.drain_one() {
            self.process_event(host, event, instigator);
        }
        true
    }

    // ------------------------------------------------------------------
    // State changes
    // ------------------------------------------------------------------

    /// Forces a transition to `name` outside the table-driven path.
    ///
    /// No-ops successfully if already in `name`. Rejected (false) when a
    /// change is already mid-flight, when `name` is empty or unknown, or
    /// when the target instance cannot be constructed; a failed call
    /// leaves the previous state untouched.
    pub fn change_state_by_name(&mut self, host: &mut Host<'_>, name: &str) -> bool {
        if name.is_empty() {
            error!(agent = %self.agent, "state change rejected: empty name");
            return false;
        }
        if self.definition.is_none() {
            warn!(agent = %self.agent, name, "state change dropped: engine not initialized");
            return false;
        }
        if self.is_changing_state {
            warn!(agent = %self.agent, name, "state change rejected: already changing");
            return false;
        }
        self.is_changing_state = true;

        if self.current.as_deref() == Some(name) {
            self.is_changing_state = false;
            return true;
        }

        // Construct before touching the old state, so failure never
        // leaves the machine half-transitioned.
        if !self.ensure_instance(name) {
            self.is_changing_state = false;
            return false;
        }

        let previous = self.current.clone();
        if let Some(old) = previous.as_deref() {
            if let Some(commands) = self.run_hook(old, host, |state, ctx| state.on_exit(ctx)) {
                self.apply_commands(host, commands);
            }
        }
        // Nothing may fire across a state boundary, delayed transitions
        // included.
        self.scheduler.stop_all();

        self.current = Some(name.to_owned());
        self.transition_epoch += 1;
        debug!(
            agent = %self.agent,
            from = previous.as_deref().unwrap_or("<none>"),
            to = name,
            "state changed"
        );

        let enter_commands = self.run_hook(name, host, |state, ctx| state.on_enter(ctx));

        self.is_changing_state = false;
        // Applied after the guard drops so an enter-time raise can take
        // the normal path instead of being rejected.
        if let Some(commands) = enter_commands {
            self.apply_commands(host, commands);
        }
        true
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Per-frame update: recover the current state if needed, drain one
    /// queued event, advance timers, then tick the current state.
    pub fn tick(&mut self, host: &mut Host<'_>, delta_time: f64) {
        if self.definition.is_none() {
            trace!(agent = %self.agent, "tick skipped: engine not initialized");
            return;
        }
        if !self.recover_current_state(host) {
            return;
        }

        if let Some(PendingEvent { event, instigator }) = self.queue.drain_one() {
            self.process_event(host, event, instigator);
        }

        let fired = self.scheduler.advance(delta_time);
        let epoch_at_dispatch = self.transition_epoch;
        for timer in fired {
            // A transition mid-batch invalidates the rest of the batch;
            // those timers belonged to the state that just exited. The
            // epoch catches this even when a chain cycles back to the
            // same state name.
            if self.transition_epoch != epoch_at_dispatch {
                break;
            }
            if let Some(target) = timer.name.strip_prefix(DELAYED_TRANSITION_PREFIX) {
                let target = target.to_owned();
                self.change_state_by_name(host, &target);
            } else if let Some(current) = self.current.clone() {
                if let Some(commands) =
                    self.run_hook(&current, host, |state, ctx| state.on_timer(ctx, &timer.name))
                {
                    self.apply_commands(host, commands);
                }
            }
        }

        if let Some(current) = self.current.clone() {
            if let Some(commands) =
                self.run_hook(&current, host, |state, ctx| state.on_tick(ctx, delta_time))
            {
                self.apply_commands(host, commands);
            }
        }
    }

    /// Tick-time recovery: make sure a live instance backs the current
    /// name. Tries, in order, reconstructing the current state, falling
    /// back to the rest state, and giving up for this frame.
    fn recover_current_state(&mut self, host: &mut Host<'_>) -> bool {
        let Some(current) = self.current.clone() else {
            error!(agent = %self.agent, "tick skipped: no current state");
            return false;
        };
        if self.instances.contains_key(&current) {
            return true;
        }

        warn!(agent = %self.agent, state = current, "current state lost, reconstructing");
        if self.ensure_instance(&current) {
            if let Some(commands) =
                self.run_hook(&current, host, |state, ctx| state.on_enter(ctx))
            {
                self.apply_commands(host, commands);
            }
            return true;
        }

        if current != REST_STATE {
            warn!(agent = %self.agent, "reconstruction failed, falling back to rest state");
            self.current = None;
            if self.change_state_by_name(host, REST_STATE) {
                return true;
            }
            self.current = Some(current.clone());
        }

        error!(agent = %self.agent, state = current, "unrecoverable state, skipping tick");
        false
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Constructs and caches the instance for `name` if absent.
    fn ensure_instance(&mut self, name: &str) -> bool {
        if self.instances.contains_key(name) {
            return true;
        }
        let Some(definition) = self.definition.as_ref() else {
            return false;
        };
        let Some(descriptor) = definition.state(name) else {
            error!(agent = %self.agent, name, "no descriptor for state");
            return false;
        };
        match self.registry.construct(&descriptor.kind, &descriptor.params) {
            Some(instance) => {
                self.instances.insert(name.to_owned(), instance);
                true
            }
            None => {
                error!(
                    agent = %self.agent,
                    name,
                    kind = descriptor.kind,
                    "state kind not registered"
                );
                false
            }
        }
    }

    /// Runs a hook on the named state's instance and returns the commands
    /// it recorded. The instance is taken out of the cache for the call
    /// so the hook can never alias the engine.
    fn run_hook<F>(&mut self, name: &str, host: &mut Host<'_>, hook: F) -> Option<Vec<StateCommand>>
    where
        F: FnOnce(&mut dyn AgentState, &mut StateContext<'_>),
    {
        let mut instance = self.instances.remove(name)?;
        let definition = self.definition.clone();
        let params = definition
            .as_deref()
            .and_then(|d| d.state(name))
            .map_or(&self.empty_params, |d| &d.params);

        let mut commands = Vec::new();
        {
            let mut ctx = StateContext::new(
                self.agent,
                host,
                params,
                &mut self.idle_override,
                &mut commands,
            );
            hook(instance.as_mut(), &mut ctx);
        }
        self.instances.insert(name.to_owned(), instance);
        Some(commands)
    }

    /// Applies buffered hook commands. Raises go back through
    /// [`process_event`], so one recorded mid-event queues and one
    /// recorded from a timer or tick runs the full path inline.
    ///
    /// [`process_event`]: Self::process_event
    fn apply_commands(&mut self, host: &mut Host<'_>, commands: Vec<StateCommand>) {
        for command in commands {
            match command {
                StateCommand::StartTimer {
                    name,
                    duration,
                    repeating,
                } => self.scheduler.start(&name, duration, repeating),
                StateCommand::StopTimer { name } => self.scheduler.stop(&name),
                StateCommand::Raise { event, instigator } => {
                    self.process_event(host, event, instigator);
                }
            }
        }
    }
}

impl std::fmt::Debug for FsmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmEngine")
            .field("agent", &self.agent)
            .field("current", &self.current)
            .field("timers", &self.scheduler.len())
            .field("queued_events", &self.queue.len())
            .field("initialized", &self.definition.is_some())
            .finish_non_exhaustive()
    }
}
