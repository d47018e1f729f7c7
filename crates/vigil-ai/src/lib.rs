//! # Vigil AI
//!
//! Data-driven, event-scheduled behavior FSM for NPCs.
//!
//! This crate provides:
//! - Behavior definitions (states, transitions, parameters) authored as
//!   RON assets, validated and self-repairing on load
//! - A derived transition table with O(1) lookup and critical-transition
//!   self-healing
//! - The frame-driven engine: event queue, re-entrancy guards, named
//!   cancellable timers, delayed transitions, tick-time state recovery
//! - The shipped state set (idle, patrol, chase, attack, return, death)
//!   and the default behavior topology
//!
//! Hosts supply movement, perception, and abilities behind the
//! [`state::AgentWorld`] and [`state::AbilityHost`] traits; one engine
//! drives one agent, and many agents can share one definition.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod behavior;
pub mod engine;
pub mod events;
pub mod loader;
pub mod params;
pub mod presets;
pub mod scheduler;
pub mod state;
pub mod states;
pub mod transition;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::behavior::{BehaviorDefinition, StateDescriptor, Transition};
    pub use crate::engine::FsmEngine;
    pub use crate::events::{AgentEvent, EventQueue, PendingEvent};
    pub use crate::loader::{from_ron_str, load_definition, save_definition};
    pub use crate::params::{ParamBag, ParamValue};
    pub use crate::presets::default_definition;
    pub use crate::scheduler::TimerScheduler;
    pub use crate::state::{
        AbilityHost, AgentState, AgentWorld, Host, StateContext, StateRegistry,
    };
    pub use crate::states::default_registry;
    pub use crate::transition::TransitionTable;
    pub use vigil_common::{AgentId, CoreError};
}

pub use prelude::*;
