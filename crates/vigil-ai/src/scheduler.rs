//! Named, cancellable, cooperative timers.
//!
//! The scheduler owns every delayed callback of one engine instance: idle
//! waits, repath intervals, delayed transitions. Timers are keyed by name;
//! starting a timer under an existing name cancels and replaces it, so a
//! repeated request can never produce two firings. Delivery is cooperative:
//! [`TimerScheduler::advance`] returns the names that elapsed this tick and
//! the caller dispatches them on the same logical thread. There are no
//! cross-thread callbacks and nothing blocks.

use tracing::{debug, trace};

#[derive(Debug, Clone)]
struct Timer {
    name: String,
    remaining: f64,
    period: f64,
    repeating: bool,
}

/// A timer that elapsed during an [`TimerScheduler::advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    /// The name the timer was started under.
    pub name: String,
}

/// Owns the named timers of one FSM instance.
///
/// Tearing the scheduler down (state exit, engine shutdown) cancels all
/// timers, so nothing can fire into a destroyed state.
#[derive(Debug, Default)]
pub struct TimerScheduler {
    // Vec keeps start order, which makes firing order deterministic.
    timers: Vec<Timer>,
}

impl TimerScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) a timer.
    ///
    /// Any existing timer under the same name is cancelled first; there is
    /// never more than one live timer per name. A non-positive duration
    /// fires on the next `advance`.
    pub fn start(&mut self, name: &str, duration: f64, repeating: bool) {
        self.stop(name);
        trace!(name, duration, repeating, "timer started");
        self.timers.push(Timer {
            name: name.to_owned(),
            remaining: duration.max(0.0),
            period: duration.max(0.0),
            repeating,
        });
    }

    /// Cancels a timer by name. Cancelling a non-existent timer is a no-op.
    pub fn stop(&mut self, name: &str) {
        let before = self.timers.len();
        self.timers.retain(|t| t.name != name);
        if self.timers.len() != before {
            trace!(name, "timer stopped");
        }
    }

    /// Cancels every timer.
    pub fn stop_all(&mut self) {
        if !self.timers.is_empty() {
            debug!(count = self.timers.len(), "stopping all timers");
            self.timers.clear();
        }
    }

    /// Whether a timer with the given name is live.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.timers.iter().any(|t| t.name == name)
    }

    /// Seconds until a timer elapses, if it is live.
    #[must_use]
    pub fn remaining(&self, name: &str) -> Option<f64> {
        self.timers.iter().find(|t| t.name == name).map(|t| t.remaining)
    }

    /// Number of live timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Advances all timers by `delta_time` seconds and returns the ones
    /// that elapsed, in start order.
    ///
    /// One-shot timers are removed when they fire. Repeating timers re-arm
    /// to their period and fire at most once per `advance` call, keeping
    /// delivery cooperative even when a frame hitch exceeds the period.
    pub fn advance(&mut self, delta_time: f64) -> Vec<TimerFired> {
        if delta_time <= 0.0 {
            return Vec::new();
        }
        let mut fired = Vec::new();
        for timer in &mut self.timers {
            timer.remaining -= delta_time;
            if timer.remaining <= 0.0 {
                fired.push(TimerFired {
                    name: timer.name.clone(),
                });
                if timer.repeating {
                    timer.remaining = timer.period;
                }
            }
        }
        self.timers.retain(|t| t.repeating || t.remaining > 0.0);
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fired_names(fired: &[TimerFired]) -> Vec<&str> {
        fired.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_one_shot_fires_once() {
        let mut sched = TimerScheduler::new();
        sched.start("idle", 2.0, false);

        assert!(sched.advance(1.0).is_empty());
        assert_eq!(fired_names(&sched.advance(1.0)), vec!["idle"]);
        assert!(sched.advance(10.0).is_empty());
        assert!(!sched.is_active("idle"));
    }

    #[test]
    fn test_replacement_fires_once_at_new_duration() {
        let mut sched = TimerScheduler::new();
        sched.start("T", 1.0, false);
        sched.start("T", 3.0, false);

        // Would have fired under d1; must not.
        assert!(sched.advance(1.5).is_empty());
        assert_eq!(fired_names(&sched.advance(1.5)), vec!["T"]);
        assert!(sched.advance(5.0).is_empty());
    }

    #[test]
    fn test_repeating_rearm() {
        let mut sched = TimerScheduler::new();
        sched.start("look", 1.0, true);

        assert_eq!(sched.advance(1.0).len(), 1);
        assert_eq!(sched.advance(1.0).len(), 1);
        assert!(sched.is_active("look"));
        sched.stop("look");
        assert!(sched.advance(1.0).is_empty());
    }

    #[test]
    fn test_repeating_fires_at_most_once_per_advance() {
        let mut sched = TimerScheduler::new();
        sched.start("tick", 0.5, true);
        // A hitch covering four periods still delivers one firing.
        assert_eq!(sched.advance(2.0).len(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut sched = TimerScheduler::new();
        sched.stop("ghost");
        sched.start("a", 1.0, false);
        sched.stop("a");
        sched.stop("a");
        assert!(sched.is_empty());
    }

    #[test]
    fn test_stop_all() {
        let mut sched = TimerScheduler::new();
        sched.start("a", 1.0, false);
        sched.start("b", 2.0, true);
        sched.stop_all();
        assert!(sched.is_empty());
        assert!(sched.advance(5.0).is_empty());
    }

    #[test]
    fn test_firing_order_is_start_order() {
        let mut sched = TimerScheduler::new();
        sched.start("first", 1.0, false);
        sched.start("second", 0.5, false);
        let fired = sched.advance(1.0);
        assert_eq!(fired_names(&fired), vec!["first", "second"]);
    }

    #[test]
    fn test_zero_duration_fires_next_advance() {
        let mut sched = TimerScheduler::new();
        sched.start("now", 0.0, false);
        assert_eq!(sched.advance(0.016).len(), 1);
    }

    #[test]
    fn test_remaining() {
        let mut sched = TimerScheduler::new();
        sched.start("a", 2.0, false);
        sched.advance(0.5);
        let rem = sched.remaining("a").expect("live");
        assert!((rem - 1.5).abs() < 1e-9);
        assert!(sched.remaining("ghost").is_none());
    }
}
