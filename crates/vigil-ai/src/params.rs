//! Per-state parameter values.
//!
//! Behavior definitions carry a small bag of named values per state
//! (timings, speeds, radii, ability names). States read them through the
//! typed accessors with a default-on-miss contract, so a definition missing
//! a parameter degrades to the shipped default instead of failing.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Numeric value (timings, speeds, distances).
    Float(f64),
    /// Text value (ability names, route labels).
    Text(String),
    /// Flag value.
    Bool(bool),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Named parameter bag owned by a state descriptor.
///
/// Insertion order is irrelevant; names are unique per state. The bag is
/// cloned into each state instance at construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamBag {
    values: AHashMap<String, ParamValue>,
}

impl ParamBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.values.insert(name.to_owned(), value.into());
    }

    /// Builder-style insert, used by preset construction.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Raw lookup.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Numeric lookup with default on miss or type mismatch.
    #[must_use]
    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            _ => default,
        }
    }

    /// Flag lookup with default. A numeric value is interpreted as a flag
    /// (non-zero = true) for definitions authored before flags existed.
    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            Some(ParamValue::Float(v)) => v.abs() > f64::EPSILON,
            _ => default,
        }
    }

    /// Text lookup; `None` on miss or type mismatch.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over name/value pairs (unspecified order).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let bag = ParamBag::new()
            .with("idle_time", 5.0)
            .with("ability", "patrol_move")
            .with("loop", true);

        assert!((bag.float_or("idle_time", 0.0) - 5.0).abs() < f64::EPSILON);
        assert_eq!(bag.text("ability"), Some("patrol_move"));
        assert!(bag.bool_or("loop", false));
    }

    #[test]
    fn test_default_on_miss() {
        let bag = ParamBag::new();
        assert!((bag.float_or("missing", 2.5) - 2.5).abs() < f64::EPSILON);
        assert!(bag.bool_or("missing", true));
        assert_eq!(bag.text("missing"), None);
    }

    #[test]
    fn test_default_on_type_mismatch() {
        let bag = ParamBag::new().with("speed", 3.0);
        assert_eq!(bag.text("speed"), None);
        // Numeric values double as flags.
        assert!(bag.bool_or("speed", false));
    }

    #[test]
    fn test_replace_same_name() {
        let mut bag = ParamBag::new();
        bag.set("idle_time", 5.0);
        bag.set("idle_time", 8.0);
        assert_eq!(bag.len(), 1);
        assert!((bag.float_or("idle_time", 0.0) - 8.0).abs() < f64::EPSILON);
    }
}
