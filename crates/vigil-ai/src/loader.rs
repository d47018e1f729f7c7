//! Behavior asset loading.
//!
//! Definitions are authored as RON files. Loading parses, normalizes, and
//! validates in one pass; validation findings are logged, never fatal, so
//! a half-broken asset still produces a runnable (if degraded) agent.

use crate::behavior::{BehaviorDefinition, Severity};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};
use vigil_common::CoreError;

/// Parses a definition from RON text, then normalizes and validates it.
pub fn from_ron_str(text: &str) -> Result<BehaviorDefinition, CoreError> {
    let mut definition: BehaviorDefinition =
        ron::from_str(text).map_err(|e| CoreError::Parse(e.to_string()))?;
    finish(&mut definition);
    Ok(definition)
}

/// Loads a definition from a RON file on disk.
pub fn load_definition(path: &Path) -> Result<BehaviorDefinition, CoreError> {
    let text = fs::read_to_string(path)?;
    let definition = from_ron_str(&text)?;
    info!(
        path = %path.display(),
        states = definition.states.len(),
        "behavior definition loaded"
    );
    Ok(definition)
}

/// Serializes a definition to pretty RON, for editor round-trips.
pub fn to_ron_string(definition: &BehaviorDefinition) -> Result<String, CoreError> {
    ron::ser::to_string_pretty(definition, ron::ser::PrettyConfig::default())
        .map_err(|e| CoreError::Parse(e.to_string()))
}

/// Writes a definition to disk as pretty RON.
pub fn save_definition(definition: &BehaviorDefinition, path: &Path) -> Result<(), CoreError> {
    let text = to_ron_string(definition)?;
    fs::write(path, text)?;
    Ok(())
}

fn finish(definition: &mut BehaviorDefinition) {
    definition.normalize();
    for finding in definition.validate() {
        match finding.severity {
            Severity::Warning => warn!(%finding, "behavior validation"),
            Severity::Error => error!(%finding, "behavior validation"),
        }
    }
}
