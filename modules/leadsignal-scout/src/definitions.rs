//! Signal definition loading. Definitions are tenant data, not code: the
//! lint pass surfaces broken entries before a run burns fetch budget, and
//! the detector isolates non-compiling regexes at run time.

use tracing::{info, warn};

use leadsignal_common::SignalDefinition;
use leadsignal_distill::lint_definitions;

use crate::error::{Result, ScoutError};

/// Load a JSON array of signal definitions from disk and lint it.
/// Lint findings are logged, never fatal: one bad definition must not take
/// the rest of the tenant's set down with it.
pub fn load_definitions(path: &str) -> Result<Vec<SignalDefinition>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ScoutError::Config(format!("cannot read signal definitions at {path}: {e}")))?;
    let definitions: Vec<SignalDefinition> = serde_json::from_str(&raw)
        .map_err(|e| ScoutError::Config(format!("invalid signal definitions at {path}: {e}")))?;

    if definitions.is_empty() {
        warn!(path, "Signal definition file is empty; runs will detect nothing");
    }
    for finding in lint_definitions(&definitions) {
        warn!(finding = finding.as_str(), "Signal definition lint");
    }
    info!(count = definitions.len(), path, "Loaded signal definitions");

    Ok(definitions)
}
