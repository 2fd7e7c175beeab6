use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use super::Plan;
use crate::provider::Stage;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read plan file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse plans: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid plan for client '{client_id}': {reason}")]
    Invalid { client_id: String, reason: String },
}

impl PlanError {
    fn invalid(plan: &Plan, reason: impl Into<String>) -> Self {
        PlanError::Invalid {
            client_id: plan.client_id.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(alias = "plans")]
    client_plans: Vec<Plan>,
}

/// Reads and validates every plan in a JSON plan file.
pub fn load_plans(path: impl AsRef<Path>) -> Result<Vec<Plan>, PlanError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let plans = parse_plans(&raw)?;
    info!(path = %path.display(), count = plans.len(), "Client plans loaded");
    Ok(plans)
}

/// Parses `{"client_plans": [...]}`, expanding `${VAR}` references first.
pub fn parse_plans(raw: &str) -> Result<Vec<Plan>, PlanError> {
    let expanded = expand_env_vars(raw);
    let file: PlanFile = serde_json::from_str(&expanded)?;
    for plan in &file.client_plans {
        validate(plan)?;
    }
    Ok(file.client_plans)
}

/// Replaces `${VAR}` with the variable's value, or an empty string when unset.
pub fn expand_env_vars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => warn!(var = %name, "Plan references unset environment variable"),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Structural checks applied before a plan is accepted.
pub fn validate(plan: &Plan) -> Result<(), PlanError> {
    if plan.client_id.trim().is_empty() {
        return Err(PlanError::invalid(plan, "client_id is required"));
    }

    for stage in Stage::ALL {
        let config = plan.stage(stage);
        if config.backends.is_empty() {
            return Err(PlanError::invalid(
                plan,
                format!("at least one {stage} backend is required"),
            ));
        }
        if let Some(service_type) = config.service_type {
            if service_type != stage {
                return Err(PlanError::invalid(
                    plan,
                    format!("{stage} config declares service type {service_type}"),
                ));
            }
        }
        for (language, kind) in &config.language_overrides {
            if config.backend(kind).is_none() {
                return Err(PlanError::invalid(
                    plan,
                    format!("{stage} override for '{language}' names unlisted backend '{kind}'"),
                ));
            }
        }
    }

    if plan.sla.max_latency_ms == 0 {
        return Err(PlanError::invalid(plan, "max_latency_ms must be positive"));
    }
    if !(0.0..=1.0).contains(&plan.sla.min_availability) {
        return Err(PlanError::invalid(plan, "min_availability must be between 0 and 1"));
    }
    if !(0.0..=1.0).contains(&plan.sla.max_error_rate) {
        return Err(PlanError::invalid(plan, "max_error_rate must be between 0 and 1"));
    }

    Ok(())
}
