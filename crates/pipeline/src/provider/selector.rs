use std::sync::atomic::{AtomicUsize, Ordering};

use super::health::HealthStatus;
use crate::plan::{RoutingStrategy, StageConfig};

/// Health view the selector needs for one backend.
#[derive(Debug, Clone, Copy)]
pub struct CandidateHealth {
    pub status: HealthStatus,
    pub average_latency_ms: Option<f64>,
}

/// Rotation counter for round-robin routing, one per stage.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current offset and advances it.
    fn advance(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Orders the backend kinds of one stage for a single request.
///
/// A language override short-circuits routing and returns exactly one kind.
/// `health` returns `None` for backends that are not registered; those are
/// dropped from latency routing only, since dispatch skips them anyway.
pub fn select_candidates<F>(
    config: &StageConfig,
    language: Option<&str>,
    rotation: &RoundRobin,
    health: F,
) -> Vec<String>
where
    F: Fn(&str) -> Option<CandidateHealth>,
{
    if let Some(kind) = language.and_then(|lang| config.override_for(lang)) {
        return vec![kind.to_string()];
    }

    match config.routing_strategy {
        RoutingStrategy::Priority | RoutingStrategy::Cost => by_priority(config),
        RoutingStrategy::Latency => by_latency(config, health),
        RoutingStrategy::RoundRobin => by_rotation(config, rotation),
    }
}

fn by_priority(config: &StageConfig) -> Vec<String> {
    let mut enabled: Vec<_> = config.enabled_backends().collect();
    // Stable sort keeps config order among equal priorities.
    enabled.sort_by(|a, b| b.priority.cmp(&a.priority));
    enabled.into_iter().map(|b| b.kind.clone()).collect()
}

fn by_latency<F>(config: &StageConfig, health: F) -> Vec<String>
where
    F: Fn(&str) -> Option<CandidateHealth>,
{
    let mut ranked: Vec<(String, f64)> = config
        .enabled_backends()
        .filter_map(|b| {
            let h = health(&b.kind)?;
            if h.status == HealthStatus::Unhealthy {
                return None;
            }
            Some((b.kind.clone(), h.average_latency_ms.unwrap_or(0.0)))
        })
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.into_iter().map(|(kind, _)| kind).collect()
}

fn by_rotation(config: &StageConfig, rotation: &RoundRobin) -> Vec<String> {
    let enabled: Vec<String> = config.enabled_backends().map(|b| b.kind.clone()).collect();
    if enabled.is_empty() {
        return enabled;
    }
    let offset = rotation.advance() % enabled.len();
    let mut rotated = enabled;
    rotated.rotate_left(offset);
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BackendConfig;

    fn stage(backends: &[(&str, i32)], strategy: RoutingStrategy) -> StageConfig {
        StageConfig {
            backends: backends
                .iter()
                .map(|(kind, priority)| BackendConfig::new(*kind, *priority))
                .collect(),
            routing_strategy: strategy,
            ..Default::default()
        }
    }

    fn unknown(_: &str) -> Option<CandidateHealth> {
        Some(CandidateHealth {
            status: HealthStatus::Unknown,
            average_latency_ms: None,
        })
    }

    #[test]
    fn priority_is_descending_and_stable() {
        let config = stage(
            &[("low", 1), ("high_a", 10), ("mid", 5), ("high_b", 10)],
            RoutingStrategy::Priority,
        );
        let order = select_candidates(&config, None, &RoundRobin::new(), unknown);
        assert_eq!(order, vec!["high_a", "high_b", "mid", "low"]);
    }

    #[test]
    fn disabled_backends_are_never_candidates() {
        let mut config = stage(&[("a", 10), ("b", 5)], RoutingStrategy::Priority);
        config.backends[0].enabled = false;
        let order = select_candidates(&config, None, &RoundRobin::new(), unknown);
        assert_eq!(order, vec!["b"]);
    }

    #[test]
    fn cost_routes_like_priority() {
        let config = stage(&[("a", 1), ("b", 2)], RoutingStrategy::Cost);
        let order = select_candidates(&config, None, &RoundRobin::new(), unknown);
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn latency_skips_unhealthy_and_sorts_ascending() {
        let config = stage(&[("slow", 1), ("down", 1), ("fast", 1), ("new", 1)], RoutingStrategy::Latency);
        let health = |kind: &str| {
            let (status, avg) = match kind {
                "slow" => (HealthStatus::Healthy, Some(900.0)),
                "down" => (HealthStatus::Unhealthy, Some(10.0)),
                "fast" => (HealthStatus::Degraded, Some(120.0)),
                _ => (HealthStatus::Unknown, None),
            };
            Some(CandidateHealth {
                status,
                average_latency_ms: avg,
            })
        };
        let order = select_candidates(&config, None, &RoundRobin::new(), health);
        assert_eq!(order, vec!["new", "fast", "slow"]);
    }

    #[test]
    fn round_robin_visits_each_backend_once_per_cycle() {
        let config = stage(&[("a", 1), ("b", 1), ("c", 1)], RoutingStrategy::RoundRobin);
        let rotation = RoundRobin::new();
        let firsts: Vec<String> = (0..3)
            .map(|_| select_candidates(&config, None, &rotation, unknown)[0].clone())
            .collect();
        assert_eq!(firsts, vec!["a", "b", "c"]);

        let next = select_candidates(&config, None, &rotation, unknown);
        assert_eq!(next, vec!["a", "b", "c"]);
    }

    #[test]
    fn round_robin_returns_full_rotated_list() {
        let config = stage(&[("a", 1), ("b", 1), ("c", 1)], RoutingStrategy::RoundRobin);
        let rotation = RoundRobin::new();
        let _ = select_candidates(&config, None, &rotation, unknown);
        let second = select_candidates(&config, None, &rotation, unknown);
        assert_eq!(second, vec!["b", "c", "a"]);
    }

    #[test]
    fn language_override_returns_single_backend() {
        let mut config = stage(&[("general", 10), ("vi_special", 1)], RoutingStrategy::Priority);
        config
            .language_overrides
            .insert("vi".to_string(), "vi_special".to_string());
        let order = select_candidates(&config, Some("vi"), &RoundRobin::new(), unknown);
        assert_eq!(order, vec!["vi_special"]);

        let order = select_candidates(&config, Some("en"), &RoundRobin::new(), unknown);
        assert_eq!(order, vec!["general", "vi_special"]);
    }

    #[test]
    fn empty_stage_yields_no_candidates() {
        let config = stage(&[], RoutingStrategy::RoundRobin);
        assert!(select_candidates(&config, None, &RoundRobin::new(), unknown).is_empty());
    }
}
