//! Registry of named circuit breakers, one per dependency class.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ports::{BreakerSnapshot, CircuitBreakerConfig, CircuitState, Clock};

use super::circuit_breaker::CircuitBreaker;

/// External dependency classes guarded by their own breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    ModelEndpoint,
    Compliance,
    OpportunityFeed,
    KnowledgeGraph,
    /// Anything not listed above.
    ExternalApi,
}

impl Dependency {
    pub const ALL: [Dependency; 5] = [
        Dependency::ModelEndpoint,
        Dependency::Compliance,
        Dependency::OpportunityFeed,
        Dependency::KnowledgeGraph,
        Dependency::ExternalApi,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dependency::ModelEndpoint => "model_endpoint",
            Dependency::Compliance => "compliance",
            Dependency::OpportunityFeed => "opportunity_feed",
            Dependency::KnowledgeGraph => "knowledge_graph",
            Dependency::ExternalApi => "external_api",
        }
    }

    /// Built-in configuration used when none is supplied.
    pub fn default_config(&self) -> CircuitBreakerConfig {
        match self {
            Dependency::ModelEndpoint => CircuitBreakerConfig::for_model_endpoint(),
            Dependency::Compliance => CircuitBreakerConfig::for_compliance(),
            Dependency::OpportunityFeed => CircuitBreakerConfig::for_opportunity_feed(),
            Dependency::KnowledgeGraph => CircuitBreakerConfig::for_knowledge_graph(),
            Dependency::ExternalApi => CircuitBreakerConfig::default(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Aggregate breaker health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerHealth {
    /// No breaker is open or probing.
    pub healthy: bool,
    pub open: Vec<String>,
    pub half_open: Vec<String>,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
}

impl BreakerHealth {
    pub fn is_degraded(&self) -> bool {
        !self.healthy
    }
}

/// Owns every breaker in the process. Keys are unique service names.
pub struct CircuitBreakerRegistry {
    clock: Arc<dyn Clock>,
    presets: HashMap<String, CircuitBreakerConfig>,
    generic: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Registry with the built-in configuration for every dependency class.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let presets = Dependency::ALL
            .iter()
            .map(|d| (d.name().to_string(), d.default_config()))
            .collect();
        Self::with_configs(clock, presets, CircuitBreakerConfig::default())
    }

    /// Registry with explicit per-service configuration. Every preset breaker
    /// is created up front; `generic` serves names without a preset.
    pub fn with_configs(
        clock: Arc<dyn Clock>,
        presets: HashMap<String, CircuitBreakerConfig>,
        generic: CircuitBreakerConfig,
    ) -> Self {
        let breakers = presets
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    Arc::new(CircuitBreaker::new(name.clone(), config.clone(), clock.clone())),
                )
            })
            .collect();
        Self {
            clock,
            presets,
            generic,
            breakers: RwLock::new(breakers),
        }
    }

    /// Returns the breaker for `service`, creating it with `config` if absent.
    /// An existing breaker keeps its original configuration.
    pub fn get_or_create(&self, service: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
        {
            return existing.clone();
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(service, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(service, config, self.clock.clone()))
            })
            .clone()
    }

    /// Breaker for `service` using its preset, or the generic configuration
    /// for unknown names.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        let config = self
            .presets
            .get(service)
            .cloned()
            .unwrap_or_else(|| self.generic.clone());
        self.get_or_create(service, config)
    }

    pub fn dependency(&self, dependency: Dependency) -> Arc<CircuitBreaker> {
        self.breaker(dependency.name())
    }

    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.all()
            .into_iter()
            .map(|b| (b.service().to_string(), b.snapshot()))
            .collect()
    }

    pub fn health(&self) -> BreakerHealth {
        let breakers = self.snapshot();
        let open: Vec<String> = breakers
            .values()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.service.clone())
            .collect();
        let half_open: Vec<String> = breakers
            .values()
            .filter(|s| s.state == CircuitState::HalfOpen)
            .map(|s| s.service.clone())
            .collect();
        BreakerHealth {
            healthy: open.is_empty() && half_open.is_empty(),
            open,
            half_open,
            breakers,
        }
    }

    /// Resets one breaker. Returns false for unknown names.
    pub fn reset(&self, service: &str) -> bool {
        let breaker = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned();
        match breaker {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.all() {
            breaker.reset();
        }
        tracing::info!("All circuit breakers reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::ports::BreakerError;
    use std::time::Duration;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(Arc::new(ManualClock::default()))
    }

    async fn trip(breaker: &CircuitBreaker) {
        for _ in 0..breaker.config().failure_threshold {
            let _: Result<(), BreakerError<&str>> =
                breaker.execute(|| async { Err("down") }).await;
        }
    }

    #[test]
    fn preconfigures_every_dependency() {
        let snapshot = registry().snapshot();
        for dep in Dependency::ALL {
            assert!(snapshot.contains_key(dep.name()), "missing {}", dep);
        }
        assert_eq!(snapshot["model_endpoint"].failure_threshold, 5);
        assert_eq!(snapshot["opportunity_feed"].failure_threshold, 3);
    }

    #[test]
    fn get_or_create_returns_same_instance() {
        let r = registry();
        let a = r.get_or_create("geo", CircuitBreakerConfig::new(2, Duration::from_secs(5)));
        let b = r.get_or_create("geo", CircuitBreakerConfig::new(9, Duration::from_secs(9)));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.config().failure_threshold, 2);
    }

    #[test]
    fn unknown_name_uses_generic_config() {
        let r = registry();
        let b = r.breaker("weather_feed");
        assert_eq!(b.config(), &CircuitBreakerConfig::default());
        assert!(r.snapshot().contains_key("weather_feed"));
    }

    #[tokio::test]
    async fn health_lists_open_breakers() {
        let r = registry();
        assert!(r.health().healthy);

        trip(&r.dependency(Dependency::Compliance)).await;

        let health = r.health();
        assert!(!health.healthy);
        assert!(health.is_degraded());
        assert_eq!(health.open, vec!["compliance".to_string()]);
        assert!(health.half_open.is_empty());
    }

    #[tokio::test]
    async fn reset_single_and_all() {
        let r = registry();
        trip(&r.dependency(Dependency::Compliance)).await;
        trip(&r.dependency(Dependency::KnowledgeGraph)).await;

        assert!(r.reset("compliance"));
        assert!(!r.reset("nope"));
        assert_eq!(r.health().open, vec!["knowledge_graph".to_string()]);

        r.reset_all();
        assert!(r.health().healthy);
    }
}
