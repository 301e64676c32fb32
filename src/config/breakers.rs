//! Circuit breaker configuration per dependency class

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::resilience::Dependency;
use crate::ports::CircuitBreakerConfig;

/// Overrides for one breaker. Unset values keep the dependency's default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

impl BreakerSettings {
    fn resolve(&self, defaults: CircuitBreakerConfig) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(defaults.failure_threshold),
            recovery_timeout: self
                .recovery_timeout_secs
                .map_or(defaults.recovery_timeout, Duration::from_secs),
            call_timeout: self
                .call_timeout_secs
                .map_or(defaults.call_timeout, Duration::from_secs),
        }
    }

    fn validate(&self, name: &'static str) -> Result<(), ValidationError> {
        if self.failure_threshold == Some(0) {
            return Err(ValidationError::InvalidFailureThreshold(name));
        }
        if self.recovery_timeout_secs == Some(0) || self.call_timeout_secs == Some(0) {
            return Err(ValidationError::InvalidTimeout(name));
        }
        Ok(())
    }
}

/// Breaker configuration for every dependency class
///
/// `PROPOSALOS__BREAKERS__COMPLIANCE__FAILURE_THRESHOLD=5` overrides a single
/// value. Defaults: model endpoint 5 failures / 60s, compliance 3 / 60s,
/// opportunity feed 3 / 120s, knowledge graph 3 / 90s, anything else 3 / 60s.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BreakersConfig {
    pub model_endpoint: BreakerSettings,
    pub compliance: BreakerSettings,
    pub opportunity_feed: BreakerSettings,
    pub knowledge_graph: BreakerSettings,
    /// Used for services without their own entry
    pub external_api: BreakerSettings,
}

impl BreakersConfig {
    fn settings(&self, dependency: Dependency) -> &BreakerSettings {
        match dependency {
            Dependency::ModelEndpoint => &self.model_endpoint,
            Dependency::Compliance => &self.compliance,
            Dependency::OpportunityFeed => &self.opportunity_feed,
            Dependency::KnowledgeGraph => &self.knowledge_graph,
            Dependency::ExternalApi => &self.external_api,
        }
    }

    /// Effective configuration for one dependency class.
    pub fn config_for(&self, dependency: Dependency) -> CircuitBreakerConfig {
        self.settings(dependency).resolve(dependency.default_config())
    }

    /// Per-service configuration keyed by dependency name.
    pub fn presets(&self) -> HashMap<String, CircuitBreakerConfig> {
        Dependency::ALL
            .iter()
            .map(|d| (d.name().to_string(), self.config_for(*d)))
            .collect()
    }

    pub fn generic(&self) -> CircuitBreakerConfig {
        self.config_for(Dependency::ExternalApi)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for dependency in Dependency::ALL {
            self.settings(dependency).validate(dependency.name())?;
        }
        Ok(())
    }
}
