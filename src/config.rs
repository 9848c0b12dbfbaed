// Runtime configuration for the trust engine.
// Loaded through figment by `config_loader`; every section has defaults so
// an empty file (or none) yields a runnable setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::Containment;
use crate::agent_status::StatusThresholds;
use crate::errors::{TrustError, TrustResult};
use crate::scope_policy::DestinationAllowlist;
use crate::threat_landscape::ThreatDiscounts;
use crate::trust_evaluator::EvaluatorSettings;
use crate::trust_linear::{TrustPenalties, TrustWeights};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub status: StatusThresholds,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: PathBuf::from("data/agents"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub timeout_ms: u64,
    pub max_data_size: usize,
    pub weights: TrustWeights,
    pub penalties: TrustPenalties,
    pub threat_discounts: ThreatDiscounts,
    pub allowlist: DestinationAllowlist,
    pub default_containment: Containment,
    /// Persist each evaluation of a registered agent as a history sample.
    /// Off by default, since recorded samples feed later evaluations.
    pub record_history: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_data_size: 256 * 1024,
            weights: TrustWeights::default(),
            penalties: TrustPenalties::default(),
            threat_discounts: ThreatDiscounts::default(),
            allowlist: DestinationAllowlist::default(),
            default_containment: Containment::Medium,
            record_history: false,
        }
    }
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            weights: self.weights.clone(),
            penalties: self.penalties.clone(),
            threat_discounts: self.threat_discounts.clone(),
            allowlist: self.allowlist.clone(),
            default_containment: self.default_containment,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Hash-linked JSONL trail; tracing only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Remote narrator endpoint; the built-in template is used when unset
    #[serde(default)]
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Load the built-in five-agent demo fleet into an empty registry
    pub demo_fleet: bool,
    /// TOML file with `[[agents]]` records, loaded instead of the demo fleet
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            demo_fleet: true,
            file: None,
        }
    }
}

fn unit_interval(name: &str, value: f64) -> TrustResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrustError::config(format!("{name} must lie in [0, 1], got {value}")))
    }
}

impl TrustConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> TrustResult<()> {
        let eval = &self.evaluation;
        eval.weights.validate().map_err(TrustError::config)?;
        eval.penalties.validate().map_err(TrustError::config)?;
        eval.threat_discounts.validate().map_err(TrustError::config)?;
        if eval.timeout_ms == 0 {
            return Err(TrustError::config("evaluation.timeout_ms must be positive"));
        }
        if eval.max_data_size == 0 {
            return Err(TrustError::config("evaluation.max_data_size must be positive"));
        }

        unit_interval("status.compromise_threshold", self.status.compromise_threshold)?;
        unit_interval("status.decline_drop", self.status.decline_drop)?;
        if self.status.decline_window < 2 {
            return Err(TrustError::config("status.decline_window must be at least 2"));
        }

        if let Some(endpoint) = &self.narrative.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(TrustError::config("narrative.endpoint must be an http(s) URL"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = TrustConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.evaluation.record_history);
        assert!(config.seed.demo_fleet);
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut config = TrustConfig::default();
        config.status.compromise_threshold = 1.5;
        assert!(matches!(config.validate(), Err(TrustError::Config { .. })));
    }

    #[test]
    fn bad_narrative_endpoint_rejected() {
        let mut config = TrustConfig::default();
        config.narrative.endpoint = Some("ftp://narrator".to_string());
        assert!(config.validate().is_err());
    }
}
