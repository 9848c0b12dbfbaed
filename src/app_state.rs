use std::sync::Arc;

use crate::agent_registry::AgentRegistry;
use crate::agent_status::StatusMachine;
use crate::agent_store::{AgentStore, MemoryAgentStore};
use crate::agent_store_sled::SledAgentStore;
use crate::audit::AuditLog;
use crate::config::{StoreBackend, TrustConfig};
use crate::errors::TrustResult;
use crate::fixtures::{demo_fleet, load_seed_file};
use crate::input_validator::InputValidator;
use crate::narrative::Narrator;
use crate::trust_evaluator::TrustEvaluator;
use crate::trust_service::TrustService;

/// Shared state handed to every HTTP handler and CLI command.
pub struct AppState {
    pub config: TrustConfig,
    pub service: Arc<TrustService>,
}

impl AppState {
    pub fn new(config: TrustConfig, service: Arc<TrustService>) -> Self {
        Self { config, service }
    }

    /// Wires store, registry, narrator and audit log from `config`, then
    /// seeds the registry.
    pub fn from_config(config: TrustConfig) -> TrustResult<Self> {
        let store: Arc<dyn AgentStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryAgentStore::new()),
            StoreBackend::Sled => {
                let path = config.store.path.to_string_lossy();
                Arc::new(SledAgentStore::new(&path)?)
            }
        };
        let registry = Arc::new(AgentRegistry::new(
            store,
            StatusMachine::new(config.status.clone()),
        ));
        seed_registry(&registry, &config)?;

        let narrator = match &config.narrative.endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "using remote narrator");
                Narrator::remote(
                    endpoint.clone(),
                    std::time::Duration::from_millis(config.narrative.timeout_ms),
                )?
            }
            None => Narrator::Template,
        };

        let audit = match &config.audit.path {
            Some(path) => Arc::new(AuditLog::to_file(path)?),
            None => Arc::new(AuditLog::disabled()),
        };

        let eval = &config.evaluation;
        let service = TrustService::new(
            InputValidator::with_max_data_size(eval.max_data_size),
            TrustEvaluator::new(eval.evaluator_settings()),
            registry,
            narrator,
            audit,
            eval.timeout(),
            eval.record_history,
        );
        Ok(Self::new(config, Arc::new(service)))
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.service.registry()
    }
}

fn seed_registry(registry: &AgentRegistry, config: &TrustConfig) -> TrustResult<()> {
    let mut count = 0;
    if let Some(file) = &config.seed.file {
        for agent in load_seed_file(file)? {
            if registry.import(agent)? {
                count += 1;
            }
        }
    } else if config.seed.demo_fleet {
        for agent in demo_fleet() {
            registry.seed(agent)?;
            count += 1;
        }
    }
    if count > 0 {
        tracing::info!(count, "registry seeded");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_seeds_demo_fleet() {
        let state = AppState::from_config(TrustConfig::default()).unwrap();
        assert_eq!(state.registry().list(false).unwrap().len(), 5);
        assert!(state.config.audit.path.is_none());
    }

    #[test]
    fn empty_registry_without_seed() {
        let mut config = TrustConfig::default();
        config.seed.demo_fleet = false;
        let state = AppState::from_config(config).unwrap();
        assert!(state.registry().list(true).unwrap().is_empty());
    }

    #[test]
    fn sled_backend_persists_between_states() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrustConfig::default();
        config.store.backend = StoreBackend::Sled;
        config.store.path = dir.path().join("agents");

        {
            let state = AppState::from_config(config.clone()).unwrap();
            assert_eq!(state.registry().list(false).unwrap().len(), 5);
        }
        config.seed.demo_fleet = false;
        let state = AppState::from_config(config).unwrap();
        assert_eq!(state.registry().list(false).unwrap().len(), 5);
    }
}
