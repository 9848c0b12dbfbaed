//! Process-wide agent registry.
//!
//! Wraps an [`AgentStore`] and owns the lifecycle rules: onboarding,
//! immutable DIDs, status transitions, and history appends. Appends to a
//! single agent's history are serialized through a per-agent async lock;
//! different agents never contend.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

use crate::agent::{Agent, HistorySample};
use crate::agent_status::{AgentStatus, StatusEvent, StatusMachine};
use crate::agent_store::AgentStore;
use crate::errors::{SafeLock, TrustError, TrustResult};

/// Dashboard tiles for the whole fleet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub total_agents: usize,
    pub high_risk_agents: usize,
    /// Mean trust in percent, rounded to a whole number
    pub average_trust: u32,
    pub online: usize,
    pub offline: usize,
    pub compromised: usize,
}

pub struct AgentRegistry {
    store: Arc<dyn AgentStore>,
    status_machine: StatusMachine,
    append_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn AgentStore>, status_machine: StatusMachine) -> Self {
        Self {
            store,
            status_machine,
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn onboard(&self, mut agent: Agent) -> TrustResult<Agent> {
        validate_identity(&agent)?;
        agent.normalize();
        // Status is derived, never accepted from the caller.
        agent.revoked = false;
        agent.archived = false;
        agent.status = self.derived_status(&agent, AgentStatus::Offline)?;

        if !self.store.insert_if_absent(&agent)? {
            return Err(TrustError::conflict(format!(
                "Agent '{}' is already registered",
                agent.id
            )));
        }
        tracing::info!(agent_id = %agent.id, status = %agent.status, "agent onboarded");
        Ok(agent)
    }

    /// Loads a record from a seed file. Scores are clamped, the history is
    /// ordered, and status is re-derived; only connectivity is taken from
    /// the file. Returns false if the id is already present.
    pub fn import(&self, mut agent: Agent) -> TrustResult<bool> {
        validate_identity(&agent)?;
        agent.normalize();
        agent.revoked = false;
        agent.archived = false;
        let connectivity = match agent.status {
            AgentStatus::Online => AgentStatus::Online,
            _ => AgentStatus::Offline,
        };
        agent.status = self.derived_status(&agent, connectivity)?;

        let inserted = self.store.insert_if_absent(&agent)?;
        if !inserted {
            tracing::debug!(agent_id = %agent.id, "import skipped, agent already present");
        }
        Ok(inserted)
    }

    /// Loads a fixture record verbatim, trusting its recorded status.
    pub fn seed(&self, agent: Agent) -> TrustResult<()> {
        if !self.store.insert_if_absent(&agent)? {
            tracing::debug!(agent_id = %agent.id, "seed skipped, agent already present");
        }
        Ok(())
    }

    fn derived_status(&self, agent: &Agent, from: AgentStatus) -> TrustResult<AgentStatus> {
        let scores = agent.history_scores();
        if scores.is_empty() {
            return Ok(from);
        }
        self.status_machine.transition(
            from,
            &StatusEvent::ScoreObserved {
                score: agent.trust_score,
                history: &scores,
            },
        )
    }

    pub fn get(&self, id: &str) -> TrustResult<Option<Agent>> {
        self.store.load(id)
    }

    pub fn require(&self, id: &str) -> TrustResult<Agent> {
        self.store
            .load(id)?
            .ok_or_else(|| TrustError::agent_not_found(id))
    }

    pub fn list(&self, include_archived: bool) -> TrustResult<Vec<Agent>> {
        let agents = self.store.list()?;
        Ok(agents
            .into_iter()
            .filter(|a| include_archived || !a.archived)
            .collect())
    }

    fn append_lock(&self, id: &str) -> TrustResult<Arc<AsyncMutex<()>>> {
        let mut locks = self.append_locks.safe_lock()?;
        Ok(locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Drops the map entry once no other task holds or awaits the lock.
    fn release_lock(&self, id: &str, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        match self.append_locks.safe_lock() {
            Ok(mut locks) => {
                if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
                    locks.remove(id);
                }
            }
            Err(e) => tracing::error!(agent_id = id, error = %e, "could not release append lock"),
        }
    }

    /// Runs `op` while holding the agent's lock. Unknown ids are rejected
    /// before a lock entry is created.
    async fn with_agent_lock<T, F>(&self, id: &str, op: F) -> TrustResult<T>
    where
        F: FnOnce() -> TrustResult<T>,
    {
        if !self.store.contains(id)? {
            return Err(TrustError::agent_not_found(id));
        }
        let lock = self.append_lock(id)?;
        let result = {
            let _guard = lock.lock().await;
            op()
        };
        self.release_lock(id, lock);
        result
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.append_locks.safe_lock().map(|l| l.len()).unwrap_or_default()
    }

    /// Persists an evaluation as a new history sample and re-derives status.
    pub async fn record_evaluation(
        &self,
        id: &str,
        score: f64,
        at: DateTime<Utc>,
    ) -> TrustResult<HistorySample> {
        self.with_agent_lock(id, || {
            let mut agent = self.require(id)?;
            if agent.archived {
                return Err(TrustError::conflict(format!("Agent '{id}' is archived")));
            }
            let sample = agent.append_sample(score, at).clone();
            let scores = agent.history_scores();
            agent.status = self.status_machine.transition(
                agent.status,
                &StatusEvent::ScoreObserved {
                    score: agent.trust_score,
                    history: &scores,
                },
            )?;
            self.store.save(&agent)?;

            tracing::debug!(
                agent_id = id,
                score = sample.score,
                samples = scores.len(),
                status = %agent.status,
                "evaluation recorded"
            );
            Ok(sample)
        })
        .await
    }

    pub async fn revoke(&self, id: &str, reason: &str) -> TrustResult<Agent> {
        self.update(id, |machine, agent| {
            agent.status = machine.transition(agent.status, &StatusEvent::Revoked)?;
            agent.revoked = true;
            tracing::warn!(agent_id = %agent.id, reason, "agent revoked");
            Ok(())
        })
        .await
    }

    pub async fn reinstate(&self, id: &str) -> TrustResult<Agent> {
        self.update(id, |machine, agent| {
            agent.status = machine.transition(
                agent.status,
                &StatusEvent::Reinstated {
                    score: agent.trust_score,
                },
            )?;
            agent.revoked = false;
            Ok(())
        })
        .await
    }

    pub async fn set_connectivity(&self, id: &str, online: bool) -> TrustResult<Agent> {
        self.update(id, |machine, agent| {
            if agent.archived {
                return Err(TrustError::conflict(format!("Agent '{}' is archived", agent.id)));
            }
            let event = if online {
                StatusEvent::Heartbeat {
                    revoked: agent.revoked,
                }
            } else {
                StatusEvent::Disconnected
            };
            agent.status = machine.transition(agent.status, &event)?;
            Ok(())
        })
        .await
    }

    /// Decommissions an agent. The record is kept and hidden from listings.
    pub async fn archive(&self, id: &str) -> TrustResult<Agent> {
        self.update(id, |machine, agent| {
            if agent.status == AgentStatus::Online {
                agent.status = machine.transition(agent.status, &StatusEvent::Disconnected)?;
            }
            agent.archived = true;
            Ok(())
        })
        .await
    }

    /// Rewrites identity fields. The DID is immutable once assigned.
    pub async fn rename(&self, id: &str, name: &str, did: &str) -> TrustResult<Agent> {
        self.update(id, |_, agent| {
            if agent.did != did {
                return Err(TrustError::validation("did", "DID is immutable once assigned"));
            }
            agent.name = name.to_string();
            Ok(())
        })
        .await
    }

    async fn update<F>(&self, id: &str, apply: F) -> TrustResult<Agent>
    where
        F: FnOnce(&StatusMachine, &mut Agent) -> TrustResult<()>,
    {
        self.with_agent_lock(id, || {
            let mut agent = self.require(id)?;
            apply(&self.status_machine, &mut agent)?;
            self.store.save(&agent)?;
            Ok(agent)
        })
        .await
    }

    pub fn summary(&self) -> TrustResult<FleetSummary> {
        let agents = self.list(false)?;
        let total_agents = agents.len();
        let average_trust = if total_agents == 0 {
            0
        } else {
            let mean = agents.iter().map(|a| a.trust_score).sum::<f64>() / total_agents as f64;
            (mean * 100.0).round() as u32
        };
        let count = |status: AgentStatus| agents.iter().filter(|a| a.status == status).count();

        Ok(FleetSummary {
            total_agents,
            high_risk_agents: agents.iter().filter(|a| a.is_high_risk()).count(),
            average_trust,
            online: count(AgentStatus::Online),
            offline: count(AgentStatus::Offline),
            compromised: count(AgentStatus::Compromised),
        })
    }
}

fn validate_identity(agent: &Agent) -> TrustResult<()> {
    if agent.id.trim().is_empty() {
        return Err(TrustError::validation("id", "agent id cannot be empty"));
    }
    if agent.did.trim().is_empty() {
        return Err(TrustError::validation("did", "agent DID cannot be empty"));
    }
    Ok(())
}
