use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::agent::Agent;
use crate::errors::{SafeReadLock, SafeWriteLock, TrustResult};

/// Narrow read/write interface over agent records.
///
/// Stores only persist whole records; lifecycle rules (immutable DIDs,
/// status transitions, serialized history appends) live in the registry.
pub trait AgentStore: Send + Sync {
    fn load(&self, id: &str) -> TrustResult<Option<Agent>>;

    fn save(&self, agent: &Agent) -> TrustResult<()>;

    /// Saves `agent` only if no record with its id exists. Returns false
    /// when the id was already taken. The check and write are atomic.
    fn insert_if_absent(&self, agent: &Agent) -> TrustResult<bool>;

    /// All records ordered by id
    fn list(&self) -> TrustResult<Vec<Agent>>;

    fn contains(&self, id: &str) -> TrustResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}

/// Process-local store used for tests, demos, and the `memory` backend
#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<BTreeMap<String, Agent>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for MemoryAgentStore {
    fn load(&self, id: &str) -> TrustResult<Option<Agent>> {
        Ok(self.agents.safe_read()?.get(id).cloned())
    }

    fn save(&self, agent: &Agent) -> TrustResult<()> {
        self.agents
            .safe_write()?
            .insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    fn insert_if_absent(&self, agent: &Agent) -> TrustResult<bool> {
        let mut agents = self.agents.safe_write()?;
        match agents.entry(agent.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(agent.clone());
                Ok(true)
            }
        }
    }

    fn list(&self) -> TrustResult<Vec<Agent>> {
        Ok(self.agents.safe_read()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Containment, RuntimeProfile};

    #[test]
    fn save_and_load_roundtrip() {
        let store = MemoryAgentStore::new();
        let agent = Agent::new(
            "agent-b",
            "B",
            "did:key:b",
            0.6,
            RuntimeProfile {
                containment: Containment::Low,
                permissions: 3,
            },
        );
        store.save(&agent).unwrap();

        assert!(store.contains("agent-b").unwrap());
        assert_eq!(store.load("agent-b").unwrap(), Some(agent));
        assert!(store.load("agent-x").unwrap().is_none());
    }

    #[test]
    fn insert_if_absent_keeps_first_record() {
        let store = MemoryAgentStore::new();
        let runtime = RuntimeProfile {
            containment: Containment::Low,
            permissions: 3,
        };
        let first = Agent::new("agent-c", "First", "did:key:c1", 0.6, runtime.clone());
        let second = Agent::new("agent-c", "Second", "did:key:c2", 0.6, runtime);

        assert!(store.insert_if_absent(&first).unwrap());
        assert!(!store.insert_if_absent(&second).unwrap());
        assert_eq!(store.load("agent-c").unwrap(), Some(first));
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = MemoryAgentStore::new();
        for id in ["c", "a", "b"] {
            let agent = Agent::new(
                id,
                id,
                format!("did:key:{id}"),
                0.5,
                RuntimeProfile {
                    containment: Containment::High,
                    permissions: 1,
                },
            );
            store.save(&agent).unwrap();
        }
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
