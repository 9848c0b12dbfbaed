use sled::Db;

use crate::agent::Agent;
use crate::agent_store::AgentStore;
use crate::errors::{TrustError, TrustResult};

const AGENTS_TREE: &str = "agents";

/// A sled-backed implementation of AgentStore. Records are stored as JSON
/// under their id in the `agents` tree.
pub struct SledAgentStore {
    db: Db,
}

impl SledAgentStore {
    /// Opens (or creates) the sled database at `path`.
    pub fn new(path: &str) -> TrustResult<Self> {
        let db = sled::open(path).map_err(|e| TrustError::database(format!("open {path}"), e))?;
        tracing::debug!(path, "opened sled agent store");
        Ok(Self { db })
    }

    fn tree(&self) -> TrustResult<sled::Tree> {
        self.db
            .open_tree(AGENTS_TREE)
            .map_err(|e| TrustError::database("open agents tree", e))
    }

    fn serialize_agent(agent: &Agent) -> TrustResult<Vec<u8>> {
        serde_json::to_vec(agent).map_err(|e| TrustError::serialization("encode agent", e))
    }

    fn deserialize_agent(bytes: &[u8]) -> TrustResult<Agent> {
        serde_json::from_slice(bytes).map_err(|e| TrustError::serialization("decode agent", e))
    }
}

impl AgentStore for SledAgentStore {
    fn load(&self, id: &str) -> TrustResult<Option<Agent>> {
        match self.tree()?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize_agent(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, agent: &Agent) -> TrustResult<()> {
        let data = Self::serialize_agent(agent)?;
        let tree = self.tree()?;
        tree.insert(agent.id.as_bytes(), data)?;
        tree.flush()?;
        Ok(())
    }

    fn insert_if_absent(&self, agent: &Agent) -> TrustResult<bool> {
        let data = Self::serialize_agent(agent)?;
        let tree = self.tree()?;
        let swapped = tree.compare_and_swap(agent.id.as_bytes(), None as Option<&[u8]>, Some(data))?;
        if swapped.is_err() {
            return Ok(false);
        }
        tree.flush()?;
        Ok(true)
    }

    fn list(&self) -> TrustResult<Vec<Agent>> {
        // sled iterates keys in byte order, which matches id order
        self.tree()?
            .iter()
            .values()
            .map(|value| {
                let bytes = value?;
                Self::deserialize_agent(&bytes)
            })
            .collect()
    }
}
