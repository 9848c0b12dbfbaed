// Demo fleet and TOML seed files used to populate a fresh registry

use chrono::{Duration, TimeZone, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::agent::{Agent, Containment, HistorySample, RuntimeProfile};
use crate::agent_status::AgentStatus;
use crate::errors::{TrustError, TrustResult};

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    agents: Vec<Agent>,
}

/// Reads agents from a TOML file with one `[[agents]]` table per record.
pub fn load_seed_file<P: AsRef<Path>>(path: P) -> TrustResult<Vec<Agent>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| TrustError::io(format!("read seed file {}", path.display()), e))?;
    let seed: SeedFile = toml::from_str(&content)
        .map_err(|e| TrustError::config(format!("invalid seed file {}: {e}", path.display())))?;
    Ok(seed.agents)
}

fn history(scores: &[f64]) -> Vec<HistorySample> {
    let Some(start) = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).single() else {
        return Vec::new();
    };
    scores
        .iter()
        .enumerate()
        .map(|(day, score)| HistorySample {
            date: start + Duration::days(day as i64),
            score: *score,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn fixture(
    id: &str,
    name: &str,
    did: &str,
    status: AgentStatus,
    scores: &[f64],
    containment: Containment,
    permissions: u32,
    credentials: &[&str],
) -> Agent {
    let mut agent = Agent::new(
        id,
        name,
        did,
        scores.last().copied().unwrap_or_default(),
        RuntimeProfile {
            containment,
            permissions,
        },
    )
    .with_credentials(credentials.iter().copied());
    agent.status = status;
    agent.behavioral_history = history(scores);
    agent
}

/// The five-agent fleet the dashboard ships with.
pub fn demo_fleet() -> Vec<Agent> {
    vec![
        fixture(
            "agent-001",
            "DocuTranslate-v2",
            "did:key:z6Mkk7yB2AnfP3se4tA1g4g1p2qj5k9c8d7e6f4a3b2c1d0e",
            AgentStatus::Online,
            &[0.95, 0.94, 0.93, 0.94, 0.92],
            Containment::Low,
            120,
            &["data_processing_certified", "hipaa_compliant", "acme_corp_authorized"],
        ),
        fixture(
            "agent-002",
            "MarketAnalyzer-alpha",
            "did:key:z6Mkt...fgh",
            AgentStatus::Online,
            &[0.70, 0.68, 0.65, 0.66, 0.65],
            Containment::Medium,
            45,
            &["read_market_data", "experimental_agent"],
        ),
        fixture(
            "agent-003",
            "SocialBot-v1.3",
            "did:key:z6Mku...ijk",
            AgentStatus::Compromised,
            &[0.80, 0.75, 0.50, 0.35, 0.21],
            Containment::High,
            5,
            &["post_to_social_media"],
        ),
        fixture(
            "agent-004",
            "CodeRepoScanner",
            "did:key:z6Mkv...lmn",
            AgentStatus::Online,
            &[0.85, 0.86, 0.88, 0.87, 0.88],
            Containment::Low,
            75,
            &["read_code_repository", "security_scanner_certified"],
        ),
        fixture(
            "agent-005",
            "Legacy-Gateway",
            "did:key:z6Mkw...opq",
            AgentStatus::Offline,
            &[0.50, 0.48, 0.47, 0.46, 0.45],
            Containment::High,
            20,
            &["legacy_system_access"],
        ),
    ]
}
