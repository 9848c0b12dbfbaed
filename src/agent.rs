// Agent records: identity, runtime envelope, and behavioral history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::agent_status::AgentStatus;

/// Isolation level applied to an agent's runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Containment {
    Low,
    Medium,
    High,
}

impl FromStr for Containment {
    type Err = ();

    fn from_str(input: &str) -> Result<Containment, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "low" => Ok(Containment::Low),
            "medium" => Ok(Containment::Medium),
            "high" => Ok(Containment::High),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Containment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProfile {
    pub containment: Containment,
    pub permissions: u32,
}

/// One behavioral sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySample {
    pub date: DateTime<Utc>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub did: String,
    pub trust_score: f64,
    pub status: AgentStatus,
    #[serde(default)]
    pub behavioral_history: Vec<HistorySample>,
    pub runtime: RuntimeProfile,
    #[serde(default)]
    pub credentials: BTreeSet<String>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub archived: bool,
}

impl Agent {
    /// Fresh record for onboarding. New agents start Offline with no history.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        did: impl Into<String>,
        trust_score: f64,
        runtime: RuntimeProfile,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            did: did.into(),
            trust_score: clamp_score(trust_score),
            status: AgentStatus::Offline,
            behavioral_history: Vec::new(),
            runtime,
            credentials: BTreeSet::new(),
            revoked: false,
            archived: false,
        }
    }

    pub fn with_credentials<I, S>(mut self, credentials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credentials = credentials.into_iter().map(Into::into).collect();
        self
    }

    pub fn risk_band(&self) -> RiskBand {
        RiskBand::for_score(self.trust_score)
    }

    pub fn is_high_risk(&self) -> bool {
        self.trust_score < HIGH_RISK_BELOW
    }

    /// Appends a sample, keeping the history chronological.
    ///
    /// A sample dated before the last one is re-stamped to the last date.
    pub fn append_sample(&mut self, score: f64, at: DateTime<Utc>) -> &HistorySample {
        let date = match self.behavioral_history.last() {
            Some(last) if last.date > at => last.date,
            _ => at,
        };
        self.behavioral_history.push(HistorySample {
            date,
            score: clamp_score(score),
        });
        self.trust_score = clamp_score(score);
        // just pushed
        &self.behavioral_history[self.behavioral_history.len() - 1]
    }

    /// Clamps every score into [0, 1] and orders the history by date.
    pub fn normalize(&mut self) {
        self.trust_score = clamp_score(self.trust_score);
        for sample in &mut self.behavioral_history {
            sample.score = clamp_score(sample.score);
        }
        self.behavioral_history.sort_by_key(|s| s.date);
    }

    pub fn history_scores(&self) -> Vec<f64> {
        self.behavioral_history.iter().map(|s| s.score).collect()
    }
}

/// Dashboard threshold for "high risk" agents
pub const HIGH_RISK_BELOW: f64 = 0.5;

/// Dashboard colour bucketing of trust scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskBand {
    Trusted,
    Watch,
    HighRisk,
}

impl RiskBand {
    pub fn for_score(score: f64) -> Self {
        if score > 0.8 {
            RiskBand::Trusted
        } else if score > 0.5 {
            RiskBand::Watch
        } else {
            RiskBand::HighRisk
        }
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn runtime() -> RuntimeProfile {
        RuntimeProfile {
            containment: Containment::Medium,
            permissions: 10,
        }
    }

    #[test]
    fn containment_parses_case_insensitively() {
        assert_eq!(Containment::from_str("HIGH"), Ok(Containment::High));
        assert_eq!(Containment::from_str(" low "), Ok(Containment::Low));
        assert!(Containment::from_str("sandboxed").is_err());
    }

    #[test]
    fn scores_are_clamped() {
        let agent = Agent::new("a", "A", "did:key:a", 1.7, runtime());
        assert_eq!(agent.trust_score, 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
    }

    #[test]
    fn history_never_goes_backwards() {
        let mut agent = Agent::new("a", "A", "did:key:a", 0.9, runtime());
        let later = Utc.with_ymd_and_hms(2025, 7, 5, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();

        agent.append_sample(0.8, later);
        let sample = agent.append_sample(0.7, earlier).clone();

        assert_eq!(sample.date, later);
        assert_eq!(agent.trust_score, 0.7);
        assert_eq!(agent.history_scores(), vec![0.8, 0.7]);
    }

    #[test]
    fn normalize_clamps_and_sorts_history() {
        let mut agent = Agent::new("a", "A", "did:key:a", 0.5, runtime());
        agent.trust_score = 7.5;
        agent.behavioral_history = vec![
            HistorySample {
                date: Utc.with_ymd_and_hms(2025, 7, 3, 0, 0, 0).unwrap(),
                score: -1.0,
            },
            HistorySample {
                date: Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
                score: 3.0,
            },
        ];

        agent.normalize();
        assert_eq!(agent.trust_score, 1.0);
        assert_eq!(agent.history_scores(), vec![1.0, 0.0]);
    }

    #[test]
    fn risk_bands_follow_dashboard_colours() {
        assert_eq!(RiskBand::for_score(0.92), RiskBand::Trusted);
        assert_eq!(RiskBand::for_score(0.8), RiskBand::Watch);
        assert_eq!(RiskBand::for_score(0.65), RiskBand::Watch);
        assert_eq!(RiskBand::for_score(0.5), RiskBand::HighRisk);
    }

    #[test]
    fn camel_case_wire_shape() {
        let agent = Agent::new("agent-9", "Nine", "did:key:z9", 0.5, runtime())
            .with_credentials(["b_tag", "a_tag"]);
        let json = serde_json::to_value(&agent).unwrap();
        assert!(json.get("trustScore").is_some());
        assert!(json.get("behavioralHistory").is_some());
        assert_eq!(json["credentials"][0], "a_tag");
        assert_eq!(json["runtime"]["containment"], "Medium");
    }
}
