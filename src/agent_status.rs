//! Agent status state machine
//!
//! Status is never set directly. It moves in response to events:
//!
//! | from        | event                       | to          |
//! |-------------|-----------------------------|-------------|
//! | any         | `ScoreObserved` below floor | Compromised |
//! | any         | `ScoreObserved` collapse    | Compromised |
//! | any         | `Revoked`                   | Compromised |
//! | Offline     | `Heartbeat` (not revoked)   | Online      |
//! | Online      | `Disconnected`              | Offline     |
//! | Compromised | `Reinstated` (score ok)     | Offline     |
//!
//! Compromised is sticky: heartbeats and healthy scores do not clear it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{TrustError, TrustResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    Online,
    Offline,
    Compromised,
}

impl FromStr for AgentStatus {
    type Err = ();

    fn from_str(input: &str) -> Result<AgentStatus, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "online" => Ok(AgentStatus::Online),
            "offline" => Ok(AgentStatus::Offline),
            "compromised" => Ok(AgentStatus::Compromised),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Thresholds driving status transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusThresholds {
    /// Any observed score below this marks the agent compromised
    pub compromise_threshold: f64,
    /// Number of trailing samples inspected for a sustained decline
    pub decline_window: usize,
    /// Minimum total drop across the window to count as a collapse
    pub decline_drop: f64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            compromise_threshold: 0.30,
            decline_window: 3,
            decline_drop: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StatusEvent<'a> {
    /// A new score was recorded; `history` includes it as the last sample
    ScoreObserved { score: f64, history: &'a [f64] },
    Heartbeat { revoked: bool },
    Disconnected,
    Revoked,
    Reinstated { score: f64 },
}

impl StatusEvent<'_> {
    fn name(&self) -> &'static str {
        match self {
            StatusEvent::ScoreObserved { .. } => "score_observed",
            StatusEvent::Heartbeat { .. } => "heartbeat",
            StatusEvent::Disconnected => "disconnected",
            StatusEvent::Revoked => "revoked",
            StatusEvent::Reinstated { .. } => "reinstated",
        }
    }
}

pub struct StatusMachine {
    thresholds: StatusThresholds,
}

impl StatusMachine {
    pub fn new(thresholds: StatusThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StatusThresholds {
        &self.thresholds
    }

    /// Returns the next status, or an error for transitions that are refused.
    pub fn transition(&self, from: AgentStatus, event: &StatusEvent<'_>) -> TrustResult<AgentStatus> {
        let next = match (from, event) {
            (_, StatusEvent::Revoked) => AgentStatus::Compromised,
            (_, StatusEvent::ScoreObserved { score, history }) => {
                if self.is_compromised(*score, history) {
                    AgentStatus::Compromised
                } else {
                    from
                }
            }
            (AgentStatus::Compromised, StatusEvent::Reinstated { score }) => {
                if *score < self.thresholds.compromise_threshold {
                    return Err(TrustError::invalid_transition(
                        from.to_string(),
                        format!("reinstated with score {score:.2} below threshold"),
                    ));
                }
                AgentStatus::Offline
            }
            (AgentStatus::Compromised, StatusEvent::Heartbeat { .. }) => AgentStatus::Compromised,
            (AgentStatus::Compromised, StatusEvent::Disconnected) => AgentStatus::Compromised,
            (_, StatusEvent::Heartbeat { revoked: true }) => {
                return Err(TrustError::invalid_transition(from.to_string(), "heartbeat while revoked"));
            }
            (_, StatusEvent::Heartbeat { revoked: false }) => AgentStatus::Online,
            (_, StatusEvent::Disconnected) => AgentStatus::Offline,
            (_, StatusEvent::Reinstated { .. }) => {
                return Err(TrustError::invalid_transition(from.to_string(), event.name()));
            }
        };

        if next != from {
            tracing::info!(from = %from, to = %next, event = event.name(), "agent status transition");
        }
        Ok(next)
    }

    fn is_compromised(&self, score: f64, history: &[f64]) -> bool {
        score < self.thresholds.compromise_threshold || self.is_sustained_decline(history)
    }

    /// Strictly decreasing trailing window with a large enough total drop
    pub fn is_sustained_decline(&self, history: &[f64]) -> bool {
        let window = self.thresholds.decline_window.max(2);
        if history.len() < window {
            return false;
        }
        let tail = &history[history.len() - window..];
        let strictly_decreasing = tail.windows(2).all(|w| w[1] < w[0]);
        let drop = tail[0] - tail[window - 1];
        strictly_decreasing && drop >= self.thresholds.decline_drop
    }
}

impl Default for StatusMachine {
    fn default() -> Self {
        Self::new(StatusThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> StatusMachine {
        StatusMachine::default()
    }

    #[test]
    fn low_score_compromises_any_state() {
        let m = machine();
        let history = [0.9, 0.25];
        let event = StatusEvent::ScoreObserved { score: 0.25, history: &history };
        assert_eq!(m.transition(AgentStatus::Online, &event).unwrap(), AgentStatus::Compromised);
        assert_eq!(m.transition(AgentStatus::Offline, &event).unwrap(), AgentStatus::Compromised);
    }

    #[test]
    fn sustained_collapse_compromises() {
        // SocialBot-style collapse: 0.80 -> 0.21
        let m = machine();
        let history = [0.80, 0.75, 0.50, 0.35, 0.31];
        let event = StatusEvent::ScoreObserved { score: 0.31, history: &history };
        assert_eq!(m.transition(AgentStatus::Online, &event).unwrap(), AgentStatus::Compromised);
    }

    #[test]
    fn mild_drift_does_not_compromise() {
        let m = machine();
        let history = [0.70, 0.68, 0.65, 0.66, 0.65];
        let event = StatusEvent::ScoreObserved { score: 0.65, history: &history };
        assert_eq!(m.transition(AgentStatus::Online, &event).unwrap(), AgentStatus::Online);

        let slow = [0.50, 0.48, 0.47];
        assert!(!m.is_sustained_decline(&slow));
    }

    #[test]
    fn score_never_brings_offline_agent_online() {
        let m = machine();
        let history = [0.95];
        let event = StatusEvent::ScoreObserved { score: 0.95, history: &history };
        assert_eq!(m.transition(AgentStatus::Offline, &event).unwrap(), AgentStatus::Offline);
    }

    #[test]
    fn compromised_is_sticky_until_reinstated() {
        let m = machine();
        let from = AgentStatus::Compromised;
        assert_eq!(
            m.transition(from, &StatusEvent::Heartbeat { revoked: false }).unwrap(),
            AgentStatus::Compromised
        );
        let history = [0.99];
        let healthy = StatusEvent::ScoreObserved { score: 0.99, history: &history };
        assert_eq!(m.transition(from, &healthy).unwrap(), AgentStatus::Compromised);
        assert_eq!(
            m.transition(from, &StatusEvent::Reinstated { score: 0.7 }).unwrap(),
            AgentStatus::Offline
        );
    }

    #[test]
    fn reinstatement_refused_below_threshold() {
        let m = machine();
        let result = m.transition(AgentStatus::Compromised, &StatusEvent::Reinstated { score: 0.1 });
        assert!(matches!(result, Err(TrustError::InvalidTransition { .. })));
    }

    #[test]
    fn revoked_agents_cannot_come_online() {
        let m = machine();
        let result = m.transition(AgentStatus::Offline, &StatusEvent::Heartbeat { revoked: true });
        assert!(result.is_err());
    }

    #[test]
    fn heartbeat_and_disconnect_toggle_connectivity() {
        let m = machine();
        assert_eq!(
            m.transition(AgentStatus::Offline, &StatusEvent::Heartbeat { revoked: false }).unwrap(),
            AgentStatus::Online
        );
        assert_eq!(
            m.transition(AgentStatus::Online, &StatusEvent::Disconnected).unwrap(),
            AgentStatus::Offline
        );
    }
}
