//! Deterministic agent trust evaluation.
//!
//! The score is a weighted mean of four sub-signals discounted by the threat
//! landscape. The justification is rendered from a template; nothing here
//! reads clocks or randomness, so identical inputs give identical output.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::activity_log::{ActivityLog, ActivityRecord};
use crate::agent::{Agent, Containment, RiskBand};
use crate::errors::{TrustError, TrustResult};
use crate::injection_patterns;
use crate::scope_policy::{DestinationAllowlist, ScopePolicy, ScopeViolation};
use crate::threat_landscape::{self, ThreatAssessment, ThreatDiscounts};
use crate::trust_linear::{penalty_signal, recency_weighted_mean, TrustFeatures, TrustLinearModel, TrustPenalties, TrustWeights};

/// Permission count assumed for agents the registry does not know
const UNKNOWN_AGENT_PERMISSIONS: u32 = 1;

/// Output contract of the evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEvaluation {
    pub trust_score: f64,
    pub justification: String,
}

/// Everything the evaluator needs besides the request itself
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub weights: TrustWeights,
    pub penalties: TrustPenalties,
    pub threat_discounts: ThreatDiscounts,
    pub allowlist: DestinationAllowlist,
    pub default_containment: Containment,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            weights: TrustWeights::default(),
            penalties: TrustPenalties::default(),
            threat_discounts: ThreatDiscounts::default(),
            allowlist: DestinationAllowlist::default(),
            default_containment: Containment::Medium,
        }
    }
}

/// Intermediate findings, kept for the justification and for callers that
/// want the numbers
#[derive(Debug, Clone)]
pub struct TrustBreakdown {
    pub features: TrustFeatures,
    pub threat: ThreatAssessment,
    pub threat_discount: f64,
    pub records: usize,
    pub violations: Vec<ScopeViolation>,
    pub untrusted_destinations: Vec<String>,
    pub destinations: usize,
    pub flagged: usize,
    pub span_hours: Option<f64>,
    pub history_samples: usize,
}

pub struct TrustEvaluator {
    model: TrustLinearModel,
    settings: EvaluatorSettings,
}

fn is_flagged(record: &ActivityRecord, violation: bool, allowlist: &DestinationAllowlist) -> bool {
    violation
        || record.status.is_failure()
        || record
            .resource
            .as_deref()
            .map(|r| !allowlist.is_trusted(r))
            .unwrap_or(false)
        || injection_patterns::contains_instruction(&record.raw)
}

impl TrustEvaluator {
    pub fn new(settings: EvaluatorSettings) -> Self {
        Self {
            model: TrustLinearModel::new(settings.weights.clone()),
            settings,
        }
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    /// Computes the sub-signals for an activity log and threat description.
    pub fn assess(&self, agent: Option<&Agent>, activity: &str, threat_description: &str) -> TrustBreakdown {
        let log = ActivityLog::parse(activity);
        let policy = match agent {
            Some(agent) => ScopePolicy::for_runtime(&agent.runtime),
            None => ScopePolicy::new(self.settings.default_containment, UNKNOWN_AGENT_PERMISSIONS),
        };
        let allowlist = &self.settings.allowlist;
        let penalties = &self.settings.penalties;

        let mut violations = Vec::new();
        let mut flagged = 0;
        for record in &log.records {
            let violation = policy.violation(record);
            if is_flagged(record, violation.is_some(), allowlist) {
                flagged += 1;
            }
            violations.extend(violation);
        }

        let untrusted: Vec<String> = allowlist
            .untrusted(&log.records)
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut destinations: Vec<&str> = log.records.iter().filter_map(|r| r.resource.as_deref()).collect();
        destinations.sort_unstable();
        destinations.dedup();

        let history = agent.map(|a| a.history_scores()).unwrap_or_default();
        let anomaly_frequency = if log.is_empty() {
            1.0
        } else {
            1.0 - flagged as f64 / log.len() as f64
        };

        let features = TrustFeatures {
            scope_conformance: penalty_signal(violations.len(), penalties.scope_violation),
            destination_trust: penalty_signal(untrusted.len(), penalties.untrusted_destination),
            anomaly_frequency,
            historical_trend: recency_weighted_mean(&history, penalties.history_half_life),
        };

        let threat = threat_landscape::assess(threat_description);
        let threat_discount = self.settings.threat_discounts.for_level(threat.level);

        TrustBreakdown {
            features,
            threat,
            threat_discount,
            records: log.len(),
            violations,
            untrusted_destinations: untrusted,
            destinations: destinations.len(),
            flagged,
            span_hours: log.span_hours(),
            history_samples: history.len(),
        }
    }

    /// Scores an agent. `agent` is None when the id is not registered; the
    /// evaluation still succeeds and says so.
    pub fn evaluate(
        &self,
        agent_id: &str,
        agent: Option<&Agent>,
        activity: &str,
        threat_description: &str,
    ) -> TrustResult<TrustEvaluation> {
        let breakdown = self.assess(agent, activity, threat_description);
        let trust_score = self
            .model
            .evaluate(&breakdown.features, breakdown.threat_discount)
            .ok_or_else(|| TrustError::evaluation_fatal("trust model produced no finite score"))?;

        let justification = self.justify(agent_id, agent, &breakdown, trust_score);
        tracing::debug!(
            agent_id,
            known = agent.is_some(),
            trust_score,
            violations = breakdown.violations.len(),
            threat = %breakdown.threat.level,
            "trust evaluated"
        );
        Ok(TrustEvaluation {
            trust_score,
            justification,
        })
    }

    fn justify(&self, agent_id: &str, agent: Option<&Agent>, b: &TrustBreakdown, score: f64) -> String {
        let mut out = String::new();
        let containment = match agent {
            Some(agent) => {
                let _ = write!(
                    out,
                    "Agent '{}' ({}) runs under {} containment with {} permissions.",
                    agent_id, agent.name, agent.runtime.containment, agent.runtime.permissions
                );
                agent.runtime.containment
            }
            None => {
                let _ = write!(
                    out,
                    "Agent '{}' is not registered, so its identity is unknown. The default {} containment was assumed and no behavioral history was available.",
                    agent_id, self.settings.default_containment
                );
                self.settings.default_containment
            }
        };

        let _ = write!(out, " Analyzed {} activity record{}", b.records, if b.records == 1 { "" } else { "s" });
        match b.span_hours {
            Some(span) if span > 0.0 => {
                let _ = write!(out, " spanning {span:.2} hours.");
            }
            _ => out.push('.'),
        }

        if b.violations.is_empty() {
            let _ = write!(
                out,
                " Scope conformance {:.2}: no actions outside the {} containment scope.",
                b.features.scope_conformance, containment
            );
        } else {
            let listed: Vec<String> = b.violations.iter().map(|v| v.to_string()).collect();
            let _ = write!(
                out,
                " Scope conformance {:.2}: {} violation{} ({}).",
                b.features.scope_conformance,
                b.violations.len(),
                if b.violations.len() == 1 { "" } else { "s" },
                listed.join("; ")
            );
        }

        if b.untrusted_destinations.is_empty() {
            let _ = write!(
                out,
                " Destination trust {:.2}: all {} distinct resources match the allowlist.",
                b.features.destination_trust, b.destinations
            );
        } else {
            let _ = write!(
                out,
                " Destination trust {:.2}: {} of {} distinct resources are not allowlisted ({}).",
                b.features.destination_trust,
                b.untrusted_destinations.len(),
                b.destinations,
                b.untrusted_destinations.join(", ")
            );
        }

        let _ = write!(
            out,
            " Anomaly frequency {:.2}: {} of {} records flagged",
            b.features.anomaly_frequency, b.flagged, b.records
        );
        match b.span_hours {
            Some(span) if span > 0.0 => {
                let _ = write!(out, " ({:.1} per hour).", b.flagged as f64 / span);
            }
            _ => out.push('.'),
        }

        match b.features.historical_trend {
            Some(trend) => {
                let _ = write!(
                    out,
                    " Historical trend {:.2} over {} samples.",
                    trend, b.history_samples
                );
            }
            None => out.push_str(" Historical trend omitted: no behavioral history."),
        }

        if b.threat.matched.is_empty() {
            let _ = write!(out, " Threat landscape {} applies no discount.", b.threat.level);
        } else {
            let _ = write!(
                out,
                " Threat landscape {} (matched: {}) applies a {:.0}% discount.",
                b.threat.level,
                b.threat.matched.join(", "),
                b.threat_discount * 100.0
            );
        }

        let band = match RiskBand::for_score(score) {
            RiskBand::Trusted => "trusted",
            RiskBand::Watch => "watch",
            RiskBand::HighRisk => "high risk",
        };
        let _ = write!(out, " Final trust score {score:.4} ({band}).");
        out
    }
}

impl Default for TrustEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorSettings::default())
    }
}
