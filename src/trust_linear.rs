use serde::{Deserialize, Serialize};

use crate::agent::clamp_score;

/// Weights of the linear trust model, one per sub-signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    pub scope_conformance: f64,
    pub destination_trust: f64,
    pub anomaly_frequency: f64,
    pub historical_trend: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            scope_conformance: 0.35, // containment breaches weigh heaviest
            destination_trust: 0.2,
            anomaly_frequency: 0.3,
            historical_trend: 0.15,
        }
    }
}

impl TrustWeights {
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            self.scope_conformance,
            self.destination_trust,
            self.anomaly_frequency,
            self.historical_trend,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("trust weights must be finite and non-negative".to_string());
        }
        // history may be absent, so the activity signals alone must carry weight
        if all[..3].iter().sum::<f64>() <= 0.0 {
            return Err("activity signal weights must have a positive sum".to_string());
        }
        Ok(())
    }
}

/// Penalty constants for the count-based signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustPenalties {
    /// k in 1 / (1 + k * violations)
    pub scope_violation: f64,
    /// k in 1 / (1 + k * untrusted destinations)
    pub untrusted_destination: f64,
    /// Samples after which a history entry counts half as much
    pub history_half_life: f64,
}

impl Default for TrustPenalties {
    fn default() -> Self {
        Self {
            scope_violation: 0.5,
            untrusted_destination: 0.5,
            history_half_life: 5.0,
        }
    }
}

impl TrustPenalties {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.scope_violation > 0.0 && self.untrusted_destination > 0.0) {
            return Err("penalty constants must be positive".to_string());
        }
        if !(self.history_half_life > 0.0) {
            return Err("history_half_life must be positive".to_string());
        }
        Ok(())
    }
}

/// 1 / (1 + k * count)
pub fn penalty_signal(count: usize, k: f64) -> f64 {
    1.0 / (1.0 + k * count as f64)
}

/// Mean of `history` (oldest first) where each step back in time halves
/// the weight every `half_life` samples.
pub fn recency_weighted_mean(history: &[f64], half_life: f64) -> Option<f64> {
    if history.is_empty() {
        return None;
    }
    let newest = history.len() - 1;
    let (sum, total) = history
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, total), (i, score)| {
            let age = (newest - i) as f64;
            let w = 0.5f64.powf(age / half_life);
            (sum + w * clamp_score(*score), total + w)
        });
    Some(sum / total)
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Feature vector for trust evaluation, each in [0,1]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustFeatures {
    pub scope_conformance: f64,
    pub destination_trust: f64,
    pub anomaly_frequency: f64,
    /// None when no behavioral history is available
    pub historical_trend: Option<f64>,
}

impl TrustFeatures {
    fn weighted(&self, weights: &TrustWeights) -> Vec<(f64, f64)> {
        let mut pairs = vec![
            (self.scope_conformance, weights.scope_conformance),
            (self.destination_trust, weights.destination_trust),
            (self.anomaly_frequency, weights.anomaly_frequency),
        ];
        if let Some(trend) = self.historical_trend {
            pairs.push((trend, weights.historical_trend));
        }
        pairs
    }
}

/// Weighted-mean trust model. Missing signals drop out and the remaining
/// weights are renormalised.
#[derive(Debug, Clone)]
pub struct TrustLinearModel {
    weights: TrustWeights,
}

impl TrustLinearModel {
    pub fn new(weights: TrustWeights) -> Self {
        Self { weights }
    }

    pub fn new_default() -> Self {
        Self::new(TrustWeights::default())
    }

    /// Combines features, applies the threat discount, clamps to [0,1] and
    /// rounds to four decimals. Returns None if the weights cannot produce
    /// a finite score.
    pub fn evaluate(&self, features: &TrustFeatures, threat_discount: f64) -> Option<f64> {
        let pairs = features.weighted(&self.weights);
        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let mean = pairs.iter().map(|(f, w)| f * w).sum::<f64>() / total;
        let score = mean * (1.0 - threat_discount.clamp(0.0, 1.0));
        if !score.is_finite() {
            return None;
        }
        Some(round4(score.clamp(0.0, 1.0)))
    }
}

impl Default for TrustLinearModel {
    fn default() -> Self {
        Self::new_default()
    }
}
