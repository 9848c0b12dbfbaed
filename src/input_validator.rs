//! Boundary validation for both service requests.
//!
//! Requests that fail here never reach the analyzer or the evaluator.
//! Lengths are counted in characters after trimming surrounding whitespace.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{TrustError, TrustResult};

lazy_static! {
    static ref AGENT_ID_PATTERN: Regex = Regex::new(r"^[^\x00-\x1f\x7f]{1,128}$").unwrap();
}

pub const MIN_CAUSAL_CHAIN_CHARS: usize = 50;
pub const MIN_ACTIVITY_CHARS: usize = 50;
pub const MIN_THREAT_LANDSCAPE_CHARS: usize = 20;

/// Input to the causal chain analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalChainRequest {
    pub causal_chain_data: String,
}

/// Input to the agent trust evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustEvaluationRequest {
    pub agent_id: String,
    pub agent_activity_data: String,
    pub threat_landscape_description: String,
}

pub struct InputValidator {
    max_data_size: usize,
}

impl InputValidator {
    pub fn new() -> Self {
        Self {
            max_data_size: 256 * 1024,
        }
    }

    pub fn with_max_data_size(max_data_size: usize) -> Self {
        Self { max_data_size }
    }

    pub fn validate_causal_chain(&self, req: &CausalChainRequest) -> TrustResult<()> {
        self.require_min_chars(
            "causalChainData",
            &req.causal_chain_data,
            MIN_CAUSAL_CHAIN_CHARS,
            "Please provide more detailed causal chain data for analysis.",
        )
    }

    pub fn validate_trust_evaluation(&self, req: &TrustEvaluationRequest) -> TrustResult<()> {
        let agent_id = req.agent_id.trim();
        if agent_id.is_empty() {
            return Err(TrustError::validation("agentId", "Agent ID is required."));
        }
        if !AGENT_ID_PATTERN.is_match(agent_id) {
            return Err(TrustError::validation(
                "agentId",
                "Agent ID must be at most 128 printable characters.",
            ));
        }
        self.require_min_chars(
            "agentActivityData",
            &req.agent_activity_data,
            MIN_ACTIVITY_CHARS,
            "Please provide more detailed activity data.",
        )?;
        self.require_min_chars(
            "threatLandscapeDescription",
            &req.threat_landscape_description,
            MIN_THREAT_LANDSCAPE_CHARS,
            "Please provide a threat landscape description.",
        )
    }

    fn require_min_chars(
        &self,
        field: &str,
        value: &str,
        min: usize,
        message: &str,
    ) -> TrustResult<()> {
        if value.len() > self.max_data_size {
            return Err(TrustError::validation(field, "Data too large"));
        }
        if value.trim().chars().count() < min {
            return Err(TrustError::validation(
                field,
                format!("{message} (minimum {min} characters)"),
            ));
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}
