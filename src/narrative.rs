//! Narrative text for analysis results and trust justifications.
//!
//! The template narrator returns the engine's own text. A remote narrator
//! may rephrase it through an HTTP backend. Only prose passes through the
//! narrator; anomalies, measures and scores never do.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{TrustError, TrustResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKind {
    CausalChain,
    TrustEvaluation,
}

#[derive(Debug, Serialize)]
struct NarrateRequest<'a> {
    kind: NarrativeKind,
    draft: &'a str,
}

#[derive(Debug, Deserialize)]
struct NarrateResponse {
    #[serde(default)]
    narrative: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteNarrator {
    http: Client,
    endpoint: String,
}

impl RemoteNarrator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> TrustResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrustError::config(format!("narrative client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    async fn narrate(&self, kind: NarrativeKind, draft: &str) -> TrustResult<String> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&NarrateRequest { kind, draft })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "narrative backend unreachable");
                TrustError::evaluation_retryable("narrative backend unavailable")
            })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(TrustError::evaluation_retryable(format!(
                "narrative backend returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(TrustError::evaluation_fatal(format!(
                "narrative backend rejected request with {status}"
            )));
        }

        let body: NarrateResponse = resp
            .json()
            .await
            .map_err(|_| TrustError::evaluation_fatal("narrative backend returned malformed JSON"))?;
        match body.narrative.map(|n| n.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(TrustError::evaluation_fatal("narrative backend returned an empty narrative")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Narrator {
    #[default]
    Template,
    Remote(RemoteNarrator),
}

impl Narrator {
    pub fn remote(endpoint: impl Into<String>, timeout: Duration) -> TrustResult<Self> {
        Ok(Narrator::Remote(RemoteNarrator::new(endpoint, timeout)?))
    }

    /// Produces the final prose for `draft`.
    pub async fn narrate(&self, kind: NarrativeKind, draft: &str) -> TrustResult<String> {
        match self {
            Narrator::Template => Ok(draft.to_string()),
            Narrator::Remote(remote) => remote.narrate(kind, draft).await,
        }
    }
}
