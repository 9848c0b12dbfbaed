//! Request handling shared by the HTTP router and the CLI.
//!
//! Requests are validated first; invalid ones never reach an engine. The
//! engines run on the blocking pool under a timeout, so dropping a request
//! releases the caller at once.

use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::Agent;
use crate::agent_registry::{AgentRegistry, FleetSummary};
use crate::audit::{AuditEvent, AuditLog, LogLevel};
use crate::chain_analyzer::{AnalysisResult, CausalChainAnalyzer};
use crate::errors::{TrustError, TrustResult};
use crate::input_validator::{CausalChainRequest, InputValidator, TrustEvaluationRequest};
use crate::narrative::{NarrativeKind, Narrator};
use crate::trust_evaluator::{TrustEvaluation, TrustEvaluator};

pub struct TrustService {
    validator: InputValidator,
    analyzer: CausalChainAnalyzer,
    evaluator: Arc<TrustEvaluator>,
    registry: Arc<AgentRegistry>,
    narrator: Narrator,
    audit: Arc<AuditLog>,
    timeout: Duration,
    record_history: bool,
    engine_invocations: AtomicUsize,
}

impl TrustService {
    pub fn new(
        validator: InputValidator,
        evaluator: TrustEvaluator,
        registry: Arc<AgentRegistry>,
        narrator: Narrator,
        audit: Arc<AuditLog>,
        timeout: Duration,
        record_history: bool,
    ) -> Self {
        Self {
            validator,
            analyzer: CausalChainAnalyzer::new(),
            evaluator: Arc::new(evaluator),
            registry,
            narrator,
            audit,
            timeout,
            record_history,
            engine_invocations: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Number of times an engine has been started
    pub fn engine_invocations(&self) -> usize {
        self.engine_invocations.load(Ordering::SeqCst)
    }

    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.emit(&event) {
            tracing::error!(error = %e, action = %event.action, "failed to write audit event");
        }
    }

    /// Runs `work` on the blocking pool, failing with `Timeout` past the limit.
    pub(crate) async fn run_engine<T, F>(&self, operation: &'static str, work: F) -> TrustResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> TrustResult<T> + Send + 'static,
    {
        self.engine_invocations.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                tracing::error!(operation, error = %join, "engine task failed");
                Err(TrustError::evaluation_fatal(format!("{operation} engine task failed")))
            }
            Err(_) => {
                let after_ms = self.timeout.as_millis() as u64;
                tracing::warn!(operation, after_ms, "engine timed out");
                Err(TrustError::timeout(operation, after_ms))
            }
        }
    }

    pub async fn analyze_causal_chain(&self, req: CausalChainRequest) -> TrustResult<AnalysisResult> {
        self.validator.validate_causal_chain(&req)?;

        let analyzer = self.analyzer.clone();
        let text = req.causal_chain_data;
        let mut result = self
            .run_engine("causal_chain.analyze", move || Ok(analyzer.analyze(&text)))
            .await?;
        result.analysis_result = self
            .narrator
            .narrate(NarrativeKind::CausalChain, &result.analysis_result)
            .await?;

        let severity = if result.detected_anomalies.is_empty() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        self.record(
            AuditEvent::new("-", "causal_chain.analyze", "ok")
                .with_anomalies(result.detected_anomalies.len())
                .with_severity(severity),
        );
        Ok(result)
    }

    pub async fn evaluate_trust(&self, req: TrustEvaluationRequest) -> TrustResult<TrustEvaluation> {
        self.validator.validate_trust_evaluation(&req)?;

        let agent_id = req.agent_id.trim().to_string();
        let agent = self.registry.get(&agent_id)?;
        if agent.is_none() {
            tracing::info!(agent_id = %agent_id, "evaluating unregistered agent");
        }

        let evaluator = Arc::clone(&self.evaluator);
        let snapshot = agent.clone();
        let id = agent_id.clone();
        let activity = req.agent_activity_data;
        let threat = req.threat_landscape_description;
        let mut evaluation = self
            .run_engine("trust.evaluate", move || {
                evaluator.evaluate(&id, snapshot.as_ref(), &activity, &threat)
            })
            .await?;
        evaluation.justification = self
            .narrator
            .narrate(NarrativeKind::TrustEvaluation, &evaluation.justification)
            .await?;

        if self.record_history {
            if let Some(agent) = agent.as_ref().filter(|a| !a.archived) {
                self.registry
                    .record_evaluation(&agent.id, evaluation.trust_score, Utc::now())
                    .await?;
            }
        }

        self.record(
            AuditEvent::new(&agent_id, "trust.evaluate", "ok")
                .with_trust_score(evaluation.trust_score)
                .with_context(if agent.is_some() { "registered" } else { "unregistered" }),
        );
        Ok(evaluation)
    }

    pub fn onboard_agent(&self, agent: Agent) -> TrustResult<Agent> {
        let stored = self.registry.onboard(agent)?;
        self.record(AuditEvent::new(&stored.id, "agent.onboard", "ok"));
        Ok(stored)
    }

    pub async fn revoke_agent(&self, id: &str, reason: &str) -> TrustResult<Agent> {
        let agent = self.registry.revoke(id, reason).await?;
        self.record(
            AuditEvent::new(id, "agent.revoke", "ok")
                .with_context(reason)
                .with_severity(LogLevel::Critical),
        );
        Ok(agent)
    }

    pub async fn reinstate_agent(&self, id: &str) -> TrustResult<Agent> {
        let agent = self.registry.reinstate(id).await?;
        self.record(AuditEvent::new(id, "agent.reinstate", "ok").with_severity(LogLevel::Warn));
        Ok(agent)
    }

    pub async fn set_connectivity(&self, id: &str, online: bool) -> TrustResult<Agent> {
        let agent = self.registry.set_connectivity(id, online).await?;
        let action = if online { "agent.heartbeat" } else { "agent.disconnect" };
        self.record(AuditEvent::new(id, action, "ok"));
        Ok(agent)
    }

    pub async fn archive_agent(&self, id: &str) -> TrustResult<Agent> {
        let agent = self.registry.archive(id).await?;
        self.record(AuditEvent::new(id, "agent.archive", "ok"));
        Ok(agent)
    }

    pub fn summary(&self) -> TrustResult<FleetSummary> {
        self.registry.summary()
    }
}
