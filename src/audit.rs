// Structured audit events for analyses, evaluations and registry changes.
// Every event goes to tracing; with a configured path it is also appended to
// a SHA-256 hash-linked JSONL file that `verify_audit_log` can re-check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::{SafeLock, TrustError, TrustResult};

/// Severity levels for structured log classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Agent the event concerns, or "-" for chain analyses
    pub who: String,
    pub action: String,
    pub outcome: String,
    pub context: Option<String>,
    pub severity: LogLevel,
    pub trust_score: Option<f64>,
    pub anomalies: Option<usize>,
}

impl AuditEvent {
    pub fn new(who: &str, action: &str, outcome: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            who: who.to_string(),
            action: action.to_string(),
            outcome: outcome.to_string(),
            context: None,
            severity: LogLevel::Info,
            trust_score: None,
            anomalies: None,
        }
    }

    pub fn with_severity(mut self, level: LogLevel) -> Self {
        self.severity = level;
        self
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    pub fn with_trust_score(mut self, score: f64) -> Self {
        self.trust_score = Some(score);
        self
    }

    pub fn with_anomalies(mut self, count: usize) -> Self {
        self.anomalies = Some(count);
        self
    }

    fn trace(&self) {
        match self.severity {
            LogLevel::Info => tracing::info!(
                target: "audit",
                id = %self.id,
                who = %self.who,
                action = %self.action,
                outcome = %self.outcome,
                trust_score = ?self.trust_score,
                anomalies = ?self.anomalies,
                "audit event"
            ),
            LogLevel::Warn => tracing::warn!(
                target: "audit",
                id = %self.id,
                who = %self.who,
                action = %self.action,
                outcome = %self.outcome,
                trust_score = ?self.trust_score,
                anomalies = ?self.anomalies,
                "audit event"
            ),
            LogLevel::Critical => tracing::error!(
                target: "audit",
                id = %self.id,
                who = %self.who,
                action = %self.action,
                outcome = %self.outcome,
                trust_score = ?self.trust_score,
                anomalies = ?self.anomalies,
                "audit event"
            ),
        }
    }
}

/// One line of the audit file
#[derive(Debug, Serialize, Deserialize)]
struct LoggedAuditLine {
    line: String,
    hash: String,
    prev_hash: Option<String>,
}

fn link_hash(prev_hash: Option<&str>, line: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(line.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn read_last_hash(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let last_line = BufReader::new(file).lines().map_while(Result::ok).last()?;
    serde_json::from_str::<LoggedAuditLine>(&last_line)
        .ok()
        .map(|r| r.hash)
}

/// Audit sink. Without a path it only traces.
pub struct AuditLog {
    path: Option<PathBuf>,
    last_hash: Mutex<Option<String>>,
}

impl AuditLog {
    pub fn disabled() -> Self {
        Self {
            path: None,
            last_hash: Mutex::new(None),
        }
    }

    /// Appends to `path`, continuing the hash chain of any existing file.
    pub fn to_file(path: impl Into<PathBuf>) -> TrustResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrustError::io(format!("create audit dir {}", parent.display()), e))?;
        }
        let last = read_last_hash(&path);
        Ok(Self {
            path: Some(path),
            last_hash: Mutex::new(last),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn emit(&self, event: &AuditEvent) -> TrustResult<()> {
        event.trace();
        let Some(path) = &self.path else {
            return Ok(());
        };

        let line = serde_json::to_string(event)
            .map_err(|e| TrustError::serialization("audit event", e))?;
        // the lock spans hash computation and the append so lines stay linked
        let mut last = self.last_hash.safe_lock()?;
        let hash = link_hash(last.as_deref(), &line);
        let record = LoggedAuditLine {
            line,
            hash: hash.clone(),
            prev_hash: last.clone(),
        };
        let json_line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TrustError::io(format!("open audit log {}", path.display()), e))?;
        writeln!(file, "{json_line}")
            .map_err(|e| TrustError::io(format!("append audit log {}", path.display()), e))?;
        *last = Some(hash);
        Ok(())
    }
}

/// Re-checks every link of an audit file and returns the number of entries.
pub fn verify_audit_log(path: impl AsRef<Path>) -> TrustResult<usize> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| TrustError::io(format!("open audit log {}", path.display()), e))?;

    let mut previous: Option<String> = None;
    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| TrustError::io("read audit log", e))?;
        let record: LoggedAuditLine = serde_json::from_str(&line)
            .map_err(|e| TrustError::serialization(format!("audit line {}", index + 1), e))?;
        if record.prev_hash != previous {
            return Err(TrustError::internal(format!(
                "audit chain broken at line {}: previous hash mismatch",
                index + 1
            )));
        }
        if link_hash(previous.as_deref(), &record.line) != record.hash {
            return Err(TrustError::internal(format!(
                "audit chain broken at line {}: content hash mismatch",
                index + 1
            )));
        }
        previous = Some(record.hash);
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_hash_linked_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/trail.jsonl");

        let log = AuditLog::to_file(&path).unwrap();
        log.emit(&AuditEvent::new("agent-002", "trust.evaluate", "ok").with_trust_score(0.9))
            .unwrap();
        log.emit(&AuditEvent::new("-", "causal_chain.analyze", "ok").with_anomalies(1))
            .unwrap();
        drop(log);

        let reopened = AuditLog::to_file(&path).unwrap();
        reopened
            .emit(&AuditEvent::new("agent-003", "agent.revoke", "ok").with_severity(LogLevel::Warn))
            .unwrap();

        assert_eq!(verify_audit_log(&path).unwrap(), 3);
    }

    #[test]
    fn tampering_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trail.jsonl");
        let log = AuditLog::to_file(&path).unwrap();
        log.emit(&AuditEvent::new("agent-001", "trust.evaluate", "ok")).unwrap();
        log.emit(&AuditEvent::new("agent-001", "trust.evaluate", "ok")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let tampered = content.replacen("agent-001", "agent-666", 1);
        std::fs::write(&path, tampered).unwrap();

        assert!(verify_audit_log(&path).is_err());
    }

    #[test]
    fn disabled_log_only_traces() {
        let log = AuditLog::disabled();
        assert!(log.path().is_none());
        assert!(log.emit(&AuditEvent::new("-", "causal_chain.analyze", "ok")).is_ok());
    }
}
