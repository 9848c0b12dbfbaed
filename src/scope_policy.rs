// Containment scopes and destination allowlisting for activity records

use serde::{Deserialize, Serialize};

use crate::activity_log::{ActionClass, ActivityRecord};
use crate::agent::{Containment, RuntimeProfile};
use crate::injection_patterns;

/// What a runtime profile allows an agent to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePolicy {
    pub containment: Containment,
    pub permissions: u32,
}

impl ScopePolicy {
    pub fn new(containment: Containment, permissions: u32) -> Self {
        Self {
            containment,
            permissions,
        }
    }

    pub fn for_runtime(runtime: &RuntimeProfile) -> Self {
        Self::new(runtime.containment, runtime.permissions)
    }

    /// Unknown actions are not held against the agent unless it holds no
    /// permissions at all.
    pub fn permits(&self, class: ActionClass) -> bool {
        if self.permissions == 0 {
            return false;
        }
        match (self.containment, class) {
            (_, ActionClass::Unknown) => true,
            (Containment::Low, ActionClass::Admin) => false,
            (Containment::Low, _) => true,
            (
                Containment::Medium,
                ActionClass::Read | ActionClass::Write | ActionClass::Network,
            ) => true,
            (Containment::Medium, _) => false,
            (Containment::High, ActionClass::Read) => true,
            (Containment::High, _) => false,
        }
    }

    pub fn violation(&self, record: &ActivityRecord) -> Option<ScopeViolation> {
        if injection_patterns::is_privilege_escalation(&record.raw) {
            return Some(ScopeViolation {
                line: record.line,
                reason: ViolationReason::PrivilegeEscalation,
            });
        }
        if !self.permits(record.class) {
            return Some(ScopeViolation {
                line: record.line,
                reason: ViolationReason::OutOfScope(record.class),
            });
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    OutOfScope(ActionClass),
    PrivilegeEscalation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeViolation {
    pub line: usize,
    pub reason: ViolationReason,
}

impl std::fmt::Display for ScopeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            ViolationReason::OutOfScope(class) => write!(f, "{class} at line {}", self.line),
            ViolationReason::PrivilegeEscalation => {
                write!(f, "privilege escalation at line {}", self.line)
            }
        }
    }
}

/// Resource prefixes considered trusted destinations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationAllowlist {
    prefixes: Vec<String>,
}

impl Default for DestinationAllowlist {
    fn default() -> Self {
        Self::new(["/api/", "database.", "/tmp/"])
    }
}

impl DestinationAllowlist {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn is_trusted(&self, resource: &str) -> bool {
        let resource = resource.trim();
        self.prefixes.iter().any(|p| resource.starts_with(p.as_str()))
    }

    /// Distinct resources in `records` that no prefix covers, in first-seen order.
    pub fn untrusted<'a>(&self, records: &'a [ActivityRecord]) -> Vec<&'a str> {
        let mut seen: Vec<&str> = Vec::new();
        for resource in records.iter().filter_map(|r| r.resource.as_deref()) {
            if !self.is_trusted(resource) && !seen.contains(&resource) {
                seen.push(resource);
            }
        }
        seen
    }
}
