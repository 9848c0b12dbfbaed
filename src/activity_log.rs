//! Agent activity log parsing.
//!
//! Pipe-delimited `Key: value` records are parsed field by field; any other
//! non-empty line becomes one free-text record.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref ISO_TIMESTAMP: Regex =
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})").unwrap();
    static ref RESOURCE_IN_TEXT: Regex = Regex::new(
        r#"(https?://[^\s'"|)]+|(?:^|[\s'"(=])(/[\w.\-/]*[\w\-/])|\b(?:database|db|table|bucket|queue|s3)\.[\w.\-]+)"#
    )
    .unwrap();
    static ref WORD: Regex = Regex::new(r"[A-Za-z]+").unwrap();
}

const RESOURCE_KEYS: &[&str] = &["resource", "target", "endpoint", "url", "path", "destination", "host"];

/// Coarse category of what a record did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionClass {
    Read,
    Write,
    Network,
    Execute,
    Delete,
    Admin,
    Unknown,
}

impl ActionClass {
    /// Classifies an action name such as `API_CALL` or a free-text line.
    /// The riskiest class named wins.
    pub fn classify(action: &str) -> Self {
        let words: Vec<String> = WORD
            .find_iter(action)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        let has = |stems: &[&str]| words.iter().any(|w| stems.iter().any(|s| w.starts_with(s)));

        if has(&["admin", "grant", "privilege", "sudo", "elevat", "role", "permission", "superuser"]) {
            ActionClass::Admin
        } else if has(&["delete", "remove", "drop", "purge", "truncate", "wipe", "destroy"]) {
            ActionClass::Delete
        } else if has(&["exec", "run", "shell", "command", "spawn", "script", "invoke"]) {
            ActionClass::Execute
        } else if has(&["write", "update", "insert", "upload", "create", "modify", "put", "save", "append"]) {
            ActionClass::Write
        } else if has(&[
            "api", "call", "http", "request", "connect", "send", "email", "webhook", "network", "post", "socket",
            "download",
        ]) {
            ActionClass::Network
        } else if has(&["read", "access", "query", "select", "get", "list", "view", "fetch", "load", "search"]) {
            ActionClass::Read
        } else {
            ActionClass::Unknown
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionClass::Read => "Read",
            ActionClass::Write => "Write",
            ActionClass::Network => "Network",
            ActionClass::Execute => "Execute",
            ActionClass::Delete => "Delete",
            ActionClass::Admin => "Admin",
            ActionClass::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Success,
    Failed,
    Denied,
    Unknown,
}

impl RecordStatus {
    fn parse(value: &str) -> Self {
        let words: Vec<String> = value
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let any = |stems: &[&str], codes: &[&str]| {
            words
                .iter()
                .any(|w| stems.iter().any(|s| w.starts_with(s)) || codes.contains(&w.as_str()))
        };

        if any(&["denied", "forbidden", "unauthori", "blocked", "rejected"], &["401", "403"]) {
            RecordStatus::Denied
        } else if any(&["fail", "error", "timeout", "timed"], &["500", "502", "503", "504"]) {
            RecordStatus::Failed
        } else if any(&["success", "succeeded", "done", "completed"], &["ok", "200", "201", "204"]) {
            RecordStatus::Success
        } else {
            RecordStatus::Unknown
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RecordStatus::Failed | RecordStatus::Denied)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    /// 1-based source line
    pub line: usize,
    pub timestamp: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub class: ActionClass,
    pub resource: Option<String>,
    pub status: RecordStatus,
    pub fields: BTreeMap<String, String>,
    pub raw: String,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let found = ISO_TIMESTAMP.find(value)?;
    DateTime::parse_from_rfc3339(found.as_str())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn resource_in_text(text: &str) -> Option<String> {
    RESOURCE_IN_TEXT
        .captures(text)
        .and_then(|c| c.get(2).or_else(|| c.get(1)))
        .map(|m| m.as_str().to_string())
}

fn parse_fields(line: &str) -> BTreeMap<String, String> {
    line.split('|')
        .filter_map(|segment| segment.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty() && k.split_whitespace().count() <= 3)
        .collect()
}

impl ActivityRecord {
    fn structured(line_no: usize, raw: &str, fields: BTreeMap<String, String>) -> Self {
        let action = fields.get("action").or_else(|| fields.get("event")).cloned();
        let class = ActionClass::classify(action.as_deref().unwrap_or(raw));
        let resource = RESOURCE_KEYS
            .iter()
            .find_map(|k| fields.get(*k))
            .map(|r| r.trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|r| !r.is_empty());
        let timestamp = fields
            .get("timestamp")
            .or_else(|| fields.get("time"))
            .and_then(|t| parse_timestamp(t))
            .or_else(|| parse_timestamp(raw));
        let status = fields
            .get("status")
            .or_else(|| fields.get("result"))
            .map(|s| RecordStatus::parse(s))
            .unwrap_or(RecordStatus::Unknown);

        Self {
            line: line_no,
            timestamp,
            action,
            class,
            resource,
            status,
            fields,
            raw: raw.to_string(),
        }
    }

    fn free_text(line_no: usize, raw: &str) -> Self {
        Self {
            line: line_no,
            timestamp: parse_timestamp(raw),
            action: None,
            class: ActionClass::classify(raw),
            resource: resource_in_text(raw),
            status: RecordStatus::parse(raw),
            fields: BTreeMap::new(),
            raw: raw.to_string(),
        }
    }
}

/// Parsed activity for one agent
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityLog {
    pub records: Vec<ActivityRecord>,
}

impl ActivityLog {
    pub fn parse(text: &str) -> Self {
        let records = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                let line = line.trim();
                let fields = parse_fields(line);
                if line.contains('|') && !fields.is_empty() {
                    ActivityRecord::structured(i + 1, line, fields)
                } else {
                    ActivityRecord::free_text(i + 1, line)
                }
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hours between the earliest and latest timestamped record.
    pub fn span_hours(&self) -> Option<f64> {
        let mut stamps = self.records.iter().filter_map(|r| r.timestamp);
        let first = stamps.next()?;
        let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        Some((max - min).num_milliseconds() as f64 / 3_600_000.0)
    }
}
