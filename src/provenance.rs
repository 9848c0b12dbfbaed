//! Taint tracking across a parsed causal chain.
//!
//! Content is untrusted when a human or external actor supplies it, or when
//! it arrives over an external channel. An agent becomes tainted once it
//! receives, reads or parses untrusted content, and taint follows hand-offs
//! to other named agents.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::causal_chain::{ActorKind, ChainEvent};
use crate::injection_patterns::{self, EmbeddedInstruction};

lazy_static! {
    static ref EXTERNAL_CHANNEL: Regex = Regex::new(
        r"(?i)\b(?:web(?:site)?\s+form|form|e-?mails?|webhooks?|uploads?|uploaded|chat|feedback|comments?|support\s+request)\b"
    )
    .unwrap();
    static ref EXTERNAL_FETCH: Regex = Regex::new(
        r"(?i)\b(?:downloads?|downloaded|scrap(?:es|ed|ing)|browses?|crawls?|fetch(?:es|ed)?\s+(?:\S+\s+)?(?:from\s+)?https?://)"
    )
    .unwrap();
    static ref INGEST: Regex = Regex::new(
        r"(?i)\b(?:receiv\w*|reads?|pars\w*|ingest\w*|process\w*|consum\w*|retriev\w*|load\w*|summari[sz]\w*|analy[sz]\w*|extract\w*|accepts?)\b"
    )
    .unwrap();
    static ref EXECUTE: Regex = Regex::new(
        r"(?i)\b(?:execut(?:e|es|ed|ing)|run|runs|ran|running|invok(?:e|es|ed|ing)|evaluat(?:e|es|ed|ing)|eval|spawn(?:s|ed|ing)?|carr(?:y|ies|ied)\s+out|compl(?:y|ies|ied)\s+with|follow(?:s|ed)?\s+the\s+(?:instruction|command|directive)s?|issu(?:es|ed)\s+the\s+command|pipes?\s+it)\b"
    )
    .unwrap();
    static ref NEGATED_EXECUTE: Regex = Regex::new(
        r"(?i)\b(?:not|never|no|refus\w*|declin\w*|won't|doesn't|didn't|without|block\w*|prevent\w*|stop\w*|halt\w*|avoid\w*|reject\w*|den(?:y|ies|ied)|forbid\w*|abort\w*|instead\s+of)\s+(?:\w+\s+){0,4}?(?:execut\w*|run\w*|ran|invok\w*|eval\w*|compl\w*|follow\w*)"
    )
    .unwrap();
    static ref CLAUSE_BREAK: Regex =
        Regex::new(r"(?i)[.;,:]\s+|[.;]\s*$|\s+(?:and|but|then|while|although|however|so)\s+").unwrap();
    static ref QUOTED_SPAN: Regex = Regex::new(r#"(?:^|[\s(:])(?:'[^'\n]*'|"[^"\n]*")"#).unwrap();
    static ref DEFENSIVE: Regex = Regex::new(
        r"(?i)\b(?:detect\w*|flag\w*|declin\w*|refus\w*|block\w*|quarantin\w*|escalat\w*|reject\w*|sanitiz\w*|ticket|alert\w*|prevent\w*|reports?\s+(?:it|the|a)|not\s+to\s+execute|decides?\s+not)\b"
    )
    .unwrap();
    static ref INSTRUCTION_REFERENCE: Regex = Regex::new(
        r"(?i)\b(?:the|this|that|embedded|provided|supplied|injected|user's)\s+(?:\w+\s+)?(?:command|instruction|script|query|directive|payload|statement)s?\b"
    )
    .unwrap();
    static ref RESOURCE_ACCESS: Regex = Regex::new(
        r"(?i)\b(?:get|post|put|request\w*|fetch\w*|calls?|call(?:ed|ing)|access\w*|visit\w*|opens?|quer(?:y|ies|ied)|navigat\w*|connect\w*)\b"
    )
    .unwrap();
    static ref HANDOFF: Regex = Regex::new(r#"(?i)\bto\s+(?:the\s+)?agent\s+['"]?([\w@.\-]+)['"]?"#).unwrap();
    static ref REFERENCE: Regex = Regex::new(r#"(https?://[^\s'")]+|(?:^|[\s'"(])(/[\w.\-/]*[\w\-/]))"#).unwrap();
}

/// What a single step does, judged from its wording alone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSignals {
    pub untrusted_origin: bool,
    pub ingests: bool,
    pub executes: bool,
    pub defensive: bool,
    pub accesses_resource: bool,
}

pub fn classify_step(event: &ChainEvent) -> StepSignals {
    // Actor names such as 'FeedbackProcessor' must not read as verbs
    let stripped = match event.actor_name() {
        Some(name) => event.text.replacen(name, "", 1),
        None => event.text.clone(),
    };
    let text = stripped.as_str();
    let kind = event.actor_kind();
    let via_channel = EXTERNAL_CHANNEL.is_match(text);

    let untrusted_origin = kind.is_untrusted_origin()
        || (matches!(kind, ActorKind::Unknown | ActorKind::System) && via_channel && event.payload.is_some())
        || (kind == ActorKind::Agent && EXTERNAL_FETCH.is_match(text));

    StepSignals {
        untrusted_origin,
        ingests: kind == ActorKind::Agent && INGEST.is_match(text),
        executes: executes(text),
        defensive: DEFENSIVE.is_match(text),
        accesses_resource: RESOURCE_ACCESS.is_match(text),
    }
}

/// True when some clause affirmatively executes something. Quoted content is
/// masked first, and clauses that refuse, block or flag never count.
fn executes(text: &str) -> bool {
    let masked = QUOTED_SPAN.replace_all(text, " the command ");
    CLAUSE_BREAK.split(&masked).any(|clause| {
        EXECUTE.is_match(clause) && !NEGATED_EXECUTE.is_match(clause) && !DEFENSIVE.is_match(clause)
    })
}

/// Untrusted content entering the chain at one step
#[derive(Debug, Clone)]
pub struct UntrustedContent {
    pub origin: usize,
    pub origin_label: String,
    pub source: String,
    pub instructions: Vec<EmbeddedInstruction>,
    pub references: Vec<String>,
}

fn references_in(text: &str) -> Vec<String> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|c| c.get(2).or_else(|| c.get(1)))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Default)]
pub struct ProvenanceTracker {
    untrusted: Vec<UntrustedContent>,
    tainted_agents: BTreeMap<String, usize>,
    seen_instructions: BTreeSet<String>,
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records untrusted content and returns the instructions not seen before.
    pub fn record_untrusted(&mut self, event: &ChainEvent) -> Vec<EmbeddedInstruction> {
        let content = event.payload.as_deref().unwrap_or(&event.text);
        let fresh: Vec<EmbeddedInstruction> = injection_patterns::scan(content)
            .into_iter()
            .filter(|i| self.seen_instructions.insert(i.text.to_lowercase()))
            .collect();

        let source = event
            .actor
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "an unidentified source".to_string());
        self.untrusted.push(UntrustedContent {
            origin: event.index,
            origin_label: event.label.clone(),
            source,
            instructions: fresh.clone(),
            references: references_in(content),
        });

        // An agent pulling external content taints itself
        if event.actor_kind() == ActorKind::Agent {
            if let Some(name) = event.actor_name() {
                self.taint(name, event.index);
            }
        }
        fresh
    }

    pub fn has_untrusted(&self) -> bool {
        !self.untrusted.is_empty()
    }

    pub fn untrusted(&self) -> &[UntrustedContent] {
        &self.untrusted
    }

    /// Marks `agent` tainted. The first tainting step is kept.
    pub fn taint(&mut self, agent: &str, at: usize) -> bool {
        if self.tainted_agents.contains_key(agent) {
            return false;
        }
        tracing::debug!(agent, step = at, "agent tainted by untrusted content");
        self.tainted_agents.insert(agent.to_string(), at);
        true
    }

    /// Applies ingestion and hand-off rules for one step.
    pub fn propagate(&mut self, event: &ChainEvent, signals: &StepSignals) -> Vec<String> {
        let mut newly = Vec::new();
        if !self.has_untrusted() {
            return newly;
        }
        if let Some(name) = event.actor_name() {
            if signals.ingests && event.actor_kind() == ActorKind::Agent && self.taint(name, event.index) {
                newly.push(name.to_string());
            }
            if self.is_tainted(name) {
                for cap in HANDOFF.captures_iter(&event.text) {
                    let target = cap[1].trim_end_matches(['.', ',']).to_string();
                    if self.taint(&target, event.index) {
                        newly.push(target);
                    }
                }
            }
        }
        newly
    }

    pub fn is_tainted(&self, agent: &str) -> bool {
        self.tainted_agents.contains_key(agent)
    }

    pub fn tainted_agents(&self) -> impl Iterator<Item = (&str, usize)> {
        self.tainted_agents.iter().map(|(name, at)| (name.as_str(), *at))
    }

    /// Finds the untrusted instruction a step refers to, by literal text,
    /// by matching kind, or by a generic "the command" style reference to
    /// the most recent one.
    pub fn referenced_instruction(&self, event: &ChainEvent) -> Option<(&UntrustedContent, &EmbeddedInstruction)> {
        let lower = event.text.to_lowercase();
        let all = || {
            self.untrusted
                .iter()
                .flat_map(|c| c.instructions.iter().map(move |i| (c, i)))
        };

        if let Some(hit) = all().find(|(_, i)| lower.contains(&i.text.to_lowercase())) {
            return Some(hit);
        }
        let kinds: BTreeSet<_> = injection_patterns::scan(&event.text)
            .into_iter()
            .map(|i| i.kind)
            .collect();
        if let Some(hit) = all().find(|(_, i)| kinds.contains(&i.kind)) {
            return Some(hit);
        }
        if INSTRUCTION_REFERENCE.is_match(&event.text) {
            return all().last();
        }
        None
    }

    /// The untrusted step that named `resource`, if any.
    pub fn reference_origin(&self, resource: &str) -> Option<&UntrustedContent> {
        self.untrusted
            .iter()
            .find(|c| c.references.iter().any(|r| r == resource))
    }
}
