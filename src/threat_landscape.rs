//! Keyword scoring of a free-text threat landscape description.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword table: (phrase, weight). Each phrase counts once.
const THREAT_TERMS: &[(&str, u32)] = &[
    // severe
    ("active breach", 3),
    ("ongoing attack", 3),
    ("actively exploited", 3),
    ("zero-day", 3),
    ("zero day", 3),
    ("nation-state", 3),
    ("nation state", 3),
    ("wormable", 3),
    ("critical vulnerability", 3),
    // high
    ("ransomware", 2),
    ("supply chain", 2),
    ("prompt injection", 2),
    ("lpci", 2),
    ("data exfiltration", 2),
    ("exfiltrat", 2),
    ("credential theft", 2),
    ("credential stuffing", 2),
    ("advanced persistent", 2),
    ("apt", 2),
    ("insider threat", 2),
    ("privilege escalation", 2),
    // elevated
    ("phishing", 1),
    ("malware", 1),
    ("ddos", 1),
    ("denial of service", 1),
    ("social engineering", 1),
    ("fraud", 1),
    ("vulnerability", 1),
    ("botnet", 1),
    ("spam", 1),
    ("brute force", 1),
    ("scanning", 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    Low,
    Elevated,
    High,
    Severe,
}

impl ThreatLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => ThreatLevel::Low,
            1..=2 => ThreatLevel::Elevated,
            3..=5 => ThreatLevel::High,
            _ => ThreatLevel::Severe,
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreatLevel::Low => "Low",
            ThreatLevel::Elevated => "Elevated",
            ThreatLevel::High => "High",
            ThreatLevel::Severe => "Severe",
        };
        f.write_str(label)
    }
}

/// Fractional score discount applied per threat level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDiscounts {
    pub low: f64,
    pub elevated: f64,
    pub high: f64,
    pub severe: f64,
}

impl Default for ThreatDiscounts {
    fn default() -> Self {
        Self {
            low: 0.0,
            elevated: 0.05,
            high: 0.12,
            severe: 0.25,
        }
    }
}

impl ThreatDiscounts {
    pub fn for_level(&self, level: ThreatLevel) -> f64 {
        match level {
            ThreatLevel::Low => self.low,
            ThreatLevel::Elevated => self.elevated,
            ThreatLevel::High => self.high,
            ThreatLevel::Severe => self.severe,
        }
    }

    /// Discounts must lie in [0,1) and never decrease with severity.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.low, self.elevated, self.high, self.severe];
        if ordered.iter().any(|d| !(0.0..1.0).contains(d)) {
            return Err("threat discounts must lie in [0, 1)".to_string());
        }
        if ordered.windows(2).any(|w| w[0] > w[1]) {
            return Err("threat discounts must not decrease with severity".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatAssessment {
    pub level: ThreatLevel,
    pub score: u32,
    pub matched: Vec<&'static str>,
}

fn contains_term(text: &str, term: &str) -> bool {
    // short acronyms must stand alone
    if term.len() <= 4 {
        return text
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .any(|w| w == term);
    }
    text.contains(term)
}

pub fn assess(description: &str) -> ThreatAssessment {
    let text = description.to_lowercase();
    let mut matched = Vec::new();
    let mut score = 0;
    for (term, weight) in THREAT_TERMS {
        // "exfiltrat" and "data exfiltration" describe one threat
        if *term == "exfiltrat" && matched.contains(&"data exfiltration") {
            continue;
        }
        if contains_term(&text, term) {
            matched.push(*term);
            score += weight;
        }
    }
    ThreatAssessment {
        level: ThreatLevel::from_score(score),
        score,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_sample_is_high() {
        let a = assess(
            "Current threats include sophisticated phishing, ransomware, and supply chain attacks targeting financial data aggregation services.",
        );
        assert_eq!(a.matched, vec!["ransomware", "supply chain", "phishing"]);
        assert_eq!(a.score, 5);
        assert_eq!(a.level, ThreatLevel::High);
    }

    #[test]
    fn quiet_landscape_is_low() {
        let a = assess("Routine operations, no notable incidents this quarter.");
        assert_eq!(a.level, ThreatLevel::Low);
        assert!(a.matched.is_empty());
    }

    #[test]
    fn severe_terms_escalate() {
        let a = assess("Active breach in progress: a zero-day in the gateway is actively exploited.");
        assert_eq!(a.level, ThreatLevel::Severe);
    }

    #[test]
    fn acronyms_need_word_boundaries() {
        assert!(assess("An APT group is targeting us").matched.contains(&"apt"));
        assert!(!assess("The rapt audience and adaptive systems team").matched.contains(&"apt"));
    }

    #[test]
    fn discounts_validate_ordering() {
        assert!(ThreatDiscounts::default().validate().is_ok());
        let bad = ThreatDiscounts {
            high: 0.3,
            severe: 0.1,
            ..ThreatDiscounts::default()
        };
        assert!(bad.validate().is_err());
        assert!(ThreatDiscounts::default().for_level(ThreatLevel::Severe) > ThreatDiscounts::default().for_level(ThreatLevel::High));
    }
}
