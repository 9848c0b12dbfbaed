use agent_trust::agent::Agent;
use agent_trust::fixtures::demo_fleet;
use agent_trust::trust_evaluator::TrustEvaluator;

const ACTIVITY: &str = r#"Timestamp: 2025-07-05T10:00:00Z | Action: API_CALL | Resource: /api/market/data | Params: { "symbol": "ACME" } | Status: SUCCESS
Timestamp: 2025-07-05T10:00:05Z | Action: DATA_ACCESS | Resource: database.market_trends | Query: SELECT * FROM trends WHERE sector='tech' | Status: SUCCESS
Timestamp: 2025-07-05T10:01:00Z | Action: API_CALL | Resource: /api/external/news | Params: { "query": "ACME Corp" } | Status: SUCCESS
Timestamp: 2025-07-05T10:02:15Z | Action: FILE_WRITE | Resource: /tmp/analysis_report.txt | Status: SUCCESS
Timestamp: 2025-07-05T10:03:00Z | Action: API_CALL | Resource: /api/market/data | Params: { "symbol": "XYZ" } | Status: SUCCESS"#;

const VIOLATION: &str = "Timestamp: 2025-07-05T10:04:00Z | Action: ADMIN_GRANT | Resource: /etc/sudoers | Status: SUCCESS";

const DASHBOARD_THREAT: &str = "Current threats include sophisticated phishing, ransomware, and supply chain attacks targeting financial data aggregation services.";
const CALM_THREAT: &str = "No notable campaigns are currently reported for this sector.";

fn agent(id: &str) -> Agent {
    demo_fleet()
        .into_iter()
        .find(|a| a.id == id)
        .expect("fixture exists")
}

#[test]
fn scores_stay_in_unit_interval() {
    let evaluator = TrustEvaluator::default();
    for fixture in demo_fleet() {
        for threat in [DASHBOARD_THREAT, CALM_THREAT] {
            let eval = evaluator
                .evaluate(&fixture.id, Some(&fixture), ACTIVITY, threat)
                .unwrap();
            assert!(
                (0.0..=1.0).contains(&eval.trust_score),
                "{} scored {}",
                fixture.id,
                eval.trust_score
            );
        }
    }
}

#[test]
fn evaluation_is_deterministic() {
    let evaluator = TrustEvaluator::default();
    let subject = agent("agent-002");
    let first = evaluator
        .evaluate("agent-002", Some(&subject), ACTIVITY, DASHBOARD_THREAT)
        .unwrap();
    let second = evaluator
        .evaluate("agent-002", Some(&subject), ACTIVITY, DASHBOARD_THREAT)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn violating_action_lowers_score() {
    let evaluator = TrustEvaluator::default();
    let subject = agent("agent-002");
    let base = evaluator
        .evaluate("agent-002", Some(&subject), ACTIVITY, DASHBOARD_THREAT)
        .unwrap();
    let with_violation = format!("{ACTIVITY}\n{VIOLATION}");
    let worse = evaluator
        .evaluate("agent-002", Some(&subject), &with_violation, DASHBOARD_THREAT)
        .unwrap();
    assert!(worse.trust_score < base.trust_score);
    assert!(worse.justification.contains("violation"));
}

#[test]
fn higher_threat_lowers_score() {
    let evaluator = TrustEvaluator::default();
    let subject = agent("agent-004");
    let calm = evaluator
        .evaluate("agent-004", Some(&subject), ACTIVITY, CALM_THREAT)
        .unwrap();
    let hostile = evaluator
        .evaluate("agent-004", Some(&subject), ACTIVITY, DASHBOARD_THREAT)
        .unwrap();
    assert!(hostile.trust_score < calm.trust_score);
}

#[test]
fn unknown_agent_is_scored_and_named_unknown() {
    let eval = TrustEvaluator::default()
        .evaluate("agent-unregistered", None, ACTIVITY, DASHBOARD_THREAT)
        .unwrap();
    assert!((0.0..=1.0).contains(&eval.trust_score));
    assert!(eval.justification.contains("unknown"));
    assert!(eval.justification.contains("Historical trend omitted"));
}

#[test]
fn poor_history_drags_score_down() {
    let evaluator = TrustEvaluator::default();
    let steady = agent("agent-001");
    let mut collapsed = steady.clone();
    collapsed.behavioral_history = agent("agent-003").behavioral_history;

    let good = evaluator
        .evaluate("agent-001", Some(&steady), ACTIVITY, CALM_THREAT)
        .unwrap();
    let bad = evaluator
        .evaluate("agent-001", Some(&collapsed), ACTIVITY, CALM_THREAT)
        .unwrap();
    assert!(bad.trust_score < good.trust_score);
}
