// Registry lifecycle and concurrency
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use crate::agent::{Agent, Containment, RuntimeProfile};
use crate::agent_registry::AgentRegistry;
use crate::agent_status::{AgentStatus, StatusMachine};
use crate::agent_store::MemoryAgentStore;
use crate::errors::TrustError;
use crate::fixtures::demo_fleet;

fn registry() -> Arc<AgentRegistry> {
    let registry = AgentRegistry::new(Arc::new(MemoryAgentStore::new()), StatusMachine::default());
    for agent in demo_fleet() {
        registry.seed(agent).unwrap();
    }
    Arc::new(registry)
}

fn newcomer(id: &str) -> Agent {
    Agent::new(
        id,
        "Newcomer",
        format!("did:key:{id}"),
        0.8,
        RuntimeProfile {
            containment: Containment::Medium,
            permissions: 10,
        },
    )
}

#[tokio::test]
async fn concurrent_appends_stay_chronological() {
    let registry = registry();
    let base = Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap();
    let before = registry.require("agent-001").unwrap().behavioral_history.len();

    let mut handles = Vec::new();
    for i in 0..32i64 {
        let registry = Arc::clone(&registry);
        // timestamps arrive out of order on purpose
        let at = base + Duration::minutes((i * 7) % 32);
        handles.push(tokio::spawn(async move {
            registry.record_evaluation("agent-001", 0.9, at).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let agent = registry.require("agent-001").unwrap();
    assert_eq!(agent.behavioral_history.len(), before + 32);
    assert!(agent
        .behavioral_history
        .windows(2)
        .all(|w| w[0].date <= w[1].date));
}

#[tokio::test]
async fn different_agents_record_in_parallel() {
    let registry = registry();
    let at = Utc::now();
    let (a, b) = tokio::join!(
        registry.record_evaluation("agent-001", 0.91, at),
        registry.record_evaluation("agent-004", 0.89, at),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(registry.require("agent-001").unwrap().trust_score, 0.91);
    assert_eq!(registry.require("agent-004").unwrap().trust_score, 0.89);
}

#[test]
fn duplicate_onboard_conflicts() {
    let registry = registry();
    registry.onboard(newcomer("agent-100")).unwrap();
    let err = registry.onboard(newcomer("agent-100")).unwrap_err();
    assert!(matches!(err, TrustError::Conflict { .. }));
}

#[test]
fn onboard_derives_status() {
    let registry = registry();
    let mut agent = newcomer("agent-101");
    agent.status = AgentStatus::Online;
    let stored = registry.onboard(agent).unwrap();
    assert_eq!(stored.status, AgentStatus::Offline);
    assert!(stored.behavioral_history.is_empty());
}

#[tokio::test]
async fn did_is_immutable() {
    let registry = registry();
    let renamed = registry
        .rename("agent-002", "MarketAnalyzer-beta", "did:key:z6Mkt...fgh")
        .await
        .unwrap();
    assert_eq!(renamed.name, "MarketAnalyzer-beta");

    let err = registry
        .rename("agent-002", "MarketAnalyzer-beta", "did:key:other")
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::Validation { .. }));
}

#[tokio::test]
async fn collapse_marks_agent_compromised() {
    let registry = registry();
    let at = Utc::now();
    registry.record_evaluation("agent-004", 0.2, at).await.unwrap();
    let agent = registry.require("agent-004").unwrap();
    assert_eq!(agent.status, AgentStatus::Compromised);
}

#[tokio::test]
async fn revoked_agent_stays_offline_until_reinstated() {
    let registry = registry();
    let revoked = registry.revoke("agent-001", "credential leak").await.unwrap();
    assert!(revoked.revoked);
    assert_eq!(revoked.status, AgentStatus::Compromised);

    let still = registry.set_connectivity("agent-001", true).await.unwrap();
    assert_eq!(still.status, AgentStatus::Compromised);

    let reinstated = registry.reinstate("agent-001").await.unwrap();
    assert!(!reinstated.revoked);
    let online = registry.set_connectivity("agent-001", true).await.unwrap();
    assert_eq!(online.status, AgentStatus::Online);
}

#[tokio::test]
async fn archived_agents_leave_listing_and_summary() {
    let registry = registry();
    let before = registry.summary().unwrap();
    assert_eq!(before.total_agents, 5);
    assert_eq!(before.high_risk_agents, 2);

    let archived = registry.archive("agent-003").await.unwrap();
    assert!(archived.archived);
    assert_eq!(registry.list(false).unwrap().len(), 4);
    assert_eq!(registry.list(true).unwrap().len(), 5);

    let after = registry.summary().unwrap();
    assert_eq!(after.total_agents, 4);
    assert_eq!(after.compromised, 0);
    assert!(registry
        .record_evaluation("agent-003", 0.9, Utc::now())
        .await
        .is_err());
}

#[tokio::test]
async fn archived_agent_rejects_connectivity_changes() {
    let registry = registry();
    registry.archive("agent-001").await.unwrap();

    for online in [true, false] {
        let err = registry.set_connectivity("agent-001", online).await.unwrap_err();
        assert!(matches!(err, TrustError::Conflict { .. }), "{err}");
    }
    assert_eq!(registry.require("agent-001").unwrap().status, AgentStatus::Offline);
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let registry = registry();
    let err = registry.revoke("agent-999", "missing").await.unwrap_err();
    assert!(matches!(err, TrustError::AgentNotFound { .. }));
}

#[tokio::test]
async fn lock_entries_do_not_outlive_requests() {
    let registry = registry();
    for i in 0..100 {
        let err = registry.revoke(&format!("ghost-{i}"), "missing").await.unwrap_err();
        assert!(matches!(err, TrustError::AgentNotFound { .. }));
    }
    assert_eq!(registry.lock_count(), 0);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.record_evaluation("agent-002", 0.7, Utc::now()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    registry.set_connectivity("agent-002", true).await.unwrap();
    assert_eq!(registry.lock_count(), 0);
}

#[test]
fn racing_onboards_register_once() {
    let registry = registry();
    let barrier = std::sync::Barrier::new(8);

    let winners: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = &registry;
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut agent = newcomer("agent-race");
                    agent.name = format!("Contender {i}");
                    barrier.wait();
                    registry.onboard(agent)
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| match h.join().unwrap() {
                Ok(agent) => Some(agent.name),
                Err(err) => {
                    assert!(matches!(err, TrustError::Conflict { .. }), "{err}");
                    None
                }
            })
            .collect()
    });

    assert_eq!(winners.len(), 1);
    assert_eq!(registry.require("agent-race").unwrap().name, winners[0]);
}

#[test]
fn import_normalizes_seed_records() {
    let registry = AgentRegistry::new(Arc::new(MemoryAgentStore::new()), StatusMachine::default());
    let day = |d| Utc.with_ymd_and_hms(2025, 7, d, 0, 0, 0).unwrap();

    let mut inflated = newcomer("agent-inflated");
    inflated.trust_score = 7.5;
    inflated.status = AgentStatus::Online;
    inflated.revoked = true;

    let mut shuffled = newcomer("agent-shuffled");
    shuffled.status = AgentStatus::Compromised;
    shuffled.behavioral_history = vec![
        crate::agent::HistorySample { date: day(3), score: 0.9 },
        crate::agent::HistorySample { date: day(1), score: 0.85 },
        crate::agent::HistorySample { date: day(2), score: 1.4 },
    ];
    shuffled.trust_score = 0.9;

    assert!(registry.import(inflated).unwrap());
    assert!(registry.import(shuffled).unwrap());
    assert!(!registry.import(newcomer("agent-inflated")).unwrap());

    let inflated = registry.require("agent-inflated").unwrap();
    assert_eq!(inflated.trust_score, 1.0);
    assert_eq!(inflated.status, AgentStatus::Online);
    assert!(!inflated.revoked);

    let shuffled = registry.require("agent-shuffled").unwrap();
    assert_eq!(shuffled.history_scores(), vec![0.85, 1.0, 0.9]);
    assert_eq!(shuffled.status, AgentStatus::Offline);

    let summary = registry.summary().unwrap();
    assert!(summary.average_trust <= 100);
}
