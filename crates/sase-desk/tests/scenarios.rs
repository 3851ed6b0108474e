//! End-to-end engine scenarios over the in-memory collaborators

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sase_desk::application::UnassignedReason;
use sase_desk::infrastructure::{
    FileCatalogSource, InMemoryAgentDirectory, InMemoryTicketStore, RecordingNotificationSink,
};
use sase_desk::ports::outbound::StoreError;
use sase_desk::{
    AgentId, AssignmentOutcome, CatalogStore, DeskEngine, DeskError, EngineConfig, EngineUseCases,
    EventKind, Priority, RuleCatalog, TicketEvent, TicketId, TicketPatch, TicketSnapshot,
    TicketStatus, TicketStore,
};

struct Desk {
    engine: Arc<DeskEngine>,
    store: Arc<InMemoryTicketStore>,
    directory: Arc<InMemoryAgentDirectory>,
    sink: Arc<RecordingNotificationSink>,
}

fn desk(catalog: &str) -> Desk {
    let catalog = Arc::new(CatalogStore::new(RuleCatalog::from_yaml_str(catalog).unwrap()));
    let store = Arc::new(InMemoryTicketStore::new());
    let directory = Arc::new(InMemoryAgentDirectory::default());
    let sink = Arc::new(RecordingNotificationSink::new());
    let engine = DeskEngine::new(
        &EngineConfig::default(),
        catalog,
        store.clone(),
        directory.clone(),
        sink.clone(),
    )
    .unwrap();
    Desk {
        engine: Arc::new(engine),
        store,
        directory,
        sink,
    }
}

/// In-memory store whose writes can be refused and whose escalation
/// bookkeeping can be made to hang
#[derive(Default)]
struct FlakyStore {
    tickets: InMemoryTicketStore,
    reject_mutations: AtomicBool,
    stall_marks: AtomicBool,
}

#[async_trait]
impl TicketStore for FlakyStore {
    async fn get_open_tickets(&self) -> Result<Vec<TicketSnapshot>, StoreError> {
        self.tickets.get_open_tickets().await
    }

    async fn find_ticket(&self, id: &TicketId) -> Result<Option<TicketSnapshot>, StoreError> {
        self.tickets.find_ticket(id).await
    }

    async fn apply_mutation(&self, id: &TicketId, patch: &TicketPatch) -> Result<(), StoreError> {
        if self.reject_mutations.load(Ordering::Relaxed) {
            return Err(StoreError::Rejected {
                ticket_id: id.to_string(),
                reason: "read-only replica".into(),
            });
        }
        self.tickets.apply_mutation(id, patch).await
    }

    async fn mark_escalation_fired(
        &self,
        id: &TicketId,
        level_id: &str,
    ) -> Result<bool, StoreError> {
        if self.stall_marks.load(Ordering::Relaxed) {
            tokio::time::sleep(std::time::Duration::from_secs(300)).await;
        }
        self.tickets.mark_escalation_fired(id, level_id).await
    }
}

fn flaky_desk(
    catalog: &str,
    config: &EngineConfig) -> (DeskEngine,
    Arc<FlakyStore>,
    Arc<InMemoryAgentDirectory>,
) {
    let catalog = Arc::new(CatalogStore::new(RuleCatalog::from_yaml_str(catalog).unwrap()));
    let store = Arc::new(FlakyStore::default());
    let directory = Arc::new(InMemoryAgentDirectory::default());
    let sink = Arc::new(RecordingNotificationSink::new());
    let engine = DeskEngine::new(config, catalog, store.clone(), directory.clone(), sink).unwrap();
    (engine, store, directory)
}

/// Monday 2 March 2026, 09:00 UTC
fn monday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

const ROUND_ROBIN: &str = r#"
assignment_rules:
  - id: support
    name: Support rotation
    is_default: true
    method: round_robin
    agent_pool: support
"#;

#[tokio::test]
async fn round_robin_cycles_through_pool_in_order() {
    let desk = desk(ROUND_ROBIN);
    for agent in ["A", "B", "C"] {
        desk.directory.add_agent(agent, &[], 0);
    }
    desk.directory.add_pool("support", &["A", "B", "C"]);

    let mut chosen = Vec::new();
    for n in 1..=4 {
        let id = format!("T-{}", n);
        desk.store.insert(TicketSnapshot::new(id.as_str(), monday()));
        let outcome = desk
            .engine
            .handle_event_at(TicketEvent::new(EventKind::Created, id.as_str()), monday())
            .await
            .unwrap();
        chosen.push(outcome.assignment.and_then(|a| a.agent().cloned()).unwrap());
        assert_eq!(desk.store.get(&id).unwrap().assigned_agent_id, chosen.last().cloned());
    }
    let expected: Vec<AgentId> = ["A", "B", "C", "A"].into_iter().map(AgentId::new).collect();
    assert_eq!(chosen, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_get_distinct_agents() {
    let desk = desk(ROUND_ROBIN);
    let agents: Vec<String> = (0..8).map(|n| format!("agent-{}", n)).collect();
    for agent in &agents {
        desk.directory.add_agent(agent, &[], 0);
    }
    let members: Vec<&str> = agents.iter().map(String::as_str).collect();
    desk.directory.add_pool("support", &members);
    for n in 0..8 {
        desk.store.insert(TicketSnapshot::new(format!("T-{}", n), monday()));
    }

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let engine = desk.engine.clone();
            tokio::spawn(async move {
                engine
                    .handle_event_at(
                        TicketEvent::new(EventKind::Created, format!("T-{}", n)),
                        monday(),
                    )
                    .await
            })
        })
        .collect();

    let mut chosen = BTreeSet::new();
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        chosen.insert(outcome.assignment.and_then(|a| a.agent().cloned()).unwrap());
    }
    assert_eq!(chosen.len(), 8);
}

#[tokio::test]
async fn business_hours_deadline_rolls_over_weekend() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
sla_policies:
  - id: standard
    name: Standard
    is_default: true
    response_time: { hours: 4, business_hours_only: true }
    resolution_time: { hours: 40, business_hours_only: true }
"#,
    );
    let friday = Utc.with_ymd_and_hms(2026, 3, 6, 17, 0, 0).unwrap();
    let catalog = desk.engine.catalog().current();
    let policy = catalog.default_sla_policy().unwrap();
    let deadlines = desk.engine.calculator().deadlines(policy, friday).unwrap();
    assert_eq!(deadlines.response, Utc.with_ymd_and_hms(2026, 3, 9, 13, 0, 0).unwrap());
    assert_ne!(deadlines.response, friday + Duration::hours(4));

    desk.store.insert(TicketSnapshot::new("T-1", friday));
    let saturday = friday + Duration::hours(20);
    let status = desk
        .engine
        .sla_status(&TicketId::new("T-1"), saturday)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.policy_id, "standard");
    assert_eq!(status.percent_consumed, 0.0);
    assert!(!status.breached);
}

const ESCALATIONS: &str = r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
sla_policies:
  - id: standard
    name: Standard
    is_default: true
    response_time: { hours: 10 }
    resolution_time: { hours: 48 }
escalation_rules:
  - id: breached
    name: Response SLA breached
    trigger: { type: sla_percentage, value: 100 }
    actions:
      - { type: notify, target: manager@example.com }
  - id: at-risk
    name: Response SLA at risk
    trigger: { type: sla_percentage, value: 75 }
    actions:
      - { type: notify, target: lead@example.com }
      - { type: add_tag, value: sla-at-risk }
"#;

#[tokio::test]
async fn crossed_thresholds_fire_together_in_ascending_order() {
    let desk = desk(ESCALATIONS);
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_status(TicketStatus::Open));

    // 11h into a 10h clock: 110% consumed, nothing fired yet
    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(11)).await.unwrap();
    let fired: Vec<&str> = report.fired.iter().map(|f| f.level_id.as_str()).collect();
    assert_eq!(fired, vec!["at-risk", "breached"]);

    let sent = desk.sink.sent();
    let targets: Vec<&str> = sent.iter().map(|n| n.target.as_str()).collect();
    assert_eq!(targets, vec!["lead@example.com", "manager@example.com"]);
    // payloads carry the response deadline computed from the policy
    assert!(sent.iter().all(|n| n.payload.sla_deadline == Some(monday() + Duration::hours(10))));

    let ticket = desk.store.get("T-1").unwrap();
    assert!(ticket.tags.contains("sla-at-risk"));
    assert!(ticket.has_fired("at-risk") && ticket.has_fired("breached"));
}

#[tokio::test]
async fn levels_fire_exactly_once_across_ticks() {
    let desk = desk(ESCALATIONS);
    desk.store.insert(TicketSnapshot::new("T-1", monday()));

    let first = desk.engine.scheduler().tick_at(monday() + Duration::hours(8)).await.unwrap();
    assert_eq!(first.fired.len(), 1);
    assert_eq!(first.fired[0].level_id, "at-risk");

    let second = desk.engine.scheduler().tick_at(monday() + Duration::hours(9)).await.unwrap();
    assert!(second.fired.is_empty());

    let third = desk.engine.scheduler().tick_at(monday() + Duration::hours(12)).await.unwrap();
    assert_eq!(third.fired.len(), 1);
    assert_eq!(third.fired[0].level_id, "breached");

    for hours in [13, 30, 90] {
        let later = desk
            .engine
            .scheduler()
            .tick_at(monday() + Duration::hours(hours))
            .await
            .unwrap();
        assert!(later.fired.is_empty());
    }
    assert_eq!(desk.sink.sent().len(), 2);
    assert_eq!(desk.engine.stats().escalations_fired, 2);
}

#[tokio::test]
async fn overlapping_tick_is_dropped() {
    let desk = desk(ESCALATIONS);
    for n in 0..3 {
        desk.store.insert(TicketSnapshot::new(format!("T-{}", n), monday()));
    }
    let scheduler = desk.engine.scheduler();
    let at = monday() + Duration::hours(1);
    let (first, second) = tokio::join!(scheduler.tick_at(at), scheduler.tick_at(at));

    assert!(first.is_ok());
    assert!(matches!(second, Err(DeskError::TickOverlap)));
    assert_eq!(desk.engine.stats().ticks_dropped, 1);

    // the guard is released once the first tick ends
    assert!(scheduler.tick_at(at).await.is_ok());
}

#[tokio::test]
async fn sla_ladder_levels_use_policy_scoped_ids() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
sla_policies:
  - id: urgent
    name: Urgent
    conditions:
      - { field: priority, operator: equals, value: urgent }
    response_time: { hours: 1 }
    resolution_time: { hours: 4 }
    escalation_levels:
      - { threshold_percent: 50, action: { type: escalate, target: team_lead } }
      - { threshold_percent: 100, action: { type: escalate, target: manager } }
  - id: standard
    name: Standard
    is_default: true
    response_time: { hours: 8 }
    resolution_time: { hours: 48 }
"#,
    );
    desk.directory.set_role(sase_desk::domain::EscalationRole::TeamLead, "leads@example.com");
    desk.directory.set_role(sase_desk::domain::EscalationRole::Manager, "boss@example.com");
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_priority(Priority::Urgent));
    desk.store.insert(TicketSnapshot::new("T-2", monday()));

    let report = desk.engine.scheduler().tick_at(monday() + Duration::minutes(45)).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].ticket_id, TicketId::new("T-1"));
    assert_eq!(report.fired[0].level_id, "urgent@50");
    assert_eq!(report.fired[0].due_at, monday() + Duration::minutes(30));

    let sent = desk.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, "leads@example.com");
    assert_eq!(sent[0].payload.kind, "escalate");
}

#[tokio::test]
async fn first_response_switches_to_resolution_clock() {
    let desk = desk(ESCALATIONS);
    desk.store.insert(
        TicketSnapshot::new("T-1", monday()).with_agent_reply(monday() + Duration::hours(1)),
    );

    // 11h is past the response target but only 23% of resolution
    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(11)).await.unwrap();
    assert!(report.fired.is_empty());

    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(37)).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].level_id, "at-risk");
}

const REOPEN: &str = r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
automation_rules:
  - id: reopen
    name: Reopen on customer reply
    trigger_event: { type: customer_reply }
    conditions:
      - { field: status, operator: in, value: [resolved, closed] }
    actions:
      - { type: set_status, value: open }
      - { type: notify, target: assignee, value: Customer replied to a closed ticket }
"#;

#[tokio::test]
async fn customer_reply_reopens_closed_ticket() {
    let desk = desk(REOPEN);
    desk.store
        .insert(
            TicketSnapshot::new("T-1", monday())
                .with_status(TicketStatus::Closed)
                .assigned_to("alice"),
        );
    desk.store.insert(TicketSnapshot::new("T-2", monday()).with_status(TicketStatus::Open));

    let outcome = desk
        .engine
        .handle_event(TicketEvent::new(EventKind::CustomerReply, "T-1"))
        .await
        .unwrap();
    assert_eq!(outcome.fired_rules, vec!["reopen".to_string()]);
    assert!(outcome.report.is_clean());
    assert_eq!(desk.store.get("T-1").unwrap().status, TicketStatus::Open);
    assert_eq!(desk.sink.sent()[0].target, "alice");

    let outcome = desk
        .engine
        .handle_event(TicketEvent::new(EventKind::CustomerReply, "T-2"))
        .await
        .unwrap();
    assert!(outcome.fired_rules.is_empty());
    assert_eq!(desk.store.mutations().len(), 1);
}

#[tokio::test]
async fn failed_notification_does_not_abort_batch() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
automation_rules:
  - id: urgent-intake
    name: Urgent intake
    trigger_event: { type: priority_changed }
    conditions:
      - { field: priority, operator: equals, value: urgent }
    actions:
      - { type: notify, target: oncall@example.com, method: sms }
      - { type: add_tag, value: urgent-intake }
      - { type: add_note, value: Paged on-call }
"#,
    );
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_priority(Priority::Urgent));
    desk.sink.set_down(true);

    let outcome = desk
        .engine
        .handle_event_at(TicketEvent::new(EventKind::PriorityChanged, "T-1"), monday())
        .await
        .unwrap();
    assert_eq!(outcome.report.applied, 2);
    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].index, 0);
    assert_eq!(outcome.report.failures[0].action_type, "notify");
    assert!(desk.store.get("T-1").unwrap().tags.contains("urgent-intake"));
    assert_eq!(desk.store.notes("T-1"), vec!["Paged on-call".to_string()]);
    assert_eq!(desk.engine.stats().actions_failed, 1);
}

#[tokio::test]
async fn skill_based_without_qualified_agent_goes_to_triage() {
    let desk = desk(
        r#"
assignment_rules:
  - id: french
    name: French speakers
    priority: 1
    conditions:
      - { field: tags, operator: contains, value: fr }
    method: skill_based
    agent_pool: all
    required_skills: [french]
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
"#,
    );
    desk.directory.add_agent("bob", &["billing"], 0);
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_tag("fr"));

    let outcome = desk
        .engine
        .handle_event_at(TicketEvent::new(EventKind::Created, "T-1"), monday())
        .await
        .unwrap();
    assert_eq!(
        outcome.assignment,
        Some(AssignmentOutcome::Unassigned {
            rule_id: Some("french".into()),
            reason: UnassignedReason::NoQualifiedAgent { pool: "all".into() },
        })
    );
    let ticket = desk.store.get("T-1").unwrap();
    assert!(ticket.assigned_agent_id.is_none());
    assert!(ticket.tags.contains("needs-triage"));

    desk.directory.add_agent("zoe", &["french"], 3);
    desk.directory.add_agent("amelie", &["french", "billing"], 3);
    let outcome = desk.engine.reassign(&TicketId::new("T-1")).await.unwrap();
    assert_eq!(outcome.agent(), Some(&AgentId::new("amelie")));
}

#[tokio::test]
async fn load_balanced_picks_lightest_agent() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: load_balanced, agent_pool: all }
"#,
    );
    desk.directory.add_agent("a", &[], 4);
    desk.directory.add_agent("b", &[], 1);
    desk.directory.add_agent("c", &[], 2);
    desk.store.insert(TicketSnapshot::new("T-1", monday()));

    let outcome = desk.engine.reassign_at(&TicketId::new("T-1"), monday()).await.unwrap();
    assert_eq!(outcome.agent(), Some(&AgentId::new("b")));
    assert_eq!(
        desk.store.mutations(),
        vec![(TicketId::new("T-1"), TicketPatch::Assign(AgentId::new("b")))]
    );
}

#[tokio::test]
async fn no_response_trigger_waits_for_agent_reply() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
escalation_rules:
  - id: silent
    name: Customer waiting
    trigger: { type: no_response, value: 2, unit: hours }
    actions:
      - { type: update_priority, value: high }
"#,
    );
    desk.store.insert(
        TicketSnapshot::new("T-1", monday()).with_agent_reply(monday() + Duration::minutes(30)),
    );
    desk.store.insert(
        TicketSnapshot::new("T-2", monday())
            .with_agent_reply(monday() + Duration::minutes(30))
            .with_customer_reply(monday() + Duration::hours(1)),
    );

    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(4)).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].ticket_id, TicketId::new("T-2"));
    assert_eq!(report.fired[0].due_at, monday() + Duration::hours(3));
    assert_eq!(desk.store.get("T-2").unwrap().priority, Priority::High);
    assert_eq!(desk.store.get("T-1").unwrap().priority, Priority::Normal);
}

#[tokio::test]
async fn time_based_automation_runs_once_per_interval() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
automation_rules:
  - id: stale
    name: Flag stale tickets
    trigger_event: { type: time_based, every: { value: 1, unit: hours } }
    conditions:
      - { field: last_activity_age, operator: older_than, value: { value: 2, unit: days } }
    actions:
      - { type: add_note, value: Ticket is stale }
"#,
    );
    desk.store.insert(TicketSnapshot::new("T-old", monday() - Duration::days(5)));
    desk.store.insert(TicketSnapshot::new("T-new", monday()));

    let scheduler = desk.engine.scheduler();
    let first = scheduler.tick_at(monday()).await.unwrap();
    assert_eq!(first.automations_fired, 1);

    let soon = scheduler.tick_at(monday() + Duration::minutes(30)).await.unwrap();
    assert_eq!(soon.automations_fired, 0);

    let next_hour = scheduler.tick_at(monday() + Duration::minutes(61)).await.unwrap();
    assert_eq!(next_hour.automations_fired, 1);
    assert_eq!(desk.store.notes("T-old").len(), 2);
    assert!(desk.store.notes("T-new").is_empty());
}

#[tokio::test]
async fn resolved_tickets_are_not_escalated() {
    let desk = desk(ESCALATIONS);
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_status(TicketStatus::Resolved));
    let report = desk.engine.scheduler().tick_at(monday() + Duration::days(3)).await.unwrap();
    assert_eq!(report.tickets_scanned, 0);
    assert!(report.fired.is_empty());
}

#[tokio::test]
async fn unknown_ticket_is_reported() {
    let desk = desk(REOPEN);
    let err = desk
        .engine
        .handle_event(TicketEvent::new(EventKind::CustomerReply, "T-404"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeskError::TicketNotFound(id) if id == "T-404"));
}

#[tokio::test]
async fn scheduler_stops_on_shutdown() {
    let desk = desk(ESCALATIONS);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = desk.engine.spawn_scheduler(shutdown_rx);
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn rejected_reload_keeps_active_catalog() {
    let desk = desk(REOPEN);
    let dir = std::env::temp_dir();
    let broken = dir.join(format!("desk-broken-{}.yaml", std::process::id()));
    // two catch-all assignment rules
    tokio::fs::write(
        &broken,
        concat!(
            "assignment_rules:\n",
            "  - { id: a, name: A, is_default: true, method: round_robin, agent_pool: all }\n",
            "  - { id: b, name: B, is_default: true, method: round_robin, agent_pool: all }\n",
        ),
    )
    .await
    .unwrap();

    let before = desk.engine.catalog().current();
    let err = desk.engine.reload_catalog(&FileCatalogSource::new(&broken)).await.unwrap_err();
    assert!(matches!(err, sase_desk::ConfigurationError::MultipleDefaultAssignment(_)));
    assert_eq!(desk.engine.catalog().version(), 1);
    assert!(Arc::ptr_eq(&before, &desk.engine.catalog().current()));

    let fixed = dir.join(format!("desk-fixed-{}.json", std::process::id()));
    tokio::fs::write(
        &fixed,
        r#"{"assignment_rules":[
            {"id":"a","name":"A","is_default":true,"method":"load_balanced","agent_pool":"all"}
        ]}"#,
    )
    .await
    .unwrap();
    assert_eq!(desk.engine.reload_catalog(&FileCatalogSource::new(&fixed)).await.unwrap(), 2);
    assert!(desk.engine.catalog().current().automation_rules().is_empty());

    tokio::fs::remove_file(&broken).await.unwrap();
    tokio::fs::remove_file(&fixed).await.unwrap();
}

#[tokio::test]
async fn reassignment_rejected_by_store_is_reported() {
    let (engine, store, directory) = flaky_desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: load_balanced, agent_pool: all }
"#,
        &EngineConfig::default(),
    );
    directory.add_agent("a", &[], 4);
    directory.add_agent("b", &[], 1);
    store.tickets.insert(TicketSnapshot::new("T-1", monday()));
    store.reject_mutations.store(true, Ordering::Relaxed);

    let outcome = engine.reassign_at(&TicketId::new("T-1"), monday()).await.unwrap();
    assert_eq!(outcome.assignment.agent(), Some(&AgentId::new("b")));
    assert_eq!(outcome.agent(), None);
    assert_eq!(outcome.report.applied, 0);
    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].action_type, "reassign");
    assert!(store.tickets.get("T-1").unwrap().assigned_agent_id.is_none());

    store.reject_mutations.store(false, Ordering::Relaxed);
    let outcome = engine.reassign_at(&TicketId::new("T-1"), monday()).await.unwrap();
    assert_eq!(outcome.agent(), Some(&AgentId::new("b")));
    assert!(outcome.report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn tick_over_budget_yields_and_releases_guard() {
    let mut config = EngineConfig::default();
    config.scheduler.tick_budget_secs = 5;
    let (engine, store, _) = flaky_desk(ESCALATIONS, &config);
    store.tickets.insert(TicketSnapshot::new("T-1", monday()));
    store.stall_marks.store(true, Ordering::Relaxed);

    let scheduler = engine.scheduler();
    let at = monday() + Duration::hours(8);
    let report = scheduler.tick_at(at).await.unwrap();
    assert!(report.timed_out);
    assert!(report.fired.is_empty());
    assert_eq!(engine.stats().ticks_timed_out, 1);
    assert!(!scheduler.is_running_tick());

    // the interrupted level was never recorded, so the next pass fires it
    store.stall_marks.store(false, Ordering::Relaxed);
    let report = scheduler.tick_at(at).await.unwrap();
    assert!(!report.timed_out);
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].level_id, "at-risk");
    assert_eq!(engine.stats().ticks_timed_out, 1);
}

#[tokio::test]
async fn skipped_conditions_are_counted() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
automation_rules:
  - id: enterprise-reply
    name: Enterprise reply
    trigger_event: { type: customer_reply }
    conditions:
      - { field: customer_type, operator: equals, value: enterprise }
    actions:
      - { type: add_tag, value: enterprise-reply }
"#,
    );
    desk.store.insert(TicketSnapshot::new("T-1", monday()));
    desk.store.insert(TicketSnapshot::new("T-2", monday()).with_customer_type("enterprise"));

    let outcome = desk
        .engine
        .handle_event_at(TicketEvent::new(EventKind::CustomerReply, "T-1"), monday())
        .await
        .unwrap();
    assert!(outcome.fired_rules.is_empty());
    assert_eq!(desk.engine.stats().evaluation_errors, 1);

    let outcome = desk
        .engine
        .handle_event_at(TicketEvent::new(EventKind::CustomerReply, "T-2"), monday())
        .await
        .unwrap();
    assert_eq!(outcome.fired_rules, vec!["enterprise-reply".to_string()]);
    assert_eq!(desk.engine.stats().evaluation_errors, 1);
}

const REASSIGN_WHEN_IDLE: &str = r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: load_balanced, agent_pool: all }
escalation_rules:
  - id: idle
    name: Unanswered for two hours
    trigger: { type: time_elapsed, value: 2, unit: hours }
    actions:
      - { type: reassign }
"#;

#[tokio::test]
async fn reassign_action_picks_agent_through_rules() {
    let desk = desk(REASSIGN_WHEN_IDLE);
    desk.directory.add_agent("busy", &[], 7);
    desk.directory.add_agent("free", &[], 0);
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_status(TicketStatus::Open));

    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(3)).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.actions_applied, 1);
    let ticket = desk.store.get("T-1").unwrap();
    assert_eq!(ticket.assigned_agent_id, Some(AgentId::new("free")));
    assert!(!ticket.tags.contains("needs-triage"));
}

#[tokio::test]
async fn reassign_action_without_agents_tags_for_triage() {
    let desk = desk(REASSIGN_WHEN_IDLE);
    desk.store.insert(TicketSnapshot::new("T-1", monday()).with_status(TicketStatus::Open));

    let report = desk.engine.scheduler().tick_at(monday() + Duration::hours(3)).await.unwrap();
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.actions_failed, 0);
    let ticket = desk.store.get("T-1").unwrap();
    assert!(ticket.assigned_agent_id.is_none());
    assert!(ticket.tags.contains("needs-triage"));
    assert_eq!(
        desk.store.mutations(),
        vec![(TicketId::new("T-1"), TicketPatch::AddTag("needs-triage".into()))]
    );
}

#[tokio::test]
async fn out_of_range_due_times_are_skipped() {
    let desk = desk(
        r#"
assignment_rules:
  - { id: default, name: Default, is_default: true, method: round_robin, agent_pool: all }
sla_policies:
  - id: standard
    name: Standard
    is_default: true
    response_time: { hours: 10 }
    resolution_time: { hours: 48 }
    escalation_levels:
      - { threshold_percent: 50, action: { type: escalate, target: team_lead } }
escalation_rules:
  - id: at-risk
    name: SLA at risk
    trigger: { type: sla_percentage, value: 75 }
    actions:
      - { type: add_tag, value: sla-at-risk }
  - id: old
    name: Two hours old
    trigger: { type: time_elapsed, value: 2, unit: hours }
    actions:
      - { type: add_tag, value: old }
  - id: waiting
    name: Customer waiting
    trigger: { type: no_response, value: 2, unit: hours }
    actions:
      - { type: add_tag, value: waiting }
"#,
    );
    // created an hour before the end of representable time
    let edge = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
    desk.store
        .insert(TicketSnapshot::new("T-1", edge).with_customer_reply(edge + Duration::minutes(1)));
    desk.store.insert(TicketSnapshot::new("T-2", monday()));

    let now = edge + Duration::minutes(30);
    let report = desk.engine.scheduler().tick_at(now).await.unwrap();
    assert_eq!(report.tickets_scanned, 2);
    assert!(report.fired.iter().all(|f| f.ticket_id == TicketId::new("T-2")));
    let fired: BTreeSet<&str> = report.fired.iter().map(|f| f.level_id.as_str()).collect();
    assert_eq!(fired, BTreeSet::from(["standard@50", "at-risk", "old", "waiting"]));
    assert!(desk.store.get("T-1").unwrap().fired_escalation_levels.is_empty());

    let err = desk.engine.sla_status(&TicketId::new("T-1"), now).await.unwrap_err();
    assert!(matches!(err, DeskError::DeadlineOutOfRange { .. }));
}
