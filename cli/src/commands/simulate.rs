//! Dry run against fixture files
//!
//! Loads tickets and agents into the in-memory adapters, then either replays
//! the given events or runs a single escalation tick. Nothing leaves the
//! process: notifications are recorded and printed.

use anyhow::{anyhow, Context as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;

use sase_desk::infrastructure::{
    InMemoryAgentDirectory, InMemoryTicketStore, RecordingNotificationSink, SentNotification,
};
use sase_desk::{CatalogStore, DeskEngine, EventKind, EventOutcome, TicketEvent, TickReport};

use super::{load_catalog, parse_instant, Context};
use crate::output;

#[derive(Debug, Serialize)]
struct Simulation {
    at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<TickReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    events: Vec<EventOutcome>,
    mutations: Vec<MutationRow>,
    notifications: Vec<SentNotification>,
}

#[derive(Debug, Serialize, Tabled)]
struct FiredRow {
    ticket: String,
    level: String,
    due_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    ticket: String,
    event: String,
    assignment: String,
    fired_rules: String,
    failures: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct MutationRow {
    ticket: String,
    mutation: String,
}

#[derive(Debug, Serialize, Tabled)]
struct NotificationRow {
    target: String,
    method: String,
    kind: String,
    ticket: String,
}

pub async fn handle(
    ctx: &Context,
    file: Option<PathBuf>,
    tickets: &Path,
    agents: &Path,
    at: Option<&str>,
    events: &[String],
) -> anyhow::Result<()> {
    let at = match at {
        Some(value) => parse_instant(value)?,
        None => Utc::now(),
    };
    let events = events.iter().map(|e| parse_event(e)).collect::<anyhow::Result<Vec<_>>>()?;

    let catalog = Arc::new(CatalogStore::new(load_catalog(&ctx.catalog_path(file)?).await?));
    let store = Arc::new(
        InMemoryTicketStore::from_file(tickets)
            .with_context(|| format!("loading {}", tickets.display()))?,
    );
    let directory = Arc::new(
        InMemoryAgentDirectory::from_file(agents)
            .with_context(|| format!("loading {}", agents.display()))?,
    );
    let sink = Arc::new(RecordingNotificationSink::new());
    let engine = DeskEngine::new(
        &ctx.engine_config()?,
        catalog,
        store.clone(),
        directory,
        sink.clone(),
    )?;

    let mut outcomes = Vec::with_capacity(events.len());
    let tick = if events.is_empty() {
        Some(engine.scheduler().tick_at(at).await?)
    } else {
        for event in events {
            outcomes.push(engine.handle_event_at(event, at).await?);
        }
        None
    };

    let mutations: Vec<MutationRow> = store
        .mutations()
        .into_iter()
        .map(|(id, patch)| MutationRow {
            ticket: id.to_string(),
            mutation: format!("{:?}", patch),
        })
        .collect();
    let simulation = Simulation {
        at,
        tick,
        events: outcomes,
        mutations,
        notifications: sink.sent(),
    };

    if ctx.format.is_table() {
        print_tables(&simulation);
        Ok(())
    } else {
        ctx.format.print(&simulation)
    }
}

/// `kind:ticket_id`, e.g. `customer_reply:T-42`
fn parse_event(value: &str) -> anyhow::Result<TicketEvent> {
    let (kind, ticket) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("event '{}' must look like kind:ticket_id", value))?;
    let kind: EventKind = serde_json::from_value(serde_json::Value::String(kind.to_string()))
        .with_context(|| format!("unknown event kind '{}'", kind))?;
    Ok(TicketEvent::new(kind, ticket))
}

fn print_tables(simulation: &Simulation) {
    println!("Simulated at {}", simulation.at);

    if let Some(tick) = &simulation.tick {
        println!(
            "Scanned {} tickets, {} automations fired, {} actions applied, {} failed",
            tick.tickets_scanned, tick.automations_fired, tick.actions_applied, tick.actions_failed
        );
        let rows: Vec<FiredRow> = tick
            .fired
            .iter()
            .map(|f| FiredRow {
                ticket: f.ticket_id.to_string(),
                level: f.level_id.clone(),
                due_at: f.due_at,
            })
            .collect();
        output::table("Escalations fired", &rows);
    }

    if !simulation.events.is_empty() {
        let rows: Vec<EventRow> = simulation
            .events
            .iter()
            .map(|o| EventRow {
                ticket: o.ticket_id.to_string(),
                event: o.event.to_string(),
                assignment: match &o.assignment {
                    Some(outcome) => match outcome.agent() {
                        Some(agent) => agent.to_string(),
                        None => "unassigned".to_string(),
                    },
                    None => "-".to_string(),
                },
                fired_rules: o.fired_rules.join(", "),
                failures: o.report.failures.len(),
            })
            .collect();
        output::table("Events", &rows);
    }

    output::table("Mutations", &simulation.mutations);

    let rows: Vec<NotificationRow> = simulation
        .notifications
        .iter()
        .map(|n| NotificationRow {
            target: n.target.clone(),
            method: format!("{:?}", n.method),
            kind: n.payload.kind.to_string(),
            ticket: n.payload.ticket_id.to_string(),
        })
        .collect();
    output::table("Notifications", &rows);
}
