//! SLA deadline calculation

use anyhow::{anyhow, Context as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use sase_desk::domain::SlaTarget;
use sase_desk::SlaCalculator;

use super::{load_catalog, parse_instant, Context};
use crate::output;

#[derive(Debug, Serialize, Tabled)]
pub struct ClockRow {
    pub clock: &'static str,
    pub hours: f64,
    pub business_hours_only: bool,
    pub deadline: DateTime<Utc>,
}

/// Instant each ladder rung becomes due on the response clock
#[derive(Debug, Serialize, Tabled)]
pub struct LevelRow {
    pub level: String,
    pub threshold_percent: u32,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Deadlines {
    policy: String,
    created_at: DateTime<Utc>,
    clocks: Vec<ClockRow>,
    levels: Vec<LevelRow>,
}

pub async fn handle(
    ctx: &Context,
    file: Option<PathBuf>,
    policy: Option<String>,
    created: &str,
) -> anyhow::Result<()> {
    let created_at = parse_instant(created)?;
    let catalog = load_catalog(&ctx.catalog_path(file)?).await?;
    let calculator = SlaCalculator::new(ctx.engine_config()?.business_calendar()?);

    let policy = match policy.as_deref() {
        Some(id) => catalog
            .sla_policies()
            .iter()
            .find(|p| p.header.id == id)
            .ok_or_else(|| anyhow!("no SLA policy '{}' in catalog", id))?,
        None => catalog
            .default_sla_policy()
            .ok_or_else(|| anyhow!("catalog has no SLA policies"))?,
    };

    let clock = |name: &'static str, target: &SlaTarget| -> anyhow::Result<ClockRow> {
        Ok(ClockRow {
            clock: name,
            hours: target.hours,
            business_hours_only: target.business_hours_only,
            deadline: calculator
                .deadline(target, created_at)
                .with_context(|| format!("{} deadline", name))?,
        })
    };
    let clocks = vec![
        clock("response", &policy.response_time)?,
        clock("resolution", &policy.resolution_time)?,
    ];

    let mut levels = Vec::with_capacity(policy.escalation_levels.len());
    for level in &policy.escalation_levels {
        levels.push(LevelRow {
            level: policy.level_id(level),
            threshold_percent: level.threshold_percent,
            due_at: calculator.instant_at_percent(
                &policy.response_time,
                created_at,
                level.threshold_percent,
            )?,
        });
    }

    if ctx.format.is_table() {
        println!("Policy {} for a ticket created {}", policy.header.id, created_at);
        output::table("Clocks", &clocks);
        output::table("Escalation levels", &levels);
        Ok(())
    } else {
        ctx.format.print(&Deadlines {
            policy: policy.header.id.clone(),
            created_at,
            clocks,
            levels,
        })
    }
}
