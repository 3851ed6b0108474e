//! Catalog validation

use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use sase_desk::domain::RuleHeader;
use sase_desk::RuleKind;

use super::{load_catalog, Context};
use crate::output;

#[derive(Debug, Serialize, Tabled)]
pub struct RuleRow {
    pub kind: String,
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub conditions: usize,
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    catalog: String,
    valid: bool,
    rules: &'a [RuleRow],
}

pub async fn handle(ctx: &Context, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = ctx.catalog_path(file)?;
    let catalog = load_catalog(&path).await?;

    let mut rows = Vec::with_capacity(catalog.rule_count());
    for rule in catalog.assignment_rules() {
        let mut detail = format!("{:?} over {}", rule.method, rule.agent_pool);
        if !rule.required_skills.is_empty() {
            detail.push_str(&format!(" needing {}", rule.required_skills.join(", ")));
        }
        if rule.is_default {
            detail.push_str(" (default)");
        }
        rows.push(row(RuleKind::Assignment, &rule.header, detail));
    }
    for policy in catalog.sla_policies() {
        let mut detail = format!(
            "response {}h, resolution {}h, {} levels",
            policy.response_time.hours,
            policy.resolution_time.hours,
            policy.escalation_levels.len()
        );
        if policy.is_default {
            detail.push_str(" (default)");
        }
        rows.push(row(RuleKind::Sla, &policy.header, detail));
    }
    for rule in catalog.escalation_rules() {
        rows.push(row(RuleKind::Escalation, &rule.header, format!("{:?}", rule.trigger)));
    }
    for rule in catalog.automation_rules() {
        rows.push(row(RuleKind::Automation, &rule.header, format!("{:?}", rule.trigger_event)));
    }

    if ctx.format.is_table() {
        println!("{} {} ({} rules)", "✓".green(), path.display(), rows.len());
        output::table("Rules", &rows);
        Ok(())
    } else {
        ctx.format.print(&Summary {
            catalog: path.display().to_string(),
            valid: true,
            rules: &rows,
        })
    }
}

fn row(kind: RuleKind, header: &RuleHeader, detail: String) -> RuleRow {
    RuleRow {
        kind: kind.to_string(),
        id: header.id.clone(),
        name: header.name.clone(),
        enabled: header.enabled,
        conditions: header.conditions.len(),
        detail,
    }
}
