//! In-memory collaborator implementations for testing and dry runs

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::{
    AgentId, AgentPool, EscalationRole, NotifyMethod, TicketId, TicketPatch, TicketSnapshot,
};
use crate::error::DeskResult;
use crate::infrastructure::read_document;
use crate::ports::outbound::{
    AgentDirectory, DirectoryError, NotificationPayload, NotificationSink, NotifyError, StoreError,
    TicketStore,
};

/// In-memory ticket store
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<BTreeMap<String, TicketSnapshot>>,
    notes: RwLock<HashMap<String, Vec<String>>>,
    mutations: Mutex<Vec<(TicketId, TicketPatch)>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tickets(tickets: impl IntoIterator<Item = TicketSnapshot>) -> Self {
        let store = Self::new();
        for ticket in tickets {
            store.insert(ticket);
        }
        store
    }

    /// Tickets from a YAML or JSON list
    pub fn from_file(path: &Path) -> DeskResult<Self> {
        let tickets: Vec<TicketSnapshot> = read_document(path)?;
        Ok(Self::with_tickets(tickets))
    }

    pub fn insert(&self, ticket: TicketSnapshot) {
        self.tickets.write().insert(ticket.id.as_str().to_string(), ticket);
    }

    pub fn get(&self, id: &str) -> Option<TicketSnapshot> {
        self.tickets.read().get(id).cloned()
    }

    /// Replace a ticket through a closure, as the surrounding app would
    pub fn update<F>(&self, id: &str, change: F) -> bool
    where
        F: FnOnce(&mut TicketSnapshot),
    {
        match self.tickets.write().get_mut(id) {
            Some(ticket) => {
                change(ticket);
                true
            }
            None => false,
        }
    }

    pub fn notes(&self, id: &str) -> Vec<String> {
        self.notes.read().get(id).cloned().unwrap_or_default()
    }

    /// Every mutation applied so far, in order
    pub fn mutations(&self) -> Vec<(TicketId, TicketPatch)> {
        self.mutations.lock().clone()
    }

    pub fn all(&self) -> Vec<TicketSnapshot> {
        self.tickets.read().values().cloned().collect()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn get_open_tickets(&self) -> Result<Vec<TicketSnapshot>, StoreError> {
        Ok(self.tickets.read().values().filter(|t| t.is_open()).cloned().collect())
    }

    async fn find_ticket(&self, id: &TicketId) -> Result<Option<TicketSnapshot>, StoreError> {
        Ok(self.get(id.as_str()))
    }

    async fn apply_mutation(&self, id: &TicketId, patch: &TicketPatch) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write();
        let ticket = tickets
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;

        match patch {
            TicketPatch::SetStatus(status) => ticket.status = *status,
            TicketPatch::SetPriority(priority) => ticket.priority = *priority,
            TicketPatch::AddTag(tag) => {
                ticket.tags.insert(tag.clone());
            }
            TicketPatch::SetCategory(category) => ticket.category = Some(category.clone()),
            TicketPatch::Assign(agent) => ticket.assigned_agent_id = Some(agent.clone()),
            TicketPatch::AddNote(note) => {
                self.notes
                    .write()
                    .entry(id.as_str().to_string())
                    .or_default()
                    .push(note.clone());
            }
        }
        self.mutations.lock().push((id.clone(), patch.clone()));
        Ok(())
    }

    async fn mark_escalation_fired(
        &self,
        id: &TicketId,
        level_id: &str,
    ) -> Result<bool, StoreError> {
        let mut tickets = self.tickets.write();
        let ticket = tickets
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.as_str().to_string()))?;
        Ok(ticket.fired_escalation_levels.insert(level_id.to_string()))
    }
}

/// One agent as the directory knows it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(default)]
    pub skills: BTreeSet<String>,
    #[serde(default)]
    pub open_load: u32,
    /// Overrides the directory-wide role holders for this agent's tickets
    #[serde(default)]
    pub team_lead: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
}

/// Agent directory document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryFixture {
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRecord>,
    /// Pool name to members, in rotation order
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<String>>,
    /// Directory-wide holder of each escalation role
    #[serde(default)]
    pub roles: HashMap<EscalationRole, String>,
}

/// In-memory agent directory
#[derive(Default)]
pub struct InMemoryAgentDirectory {
    fixture: RwLock<DirectoryFixture>,
}

impl InMemoryAgentDirectory {
    pub fn new(fixture: DirectoryFixture) -> Self {
        Self {
            fixture: RwLock::new(fixture),
        }
    }

    pub fn from_file(path: &Path) -> DeskResult<Self> {
        Ok(Self::new(read_document(path)?))
    }

    pub fn add_agent(&self, id: &str, skills: &[&str], open_load: u32) {
        self.fixture.write().agents.insert(
            id.to_string(),
            AgentRecord {
                skills: skills.iter().map(|s| s.to_string()).collect(),
                open_load,
                ..Default::default()
            },
        );
    }

    pub fn add_pool(&self, name: &str, members: &[&str]) {
        self.fixture
            .write()
            .pools
            .insert(name.to_string(), members.iter().map(|m| m.to_string()).collect());
    }

    pub fn set_role(&self, role: EscalationRole, recipient: &str) {
        self.fixture.write().roles.insert(role, recipient.to_string());
    }

    pub fn set_load(&self, agent: &str, open_load: u32) {
        if let Some(record) = self.fixture.write().agents.get_mut(agent) {
            record.open_load = open_load;
        }
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn get_pool(&self, pool: &AgentPool) -> Result<Vec<AgentId>, DirectoryError> {
        let fixture = self.fixture.read();
        let members: Vec<String> = match pool {
            AgentPool::All => fixture.agents.keys().cloned().collect(),
            AgentPool::Named(name) => fixture
                .pools
                .get(name)
                .cloned()
                .ok_or_else(|| DirectoryError::UnknownPool(name.clone()))?,
        };
        Ok(members.into_iter().map(AgentId::new).collect())
    }

    async fn get_skills(&self, agent: &AgentId) -> Result<BTreeSet<String>, DirectoryError> {
        self.fixture
            .read()
            .agents
            .get(agent.as_str())
            .map(|a| a.skills.clone())
            .ok_or_else(|| DirectoryError::UnknownAgent(agent.to_string()))
    }

    async fn get_open_load(&self, agent: &AgentId) -> Result<u32, DirectoryError> {
        self.fixture
            .read()
            .agents
            .get(agent.as_str())
            .map(|a| a.open_load)
            .ok_or_else(|| DirectoryError::UnknownAgent(agent.to_string()))
    }

    async fn resolve_role(
        &self,
        role: EscalationRole,
        ticket: &TicketSnapshot,
    ) -> Result<Option<String>, DirectoryError> {
        let fixture = self.fixture.read();
        let personal = ticket
            .assigned_agent_id
            .as_ref()
            .and_then(|agent| fixture.agents.get(agent.as_str()))
            .and_then(|record| match role {
                EscalationRole::TeamLead => record.team_lead.clone(),
                EscalationRole::Manager => record.manager.clone(),
            });
        Ok(personal.or_else(|| fixture.roles.get(&role).cloned()))
    }
}

/// Notification captured by [`RecordingNotificationSink`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SentNotification {
    pub target: String,
    pub method: NotifyMethod,
    pub payload: NotificationPayload,
}

/// Sink that keeps every notification in memory
#[derive(Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<SentNotification>>,
    down: AtomicBool,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While down, every send fails with [`NotifyError::Closed`].
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn send(
        &self,
        target: &str,
        method: NotifyMethod,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        if self.down.load(Ordering::Relaxed) {
            return Err(NotifyError::Closed);
        }
        self.sent.lock().push(SentNotification {
            target: target.to_string(),
            method,
            payload: payload.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ticket(id: &str) -> TicketSnapshot {
        TicketSnapshot::new(id, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_mark_escalation_fired_once() {
        let store = InMemoryTicketStore::with_tickets([ticket("T-1")]);
        let id = TicketId::new("T-1");
        assert!(store.mark_escalation_fired(&id, "std@75").await.unwrap());
        assert!(!store.mark_escalation_fired(&id, "std@75").await.unwrap());
        assert!(store.get("T-1").unwrap().has_fired("std@75"));

        let missing = TicketId::new("T-404");
        assert!(store.mark_escalation_fired(&missing, "std@75").await.is_err());
    }

    #[tokio::test]
    async fn test_mutations_and_open_filter() {
        let store = InMemoryTicketStore::with_tickets([ticket("T-1"), ticket("T-2")]);
        let id = TicketId::new("T-2");
        store
            .apply_mutation(&id, &TicketPatch::SetStatus(crate::domain::TicketStatus::Closed))
            .await
            .unwrap();
        store.apply_mutation(&id, &TicketPatch::AddNote("done".into())).await.unwrap();

        let open = store.get_open_tickets().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.as_str(), "T-1");
        assert_eq!(store.notes("T-2"), vec!["done".to_string()]);
        assert_eq!(store.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_directory_pools_and_roles() {
        let yaml = r#"
agents:
  alice: { skills: [billing], open_load: 2, team_lead: lead-a@example.com }
  bob: { open_load: 1 }
pools:
  tier1: [bob, alice]
roles:
  team_lead: leads@example.com
  manager: boss@example.com
"#;
        let fixture: DirectoryFixture = serde_yaml::from_str(yaml).unwrap();
        let directory = InMemoryAgentDirectory::new(fixture);

        let tier1 = directory.get_pool(&AgentPool::named("tier1")).await.unwrap();
        assert_eq!(tier1, vec![AgentId::new("bob"), AgentId::new("alice")]);
        let all = directory.get_pool(&AgentPool::All).await.unwrap();
        assert_eq!(all, vec![AgentId::new("alice"), AgentId::new("bob")]);
        assert!(directory.get_pool(&AgentPool::named("tier9")).await.is_err());

        let assigned = ticket("T-1").assigned_to("alice");
        assert_eq!(
            directory.resolve_role(EscalationRole::TeamLead, &assigned).await.unwrap().as_deref(),
            Some("lead-a@example.com")
        );
        assert_eq!(
            directory.resolve_role(EscalationRole::Manager, &assigned).await.unwrap().as_deref(),
            Some("boss@example.com")
        );
    }
}
