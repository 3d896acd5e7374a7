use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "a_faire")]
    Todo,
    #[serde(rename = "en_cours")]
    InProgress,
    #[serde(rename = "terminee")]
    Done,
    #[serde(rename = "annulee")]
    Cancelled,
}

impl TaskStatus {
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

impl Lifecycle for TaskStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Todo, InProgress | Done | Cancelled)
                | (InProgress, Todo | Done | Cancelled)
                // Reopen.
                | (Done | Cancelled, Todo)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "a_faire",
            TaskStatus::InProgress => "en_cours",
            TaskStatus::Done => "terminee",
            TaskStatus::Cancelled => "annulee",
        }
    }

    fn label(self) -> &'static str {
        match self {
            TaskStatus::Todo => "À faire",
            TaskStatus::InProgress => "En cours",
            TaskStatus::Done => "Terminée",
            TaskStatus::Cancelled => "Annulée",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Basse,
    #[default]
    Moyenne,
    Haute,
    Urgente,
}

/// Follow-up task, optionally attached to a client or another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Record this task follows up on (invoice, quote, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<EntityId>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Task {
    pub fn is_late(&self, today: NaiveDate) -> bool {
        !self.status.is_closed() && self.due_date.is_some_and(|due| due < today)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub status: TaskStatus,
    #[serde(default)]
    pub related_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub client: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub related_id: Option<EntityId>,
}

impl Entity for Task {
    type Draft = TaskDraft;
    type Patch = TaskPatch;
    type Status = TaskStatus;

    const KIND: EntityKind = EntityKind::Task;

    fn from_draft(id: EntityId, draft: TaskDraft, now: DateTime<Utc>) -> Self {
        Task {
            id,
            title: draft.title,
            description: draft.description,
            assignee: draft.assignee,
            client: draft.client,
            due_date: draft.due_date,
            priority: draft.priority,
            status: draft.status,
            related_id: draft.related_id,
            timestamps: Timestamps::new(now),
        }
    }

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    fn timestamps_mut(&mut self) -> &mut Timestamps {
        &mut self.timestamps
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn patch_status(patch: &TaskPatch) -> Option<TaskStatus> {
        patch.status
    }

    fn status_patch(status: TaskStatus) -> TaskPatch {
        TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        }
    }

    fn apply_patch(&mut self, patch: TaskPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(assignee) = patch.assignee {
            self.assignee = Some(assignee);
        }
        if let Some(client) = patch.client {
            self.client = Some(client);
        }
        if let Some(due) = patch.due_date {
            self.due_date = Some(due);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(related) = patch.related_id {
            self.related_id = Some(related);
        }
    }

    fn client_name(&self) -> Option<&str> {
        self.client.as_deref()
    }

    fn label(&self) -> String {
        format!("{} ({})", self.id, self.title)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.title.as_str()];
        fields.extend(self.client.as_deref());
        fields.extend(self.assignee.as_deref());
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        let today = now.date_naive();
        vec![Task::from_draft(
            EntityId::format("TSK", 1),
            TaskDraft {
                title: "Relancer le paiement".to_string(),
                description: Some("Relance par téléphone".to_string()),
                assignee: Some("Marie".to_string()),
                client: Some("Société ABC".to_string()),
                due_date: today.checked_add_days(Days::new(2)),
                priority: TaskPriority::Haute,
                status: TaskStatus::Todo,
                related_id: Some(EntityId::format("FAC", 1)),
            },
            now,
        )]
    }
}
