use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    #[serde(rename = "planifie")]
    Planned,
    #[serde(rename = "confirme")]
    Confirmed,
    #[serde(rename = "termine")]
    Done,
    #[serde(rename = "annule")]
    Cancelled,
}

impl Lifecycle for EventStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Planned, Confirmed | Done | Cancelled)
                | (Confirmed, Planned | Done | Cancelled)
                | (Cancelled, Planned)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            EventStatus::Planned => "planifie",
            EventStatus::Confirmed => "confirme",
            EventStatus::Done => "termine",
            EventStatus::Cancelled => "annule",
        }
    }

    fn label(self) -> &'static str {
        match self {
            EventStatus::Planned => "Planifié",
            EventStatus::Confirmed => "Confirmé",
            EventStatus::Done => "Terminé",
            EventStatus::Cancelled => "Annulé",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RendezVous,
    Appel,
    Reunion,
    Livraison,
    #[default]
    Autre,
}

/// Calendar entry. `duration_minutes` is derived from `start`/`end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: EntityId,
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: EventKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: EventStatus,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl CalendarEvent {
    /// Whether the event intersects `[from, to)`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end.max(self.start) >= from
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: EventKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPatch {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<EventKind>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub client: Option<String>,
    pub description: Option<String>,
    pub status: Option<EventStatus>,
}

impl Entity for CalendarEvent {
    type Draft = EventDraft;
    type Patch = EventPatch;
    type Status = EventStatus;

    const KIND: EntityKind = EntityKind::CalendarEvent;

    fn from_draft(id: EntityId, draft: EventDraft, now: DateTime<Utc>) -> Self {
        let mut event = CalendarEvent {
            id,
            title: draft.title,
            kind: draft.kind,
            start: draft.start,
            end: draft.end,
            duration_minutes: 0,
            location: draft.location,
            client: draft.client,
            description: draft.description,
            status: draft.status,
            timestamps: Timestamps::new(now),
        };
        event.recompute();
        event
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

    fn status(&self) -> EventStatus {
        self.status
    }

    fn patch_status(patch: &EventPatch) -> Option<EventStatus> {
        patch.status
    }

    fn status_patch(status: EventStatus) -> EventPatch {
        EventPatch {
            status: Some(status),
            ..EventPatch::default()
        }
    }

    fn apply_patch(&mut self, patch: EventPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(start) = patch.start {
            self.start = start;
        }
        if let Some(end) = patch.end {
            self.end = end;
        }
        if let Some(location) = patch.location {
            self.location = Some(location);
        }
        if let Some(client) = patch.client {
            self.client = Some(client);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    fn recompute(&mut self) {
        self.duration_minutes = (self.end - self.start).num_minutes().max(0);
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
        fields.extend(self.location.as_deref());
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        let start = now + Duration::days(1);
        vec![CalendarEvent::from_draft(
            EntityId::format("EVT", 1),
            EventDraft {
                title: "Présentation du devis".to_string(),
                kind: EventKind::RendezVous,
                start,
                end: start + Duration::minutes(90),
                location: Some("Locaux Société ABC".to_string()),
                client: Some("Société ABC".to_string()),
                description: None,
                status: EventStatus::Planned,
            },
            now,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap()
    }

    fn test_event(start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent::from_draft(
            EntityId::format("EVT", 1),
            EventDraft {
                title: "Réunion de suivi".to_string(),
                kind: EventKind::Reunion,
                start,
                end,
                location: None,
                client: Some("Acme".to_string()),
                description: None,
                status: EventStatus::Planned,
            },
            at(8, 0),
        )
    }

    #[test]
    fn duration_is_derived() {
        let mut event = test_event(at(9, 0), at(10, 30));
        assert_eq!(event.duration_minutes, 90);

        event.apply_patch(EventPatch {
            end: Some(at(9, 15)),
            ..EventPatch::default()
        });
        event.recompute();
        assert_eq!(event.duration_minutes, 15);
    }

    #[test]
    fn inverted_range_has_zero_duration() {
        let event = test_event(at(10, 0), at(9, 0));
        assert_eq!(event.duration_minutes, 0);
    }

    #[test]
    fn overlaps_half_open_window() {
        let event = test_event(at(9, 0), at(10, 0));
        assert!(event.overlaps(at(8, 0), at(9, 30)));
        assert!(!event.overlaps(at(10, 1), at(11, 0)));
        assert!(!event.overlaps(at(8, 0), at(9, 0)));
    }

    #[test]
    fn kind_serializes_as_type() {
        let event = test_event(at(9, 0), at(10, 0));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reunion");
        assert_eq!(json["status"], "planifie");
        assert_eq!(json["durationMinutes"], 60);
    }

    #[test]
    fn done_is_terminal() {
        assert!(EventStatus::Done.ensure_transition(EventStatus::Planned).is_err());
        assert!(EventStatus::Cancelled.ensure_transition(EventStatus::Planned).is_ok());
    }
}
