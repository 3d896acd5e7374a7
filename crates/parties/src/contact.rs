use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps};

/// Contact status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    Prospect,
    Client,
    #[serde(rename = "inactif")]
    Inactive,
}

impl Lifecycle for ContactStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ContactStatus::*;
        matches!(
            (self, next),
            (Prospect, Client | Inactive) | (Client, Inactive) | (Inactive, Prospect | Client)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ContactStatus::Prospect => "prospect",
            ContactStatus::Client => "client",
            ContactStatus::Inactive => "inactif",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ContactStatus::Prospect => "Prospect",
            ContactStatus::Client => "Client",
            ContactStatus::Inactive => "Inactif",
        }
    }
}

/// Contact information for a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A person or company the business deals with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(flatten)]
    pub info: ContactInfo,
    pub status: ContactStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDraft {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(flatten)]
    pub info: ContactInfo,
    pub status: ContactStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: Option<ContactStatus>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl Entity for Contact {
    type Draft = ContactDraft;
    type Patch = ContactPatch;
    type Status = ContactStatus;

    const KIND: EntityKind = EntityKind::Contact;

    fn from_draft(id: EntityId, draft: ContactDraft, now: DateTime<Utc>) -> Self {
        Contact {
            id,
            name: draft.name,
            company: draft.company,
            info: draft.info,
            status: draft.status,
            tags: draft.tags,
            notes: draft.notes,
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

    fn status(&self) -> ContactStatus {
        self.status
    }

    fn patch_status(patch: &ContactPatch) -> Option<ContactStatus> {
        patch.status
    }

    fn status_patch(status: ContactStatus) -> ContactPatch {
        ContactPatch {
            status: Some(status),
            ..ContactPatch::default()
        }
    }

    fn apply_patch(&mut self, patch: ContactPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(company) = patch.company {
            self.company = Some(company);
        }
        if let Some(email) = patch.email {
            self.info.email = Some(email);
        }
        if let Some(phone) = patch.phone {
            self.info.phone = Some(phone);
        }
        if let Some(address) = patch.address {
            self.info.address = Some(address);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
    }

    /// Company name when known, otherwise the person's name.
    fn client_name(&self) -> Option<&str> {
        Some(self.company.as_deref().unwrap_or(&self.name))
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.name.as_str()];
        fields.extend(self.company.as_deref());
        fields.extend(self.info.email.as_deref());
        fields.extend(self.info.phone.as_deref());
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        vec![
            Contact::from_draft(
                EntityId::format("CLI", 2),
                ContactDraft {
                    name: "Karim Benali".to_string(),
                    company: Some("Tech Solutions".to_string()),
                    info: ContactInfo {
                        email: Some("k.benali@techsolutions.fr".to_string()),
                        phone: Some("+33 6 12 34 56 78".to_string()),
                        address: None,
                    },
                    status: ContactStatus::Prospect,
                    tags: vec!["IT".to_string()],
                    notes: None,
                },
                now,
            ),
            Contact::from_draft(
                EntityId::format("CLI", 1),
                ContactDraft {
                    name: "Jean Dupont".to_string(),
                    company: Some("Société ABC".to_string()),
                    info: ContactInfo {
                        email: Some("jean.dupont@societe-abc.fr".to_string()),
                        phone: None,
                        address: Some("8 avenue Foch, 69006 Lyon".to_string()),
                    },
                    status: ContactStatus::Client,
                    tags: Vec::new(),
                    notes: None,
                },
                now,
            ),
        ]
    }
}
