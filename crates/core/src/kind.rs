//! The closed set of business collections the CRM persists and syncs.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Kind of business record.
///
/// The serialized form is the logical entity name used in sync action keys
/// and remote endpoints (`contacts`, `bonLivraison`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "contacts")]
    Contact,
    #[serde(rename = "products")]
    Product,
    #[serde(rename = "services")]
    Service,
    #[serde(rename = "quotes")]
    Quote,
    #[serde(rename = "invoices")]
    Invoice,
    #[serde(rename = "bonLivraison")]
    BonLivraison,
    #[serde(rename = "tasks")]
    Task,
    #[serde(rename = "events")]
    CalendarEvent,
    #[serde(rename = "users")]
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Contact,
        EntityKind::Product,
        EntityKind::Service,
        EntityKind::Quote,
        EntityKind::Invoice,
        EntityKind::BonLivraison,
        EntityKind::Task,
        EntityKind::CalendarEvent,
        EntityKind::User,
    ];

    /// Logical entity name (sync action keys, endpoint names).
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Contact => "contacts",
            EntityKind::Product => "products",
            EntityKind::Service => "services",
            EntityKind::Quote => "quotes",
            EntityKind::Invoice => "invoices",
            EntityKind::BonLivraison => "bonLivraison",
            EntityKind::Task => "tasks",
            EntityKind::CalendarEvent => "events",
            EntityKind::User => "users",
        }
    }

    /// Key of the persisted snapshot for this collection.
    pub fn collection_key(self) -> &'static str {
        match self {
            EntityKind::Contact => "crm_contacts",
            EntityKind::Product => "crm_products",
            EntityKind::Service => "crm_services",
            EntityKind::Quote => "crm_quotes",
            EntityKind::Invoice => "crm_invoices",
            EntityKind::BonLivraison => "crm_bon_livraisons",
            EntityKind::Task => "crm_tasks",
            EntityKind::CalendarEvent => "crm_events",
            EntityKind::User => "crm_users",
        }
    }

    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityKind::Contact => "CLI",
            EntityKind::Product => "PRD",
            EntityKind::Service => "SRV",
            EntityKind::Quote => "DEV",
            EntityKind::Invoice => "FAC",
            EntityKind::BonLivraison => "BL",
            EntityKind::Task => "TSK",
            EntityKind::CalendarEvent => "EVT",
            EntityKind::User => "USR",
        }
    }

    /// Display noun used in user-facing notifications.
    pub fn noun(self) -> &'static str {
        match self {
            EntityKind::Contact => "Contact",
            EntityKind::Product => "Produit",
            EntityKind::Service => "Service",
            EntityKind::Quote => "Devis",
            EntityKind::Invoice => "Facture",
            EntityKind::BonLivraison => "Bon de livraison",
            EntityKind::Task => "Tâche",
            EntityKind::CalendarEvent => "Événement",
            EntityKind::User => "Utilisateur",
        }
    }

    /// Grammatical gender of [`noun`](Self::noun), for past participles.
    pub fn is_feminine(self) -> bool {
        matches!(self, EntityKind::Invoice | EntityKind::Task)
    }

    /// Gendered past participle: `agree("créé")` gives `créée` for feminine nouns.
    pub fn agree(self, participle: &str) -> String {
        if self.is_feminine() {
            format!("{participle}e")
        } else {
            participle.to_string()
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown entity '{s}'")))
    }
}
