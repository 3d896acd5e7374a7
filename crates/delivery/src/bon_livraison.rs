use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps};

/// Delivery note status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "en_preparation")]
    Preparing,
    #[serde(rename = "expedie")]
    Shipped,
    #[serde(rename = "en_cours_livraison")]
    InTransit,
    #[serde(rename = "livre")]
    Delivered,
    #[serde(rename = "partiellement_livre")]
    PartiallyDelivered,
    #[serde(rename = "refuse")]
    Refused,
    #[serde(rename = "retour")]
    Returned,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 7] = [
        DeliveryStatus::Preparing,
        DeliveryStatus::Shipped,
        DeliveryStatus::InTransit,
        DeliveryStatus::Delivered,
        DeliveryStatus::PartiallyDelivered,
        DeliveryStatus::Refused,
        DeliveryStatus::Returned,
    ];
}

impl Lifecycle for DeliveryStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Preparing, Shipped | Refused)
                | (Shipped, InTransit | Delivered | PartiallyDelivered | Refused | Returned)
                | (InTransit, Delivered | PartiallyDelivered | Refused | Returned)
                | (PartiallyDelivered, InTransit | Delivered | Returned)
                | (Delivered | Refused, Returned)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Preparing => "en_preparation",
            DeliveryStatus::Shipped => "expedie",
            DeliveryStatus::InTransit => "en_cours_livraison",
            DeliveryStatus::Delivered => "livre",
            DeliveryStatus::PartiallyDelivered => "partiellement_livre",
            DeliveryStatus::Refused => "refuse",
            DeliveryStatus::Returned => "retour",
        }
    }

    fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Preparing => "En préparation",
            DeliveryStatus::Shipped => "Expédié",
            DeliveryStatus::InTransit => "En cours de livraison",
            DeliveryStatus::Delivered => "Livré",
            DeliveryStatus::PartiallyDelivered => "Partiellement livré",
            DeliveryStatus::Refused => "Refusé",
            DeliveryStatus::Returned => "Retour",
        }
    }
}

/// Badge summarizing how much of a delivery note has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryProgress {
    #[serde(rename = "Complet")]
    Complete,
    #[serde(rename = "Partiel")]
    Partial,
    #[serde(rename = "Non livré")]
    NotDelivered,
}

impl DeliveryProgress {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryProgress::Complete => "Complet",
            DeliveryProgress::Partial => "Partiel",
            DeliveryProgress::NotDelivered => "Non livré",
        }
    }
}

/// One line of a delivery note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryItem {
    pub designation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub quantite_commandee: u32,
    #[serde(default)]
    pub quantite_livree: u32,
    /// Derived: ordered minus delivered, never below zero.
    #[serde(default)]
    pub quantite_restante: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unite: Option<String>,
}

impl DeliveryItem {
    pub fn new(designation: impl Into<String>, quantite_commandee: u32) -> Self {
        Self {
            designation: designation.into(),
            reference: None,
            quantite_commandee,
            quantite_livree: 0,
            quantite_restante: quantite_commandee,
            unite: None,
        }
    }

    pub fn recompute(&mut self) {
        self.quantite_restante = self.quantite_commandee.saturating_sub(self.quantite_livree);
    }
}

/// Delivery note record. The owning invoice is referenced by ID only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonLivraison {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<EntityId>,
    pub client: String,
    #[serde(default)]
    pub adresse_livraison: String,
    pub date_livraison: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transporteur: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_suivi: Option<String>,
    #[serde(default)]
    pub items: Vec<DeliveryItem>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl BonLivraison {
    pub fn progress(&self) -> DeliveryProgress {
        if self.items.is_empty() || self.items.iter().all(|i| i.quantite_livree == 0) {
            DeliveryProgress::NotDelivered
        } else if self.items.iter().all(|i| i.quantite_restante == 0) {
            DeliveryProgress::Complete
        } else {
            DeliveryProgress::Partial
        }
    }

    pub fn total_ordered(&self) -> u32 {
        self.items.iter().map(|i| i.quantite_commandee).sum()
    }

    pub fn total_remaining(&self) -> u32 {
        self.items.iter().map(|i| i.quantite_restante).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonLivraisonDraft {
    #[serde(default)]
    pub invoice_id: Option<EntityId>,
    pub client: String,
    #[serde(default)]
    pub adresse_livraison: String,
    pub date_livraison: NaiveDate,
    #[serde(default)]
    pub transporteur: Option<String>,
    #[serde(default)]
    pub numero_suivi: Option<String>,
    #[serde(default)]
    pub items: Vec<DeliveryItem>,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update. `items` replaces the whole item list when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BonLivraisonPatch {
    pub invoice_id: Option<EntityId>,
    pub client: Option<String>,
    pub adresse_livraison: Option<String>,
    pub date_livraison: Option<NaiveDate>,
    pub transporteur: Option<String>,
    pub numero_suivi: Option<String>,
    pub items: Option<Vec<DeliveryItem>>,
    pub status: Option<DeliveryStatus>,
    pub notes: Option<String>,
}

impl Entity for BonLivraison {
    type Draft = BonLivraisonDraft;
    type Patch = BonLivraisonPatch;
    type Status = DeliveryStatus;

    const KIND: EntityKind = EntityKind::BonLivraison;

    fn from_draft(id: EntityId, draft: BonLivraisonDraft, now: DateTime<Utc>) -> Self {
        let mut bl = BonLivraison {
            id,
            invoice_id: draft.invoice_id,
            client: draft.client,
            adresse_livraison: draft.adresse_livraison,
            date_livraison: draft.date_livraison,
            transporteur: draft.transporteur,
            numero_suivi: draft.numero_suivi,
            items: draft.items,
            status: draft.status,
            notes: draft.notes,
            timestamps: Timestamps::new(now),
        };
        bl.recompute();
        bl
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

    fn status(&self) -> DeliveryStatus {
        self.status
    }

    fn patch_status(patch: &BonLivraisonPatch) -> Option<DeliveryStatus> {
        patch.status
    }

    fn status_patch(status: DeliveryStatus) -> BonLivraisonPatch {
        BonLivraisonPatch {
            status: Some(status),
            ..BonLivraisonPatch::default()
        }
    }

    fn apply_patch(&mut self, patch: BonLivraisonPatch) {
        if let Some(invoice_id) = patch.invoice_id {
            self.invoice_id = Some(invoice_id);
        }
        if let Some(client) = patch.client {
            self.client = client;
        }
        if let Some(address) = patch.adresse_livraison {
            self.adresse_livraison = address;
        }
        if let Some(date) = patch.date_livraison {
            self.date_livraison = date;
        }
        if let Some(carrier) = patch.transporteur {
            self.transporteur = Some(carrier);
        }
        if let Some(tracking) = patch.numero_suivi {
            self.numero_suivi = Some(tracking);
        }
        if let Some(items) = patch.items {
            self.items = items;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
    }

    fn recompute(&mut self) {
        self.items.iter_mut().for_each(DeliveryItem::recompute);
    }

    fn client_name(&self) -> Option<&str> {
        Some(&self.client)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.client.as_str()];
        if let Some(carrier) = &self.transporteur {
            fields.push(carrier);
        }
        if let Some(tracking) = &self.numero_suivi {
            fields.push(tracking);
        }
        if let Some(invoice_id) = &self.invoice_id {
            fields.push(invoice_id.as_str());
        }
        fields
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        let today = now.date_naive();
        let mut shipped = DeliveryItem::new("Ordinateur portable", 5);
        shipped.quantite_livree = 2;

        vec![BonLivraison::from_draft(
            EntityId::format("BL", 1),
            BonLivraisonDraft {
                invoice_id: Some(EntityId::format("FAC", 2)),
                client: "Tech Solutions".to_string(),
                adresse_livraison: "12 rue de la Paix, 75002 Paris".to_string(),
                date_livraison: today.checked_add_days(Days::new(3)).unwrap_or(today),
                transporteur: Some("Chronopost".to_string()),
                numero_suivi: Some("CP123456789FR".to_string()),
                items: vec![shipped, DeliveryItem::new("Souris sans fil", 5)],
                status: DeliveryStatus::PartiallyDelivered,
                notes: None,
            },
            now,
        )]
    }
}
