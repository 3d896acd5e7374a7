use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crm_core::{Entity, EntityId, EntityKind, Lifecycle, Timestamps, round_cents};

/// Invoice status lifecycle.
///
/// Wire values are the French labels shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[serde(rename = "Brouillon")]
    Draft,
    #[serde(rename = "En attente")]
    Pending,
    #[serde(rename = "Payée")]
    Paid,
    #[serde(rename = "Partiellement payée")]
    PartiallyPaid,
    #[serde(rename = "En retard")]
    Overdue,
    #[serde(rename = "Annulée")]
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Pending,
        InvoiceStatus::Paid,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    /// Still expecting money from the client.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

impl Lifecycle for InvoiceStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Pending | Cancelled)
                | (Pending, Paid | PartiallyPaid | Overdue | Cancelled)
                | (PartiallyPaid, Paid | Overdue | Cancelled)
                | (Overdue, Paid | PartiallyPaid | Cancelled)
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Brouillon",
            InvoiceStatus::Pending => "En attente",
            InvoiceStatus::Paid => "Payée",
            InvoiceStatus::PartiallyPaid => "Partiellement payée",
            InvoiceStatus::Overdue => "En retard",
            InvoiceStatus::Cancelled => "Annulée",
        }
    }

    fn label(self) -> &'static str {
        self.as_str()
    }
}

/// Invoice record.
///
/// `remaining_amount` is derived (`amount - advance_amount`) and recomputed on
/// every mutation and on load. The delivery note is referenced by ID only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: EntityId,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub advance_amount: f64,
    #[serde(default)]
    pub remaining_amount: f64,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bon_livraison_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Invoice {
    /// Open, unpaid and past its due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.remaining_amount > 0.0 && self.due_date < today
    }

    pub fn is_fully_paid(&self) -> bool {
        self.remaining_amount <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    pub client: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: f64,
    #[serde(default)]
    pub advance_amount: f64,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub quote_id: Option<EntityId>,
    #[serde(default)]
    pub bon_livraison_id: Option<EntityId>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoicePatch {
    pub client: Option<String>,
    pub client_email: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: Option<f64>,
    pub advance_amount: Option<f64>,
    pub status: Option<InvoiceStatus>,
    pub payment_method: Option<String>,
    pub quote_id: Option<EntityId>,
    pub bon_livraison_id: Option<EntityId>,
    pub notes: Option<String>,
}

impl Entity for Invoice {
    type Draft = InvoiceDraft;
    type Patch = InvoicePatch;
    type Status = InvoiceStatus;

    const KIND: EntityKind = EntityKind::Invoice;

    fn from_draft(id: EntityId, draft: InvoiceDraft, now: DateTime<Utc>) -> Self {
        let mut invoice = Invoice {
            id,
            client: draft.client,
            client_email: draft.client_email,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            amount: draft.amount,
            advance_amount: draft.advance_amount,
            remaining_amount: 0.0,
            status: draft.status,
            payment_method: draft.payment_method,
            quote_id: draft.quote_id,
            bon_livraison_id: draft.bon_livraison_id,
            notes: draft.notes,
            timestamps: Timestamps::new(now),
        };
        invoice.recompute();
        invoice
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

    fn status(&self) -> InvoiceStatus {
        self.status
    }

    fn patch_status(patch: &InvoicePatch) -> Option<InvoiceStatus> {
        patch.status
    }

    fn status_patch(status: InvoiceStatus) -> InvoicePatch {
        InvoicePatch {
            status: Some(status),
            ..InvoicePatch::default()
        }
    }

    fn apply_patch(&mut self, patch: InvoicePatch) {
        if let Some(client) = patch.client {
            self.client = client;
        }
        if let Some(email) = patch.client_email {
            self.client_email = Some(email);
        }
        if let Some(date) = patch.issue_date {
            self.issue_date = date;
        }
        if let Some(date) = patch.due_date {
            self.due_date = date;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(advance) = patch.advance_amount {
            self.advance_amount = advance;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(method) = patch.payment_method {
            self.payment_method = Some(method);
        }
        if let Some(quote_id) = patch.quote_id {
            self.quote_id = Some(quote_id);
        }
        if let Some(bl_id) = patch.bon_livraison_id {
            self.bon_livraison_id = Some(bl_id);
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
    }

    fn recompute(&mut self) {
        self.remaining_amount = round_cents(self.amount - self.advance_amount);
    }

    fn client_name(&self) -> Option<&str> {
        Some(&self.client)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.client.as_str()];
        if let Some(email) = &self.client_email {
            fields.push(email);
        }
        if let Some(quote_id) = &self.quote_id {
            fields.push(quote_id.as_str());
        }
        fields
    }

    /// Older snapshots embedded the whole delivery note; keep only its ID.
    fn upgrade_legacy(raw: &mut Value) {
        let Some(obj) = raw.as_object_mut() else {
            return;
        };
        let Some(embedded) = obj.remove("bonLivraison") else {
            return;
        };
        let has_ref = obj
            .get("bonLivraisonId")
            .is_some_and(|v| !v.is_null());
        if !has_ref {
            if let Some(id) = embedded.get("id").and_then(Value::as_str) {
                obj.insert("bonLivraisonId".to_string(), Value::String(id.to_string()));
            }
        }
    }

    fn seed(now: DateTime<Utc>) -> Vec<Self> {
        let today = now.date_naive();
        let days_ago = |n: u64| today.checked_sub_days(Days::new(n)).unwrap_or(today);
        let days_ahead = |n: u64| today.checked_add_days(Days::new(n)).unwrap_or(today);

        vec![
            Invoice::from_draft(
                EntityId::format("FAC", 2),
                InvoiceDraft {
                    client: "Tech Solutions".to_string(),
                    client_email: Some("compta@techsolutions.fr".to_string()),
                    issue_date: days_ago(10),
                    due_date: days_ahead(20),
                    amount: 3600.0,
                    advance_amount: 1000.0,
                    status: InvoiceStatus::PartiallyPaid,
                    payment_method: Some("Virement".to_string()),
                    quote_id: None,
                    bon_livraison_id: None,
                    notes: None,
                },
                now,
            ),
            Invoice::from_draft(
                EntityId::format("FAC", 1),
                InvoiceDraft {
                    client: "Société ABC".to_string(),
                    client_email: Some("contact@societe-abc.fr".to_string()),
                    issue_date: days_ago(30),
                    due_date: days_ago(1),
                    amount: 1200.0,
                    advance_amount: 0.0,
                    status: InvoiceStatus::Pending,
                    payment_method: None,
                    quote_id: Some(EntityId::format("DEV", 1)),
                    bon_livraison_id: None,
                    notes: None,
                },
                now,
            ),
        ]
    }
}
